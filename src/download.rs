use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::microrng::MicroRng;
use crate::spi::BusOpener;

/// Bytes retrieved from the device per write.
pub const CHUNK_SIZE: usize = 32_000;
/// Largest download the tools accept.
pub const MAX_DOWNLOAD_BYTES: u64 = 200_000_000_000;

/// Names that send the download to standard output instead of a file.
pub fn is_standard_output(file_name: &str) -> bool {
    file_name == "STDOUT" || file_name == "/dev/stdout"
}

/// Streams corrected random bytes from `rng` into `out`.
///
/// With `byte_count` set, exactly that many bytes are written. Without it the
/// download runs until `stop` is raised. `stop` is checked between chunks.
/// Returns the number of bytes written.
pub fn download<O, W>(
    rng: &mut MicroRng<O>,
    out: &mut W,
    byte_count: Option<u64>,
    stop: &AtomicBool,
) -> Result<u64>
where
    O: BusOpener,
    W: Write,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        if stop.load(Ordering::SeqCst) {
            info!("Download stopped after {} bytes", written);
            break;
        }

        let len = match byte_count {
            Some(total) if written >= total => break,
            Some(total) => (total - written).min(CHUNK_SIZE as u64) as usize,
            None => CHUNK_SIZE,
        };

        rng.retrieve_random_bytes(&mut buffer[..len])
            .with_context(|| format!("Failed to receive {} bytes", len))?;
        out.write_all(&buffer[..len])
            .context("Failed to write random bytes")?;
        written += len as u64;
        debug!("Downloaded {} bytes", written);
    }

    out.flush().context("Failed to flush output")?;
    Ok(written)
}
