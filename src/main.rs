use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use microrng_spi::download::{self, MAX_DOWNLOAD_BYTES};
use microrng_spi::{MicroRng, DEFAULT_DEVICE_PATH};

/// True Random Number Generator MicroRNG download utility.
///
/// Downloads random bytes from a MicroRNG device into a data file.
/// It may require 'sudo' permissions to access the SPI device.
#[derive(Parser, Debug)]
#[command(name = "mcrng", version)]
struct Args {
    /// File for storing random data, use STDOUT to send bytes to standard output
    #[arg(short = 'f', long = "file-name")]
    file_name: String,

    /// Number of random bytes to download, skip for continuous download
    #[arg(
        short = 'n',
        long = "number-bytes",
        value_parser = clap::value_parser!(u64).range(1..=MAX_DOWNLOAD_BYTES)
    )]
    number_bytes: Option<u64>,

    /// SPI device path
    #[arg(short = 'd', long = "device-path", env = "MICRORNG_DEVICE", default_value = DEFAULT_DEVICE_PATH)]
    device_path: PathBuf,

    /// SPI clock frequency in Hz
    #[arg(long = "clock-hz", conflicts_with = "autodetect")]
    clock_hz: Option<u32>,

    /// Calibrate the fastest reliable SPI clock before downloading
    #[arg(long)]
    autodetect: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    let args = Args::parse();

    // Stop between chunks on SIGINT/SIGTERM
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))
        .context("Failed to setup SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))
        .context("Failed to setup SIGTERM handler")?;

    let mut rng = MicroRng::new();
    rng.connect(&args.device_path)
        .with_context(|| format!("Cannot open spi device {}", args.device_path.display()))?;

    if let Some(clock_hz) = args.clock_hz {
        rng.set_clock_hz(clock_hz);
    } else if args.autodetect {
        rng.autodetect_max_frequency()
            .context("Failed to identify maximum SPI clock frequency")?;
    }
    info!("SPI clock frequency: {} Hz", rng.clock_hz());

    let mut out: Box<dyn Write> = if download::is_standard_output(&args.file_name) {
        Box::new(io::stdout().lock())
    } else {
        let file = File::create(&args.file_name)
            .with_context(|| format!("Cannot open file: {} in write mode", args.file_name))?;
        Box::new(file)
    };

    match download::download(&mut rng, &mut out, args.number_bytes, &stop) {
        Ok(written) => {
            info!("Downloaded {} bytes to {}", written, args.file_name);
            Ok(())
        }
        Err(e) => {
            error!("Download failed: {:#}", e);
            Err(e)
        }
    }
}

fn init_logger() {
    // Logs go to stderr so STDOUT downloads stay clean.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}
