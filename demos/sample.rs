//! Sample program: retrieves random bytes and random decimals from a MicroRNG.

use anyhow::{Context, Result};
use log::info;
use microrng_spi::{MicroRng, DEFAULT_DEVICE_PATH};

const BYTE_COUNT: usize = 10;
const DECIMAL_COUNT: usize = 10;

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    let device_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DEVICE_PATH.to_string());

    let mut rng = MicroRng::new();
    rng.connect(&device_path)
        .with_context(|| format!("Failed to connect to {}", device_path))?;
    rng.validate_device()?;

    info!(
        "MicroRNG device open successfully, SPI clock frequency: {} Hz",
        rng.clock_hz()
    );

    let mut bytes = [0u8; BYTE_COUNT];
    rng.retrieve_random_bytes(&mut bytes)?;
    println!("*** Generating {} random bytes ***", BYTE_COUNT);
    for (i, byte) in bytes.iter().enumerate() {
        println!("random byte {} -> {}", i, byte);
    }

    let mut words = [0u8; DECIMAL_COUNT * 4];
    rng.retrieve_random_bytes(&mut words)?;
    println!();
    println!(
        "*** Generating {} random numbers between 0 and 1 with 5 decimals ***",
        DECIMAL_COUNT
    );
    for chunk in words.chunks_exact(4) {
        let value = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let decimal = f64::from(value % 99_999) / 100_000.0;
        println!("random number -> {:.6}", decimal);
    }

    Ok(())
}
