use anyhow::{bail, Result};
use clap::Parser;
use log::error;
use std::path::PathBuf;

use microrng_spi::diagnostics::{self, DiagnosticsOptions};
use microrng_spi::{MicroRng, DEFAULT_DEVICE_PATH};

/// MicroRNG diagnostics utility.
///
/// Identifies the device, calibrates the SPI clock, exercises bulk
/// retrieval and noise source power control, measures throughput and
/// checks the internal status.
#[derive(Parser, Debug)]
#[command(name = "mcdiag", version)]
struct Args {
    /// SPI device path
    #[arg(env = "MICRORNG_DEVICE", default_value = DEFAULT_DEVICE_PATH)]
    device_path: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    env_logger::init();

    let args = Args::parse();
    let options = DiagnosticsOptions::default();
    let mut rng = MicroRng::new();

    let report = match diagnostics::run(&mut rng, &args.device_path, &options) {
        Ok(report) => report,
        Err(e) => {
            error!("Diagnostics failed: {:#}", e);
            println!("*FAILED*, error: {:#}", e);
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Device {:<44} MicroRNG detected", report.device_path);
        println!("Maximum SPI clock frequency ---------------- {:>10} Hz", report.max_clock_hz);
        println!("Retrieved random and RAW random bytes ------ {:>10} bytes", report.block_size * 3);
        println!("Noise sources shut down and started up ----- {:>10}", "Success");
        println!("Transfer speed ----------------------------- {:>10.0} kbps", report.throughput_kbps);
        if report.is_healthy() {
            println!("MicroRNG internal status ------------------- {:>10}", "Healthy");
        } else {
            println!("MicroRNG internal status ------------------- failed with status code: {}", report.status);
        }
    }

    if !report.is_healthy() {
        bail!("RNG failed with status code: {}", report.status);
    }
    Ok(())
}
