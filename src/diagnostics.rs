//! Self-test sequence run by `mcdiag`.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::command::{STATUS_HEALTHY, STATUS_NOISE_SOURCES_DOWN, STATUS_NOISE_SOURCES_UP};
use crate::config::LinkConfig;
use crate::microrng::MicroRng;
use crate::spi::BusOpener;

#[derive(Debug, Clone)]
pub struct DiagnosticsOptions {
    pub block_size: usize,
    pub speed_test_blocks: usize,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            block_size: 32_000,
            speed_test_blocks: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub device_path: String,
    pub max_clock_hz: u32,
    pub link: LinkConfig,
    pub block_size: usize,
    pub throughput_kbps: f64,
    pub status: u8,
}

impl DiagnosticsReport {
    pub fn is_healthy(&self) -> bool {
        self.status == STATUS_HEALTHY
    }
}

/// Connects to the device at `device_path` and runs the full self test,
/// stopping at the first failing step.
pub fn run<O: BusOpener>(
    rng: &mut MicroRng<O>,
    device_path: &Path,
    options: &DiagnosticsOptions,
) -> Result<DiagnosticsReport> {
    rng.connect(device_path)
        .with_context(|| format!("Opening device {}", device_path.display()))?;

    // Make sure the generator is running; the acknowledgement is checked later.
    if let Err(e) = rng.start_up_noise_sources() {
        warn!("Start up of noise sources failed: {}", e);
    }

    rng.validate_communication().context("MicroRNG not found")?;
    info!("MicroRNG detected on {}", device_path.display());

    let max_clock_hz = rng
        .autodetect_max_frequency()
        .context("Identifying maximum SPI clock frequency")?;

    let mut block = vec![0u8; options.block_size];
    rng.retrieve_random_bytes(&mut block)
        .with_context(|| format!("Retrieving {} random bytes", options.block_size))?;
    rng.retrieve_raw_random_bytes(&mut block)
        .with_context(|| format!("Retrieving {} raw random bytes", options.block_size))?;
    rng.retrieve_random_bytes(&mut block)
        .with_context(|| format!("Retrieving {} random bytes", options.block_size))?;

    let ack = rng.shut_down_noise_sources().context("Shutting down RNG")?;
    if ack != STATUS_NOISE_SOURCES_DOWN {
        bail!("Shutting down RNG: unexpected acknowledgement {}", ack);
    }
    let ack = rng.start_up_noise_sources().context("Starting RNG up")?;
    if ack != STATUS_NOISE_SOURCES_UP {
        bail!("Starting RNG up: unexpected acknowledgement {}", ack);
    }

    let started = Instant::now();
    for _ in 0..options.speed_test_blocks {
        rng.retrieve_random_bytes(&mut block)
            .context("Computing transfer speed")?;
    }
    let elapsed = started.elapsed().as_secs_f64();
    let bits = (options.block_size * options.speed_test_blocks * 8) as f64;
    let throughput_kbps = if elapsed > 0.0 { bits / elapsed / 1024.0 } else { 0.0 };
    info!("Transfer speed: {:.0} kbps", throughput_kbps);

    let status = rng
        .retrieve_status_byte()
        .context("Validating MicroRNG internal status")?;

    Ok(DiagnosticsReport {
        device_path: device_path.display().to_string(),
        max_clock_hz,
        link: rng.link_config().clone(),
        block_size: options.block_size,
        throughput_kbps,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimOpener;

    fn small() -> DiagnosticsOptions {
        DiagnosticsOptions {
            block_size: 256,
            speed_test_blocks: 2,
        }
    }

    #[test]
    fn test_healthy_device() {
        let sim = SimOpener::new();
        sim.state_mut().max_reliable_hz = 1_000_000;
        let mut rng = MicroRng::with_opener(sim.clone());

        let report = run(&mut rng, Path::new("/dev/spidev0.0"), &small()).unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.max_clock_hz, 1_000_000);
        assert_eq!(report.link.clock_hz, 1_000_000);
        assert_eq!(report.device_path, "/dev/spidev0.0");
        assert!(sim.state().noise_enabled);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["max_clock_hz"], 1_000_000);
    }

    #[test]
    fn test_skips_speed_test() {
        let sim = SimOpener::new();
        sim.state_mut().max_reliable_hz = 500_000;
        let mut rng = MicroRng::with_opener(sim.clone());
        let mut options = small();
        options.speed_test_blocks = 0;

        let report = run(&mut rng, Path::new("/dev/spidev0.0"), &options).unwrap();
        assert_eq!(report.throughput_kbps, 0.0);
        assert!(report.is_healthy());
    }

    #[test]
    fn test_missing_device() {
        let sim = SimOpener::new();
        sim.state_mut().max_reliable_hz = 0;
        let mut rng = MicroRng::with_opener(sim);

        let err = run(&mut rng, Path::new("/dev/spidev0.0"), &small()).unwrap_err();
        assert_eq!(err.to_string(), "MicroRNG not found");
    }

    #[test]
    fn test_open_failure() {
        let sim = SimOpener::new();
        sim.state_mut().fail_open = true;
        let mut rng = MicroRng::with_opener(sim);

        let err = run(&mut rng, Path::new("/dev/spidev1.0"), &small()).unwrap_err();
        assert!(err.to_string().starts_with("Opening device /dev/spidev1.0"));
    }
}
