//! MicroRNG SPI driver
//!
//! Drives the TectroLabs MicroRNG true random number generator attached to a
//! Linux spidev bus, plus the bulk download and diagnostics routines used by
//! the `mcrng` and `mcdiag` tools.

pub mod command;
pub mod config;
pub mod diagnostics;
pub mod download;
pub mod error;
pub mod microrng;
pub mod spi;

#[cfg(test)]
pub(crate) mod sim;

// Re-export main types for convenience
pub use command::{Command, STATUS_HEALTHY, STATUS_NOISE_SOURCES_DOWN, STATUS_NOISE_SOURCES_UP};
pub use config::{LinkConfig, DEFAULT_DEVICE_PATH};
pub use error::{Error, Result};
pub use microrng::MicroRng;
pub use spi::{BusOpener, LinkParameter, SpiBus, SpidevBus, SpidevOpener};
