use std::io;
use thiserror::Error;

use crate::spi::LinkParameter;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by [`crate::MicroRng`].
///
/// None of these are fatal; the caller decides whether to retry, abort or
/// surface the condition to an operator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Could not open SPI device: {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not set SPI {parameter}")]
    Config {
        parameter: LinkParameter,
        #[source]
        source: io::Error,
    },

    #[error("Could not exchange SPI bytes")]
    Transfer(#[source] io::Error),

    /// A bulk request asked for zero bytes.
    #[error("Invalid amount of {what} requested")]
    InvalidLength { what: &'static str },

    #[error("MicroRNG device not found")]
    DeviceNotFound,

    #[error("Could not validate SPI communication")]
    ValidationFailed,
}
