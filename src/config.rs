use serde::{Deserialize, Serialize};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/spidev0.0";

/// SPI mode 1: clock idles low, data sampled on the trailing edge (CPHA).
pub const SPI_MODE_1: u8 = 0x01;
pub const BITS_PER_WORD: u8 = 8;
pub const MIN_CLOCK_HZ: u32 = 250_000;
pub const MAX_CLOCK_HZ: u32 = 60_000_000;

/// Link settings for the bus. `clock_hz` is the only field meant to change
/// after construction; the others are overwritten by the values the kernel
/// reports back at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub mode: u8,
    pub bits_per_word: u8,
    pub min_clock_hz: u32,
    pub max_clock_hz: u32,
    pub clock_hz: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: SPI_MODE_1,
            bits_per_word: BITS_PER_WORD,
            min_clock_hz: MIN_CLOCK_HZ,
            max_clock_hz: MAX_CLOCK_HZ,
            clock_hz: MIN_CLOCK_HZ,
        }
    }
}
