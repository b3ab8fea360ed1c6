//! MicroRNG device driver.
//!
//! The device answers with a one-transfer delay: the byte clocked in while
//! sending command `C` is the response to the command sent on the previous
//! transfer. [`MicroRng::execute_command`] hides this by priming the pipeline
//! whenever the command changes.

use log::{debug, info, trace, warn};
use std::io;
use std::path::Path;

use crate::command::Command;
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::spi::{BusOpener, LinkParameter, SpiBus, SpidevOpener};

/// Consecutive test bytes checked by [`MicroRng::validate_device`].
pub const DEVICE_VALIDATION_TRANSFERS: usize = 16;
/// Test bytes checked by [`MicroRng::validate_communication`].
pub const COMMUNICATION_VALIDATION_BYTES: usize = 2048;

const NOT_CONNECTED_MESSAGE: &str = "Not connected";

/// True when every byte is its predecessor plus one, wrapping at 256.
pub fn is_incrementing(bytes: &[u8]) -> bool {
    bytes.windows(2).all(|w| w[1] == w[0].wrapping_add(1))
}

/// Driver for one MicroRNG device on an exclusively owned SPI bus.
pub struct MicroRng<O: BusOpener = SpidevOpener> {
    opener: O,
    bus: Option<O::Bus>,
    link: LinkConfig,
    last_sent: Option<u8>,
    last_error: String,
}

impl MicroRng<SpidevOpener> {
    pub fn new() -> Self {
        Self::with_opener(SpidevOpener)
    }
}

impl Default for MicroRng<SpidevOpener> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: BusOpener> MicroRng<O> {
    pub fn with_opener(opener: O) -> Self {
        MicroRng {
            opener,
            bus: None,
            link: LinkConfig::default(),
            last_sent: None,
            last_error: NOT_CONNECTED_MESSAGE.to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    /// Message of the most recent failure.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn link_config(&self) -> &LinkConfig {
        &self.link
    }

    pub fn clock_hz(&self) -> u32 {
        self.link.clock_hz
    }

    /// Sets the clock used by subsequent transfers. Setting it too high
    /// garbles communication; see [`MicroRng::autodetect_max_frequency`].
    pub fn set_clock_hz(&mut self, clock_hz: u32) {
        self.link.clock_hz = clock_hz;
    }

    pub fn min_clock_hz(&self) -> u32 {
        self.link.min_clock_hz
    }

    pub fn max_clock_hz(&self) -> u32 {
        self.link.max_clock_hz
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.last_error = err.to_string();
        Err(err)
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            self.fail(Error::NotConnected)
        }
    }

    /// Opens the bus at `path` and configures mode, word size and clock,
    /// reading each value back after writing it.
    pub fn connect<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if self.is_connected() {
            return self.fail(Error::AlreadyConnected);
        }
        self.last_error.clear();

        let mut bus = match self.opener.open(path) {
            Ok(bus) => bus,
            Err(source) => {
                return self.fail(Error::Open {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        // The bus is dropped, and so closed, on any configuration failure.
        let link = match configure_link(&mut bus, &self.link) {
            Ok(link) => link,
            Err((parameter, source)) => {
                return self.fail(Error::Config { parameter, source });
            }
        };

        info!(
            "Connected to {} (mode {}, {} bits, {} Hz)",
            path.display(),
            link.mode,
            link.bits_per_word,
            link.clock_hz
        );
        self.link = link;
        self.bus = Some(bus);
        self.last_sent = None;
        Ok(())
    }

    /// Closes the bus and returns the driver to its freshly constructed state.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.bus.take() {
            Some(bus) => {
                drop(bus);
                self.link = LinkConfig::default();
                self.last_sent = None;
                self.last_error = NOT_CONNECTED_MESSAGE.to_string();
                info!("Disconnected from MicroRNG");
                Ok(())
            }
            None => self.fail(Error::NotConnected),
        }
    }

    /// Sends `cmd` in a single transfer and returns the byte received,
    /// which answers whatever command was sent before it.
    pub fn exchange_byte(&mut self, cmd: u8) -> Result<u8> {
        let speed_hz = self.link.clock_hz;
        let bits = self.link.bits_per_word;
        let bus = match self.bus.as_mut() {
            Some(bus) => bus,
            None => return self.fail(Error::NotConnected),
        };

        let tx = [cmd];
        let mut rx = [0u8; 1];
        let outcome = match bus.transfer(&tx, &mut rx, speed_hz, bits) {
            Ok(n) if n >= 1 => Ok(rx[0]),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("transferred {} of 1 bytes", n),
            )),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(byte) => {
                trace!("SPI exchange: sent 0x{:02x}, received 0x{:02x}", cmd, byte);
                self.last_sent = Some(cmd);
                Ok(byte)
            }
            Err(e) => {
                // Pipeline state is unknown after a failed transfer.
                self.last_sent = None;
                warn!("SPI exchange of 0x{:02x} failed: {}", cmd, e);
                self.fail(Error::Transfer(e))
            }
        }
    }

    /// Executes `cmd` and returns its response byte.
    ///
    /// When `cmd` differs from the last command sent, the first transfer
    /// only primes the pipeline and its byte is discarded.
    pub fn execute_command(&mut self, cmd: Command) -> Result<u8> {
        self.ensure_connected()?;
        let byte = cmd.as_byte();
        if self.last_sent != Some(byte) {
            self.exchange_byte(byte)?;
        }
        self.exchange_byte(byte)
    }

    /// Transfer sequence counter, used to detect mis-framing.
    pub fn retrieve_test_byte(&mut self) -> Result<u8> {
        self.execute_command(Command::Test)
    }

    /// Random byte processed by the on-chip linear corrector (P. Lacharme).
    pub fn retrieve_random_byte(&mut self) -> Result<u8> {
        self.execute_command(Command::RandomByte)
    }

    /// Unprocessed random byte, meant for verification or external
    /// post-processing only.
    pub fn retrieve_raw_random_byte(&mut self) -> Result<u8> {
        self.execute_command(Command::RawRandomByte)
    }

    /// Zero when healthy, otherwise a device fault code.
    pub fn retrieve_status_byte(&mut self) -> Result<u8> {
        self.execute_command(Command::Status)
    }

    /// Powers down both noise sources. The device acknowledges with
    /// [`crate::STATUS_NOISE_SOURCES_DOWN`].
    pub fn shut_down_noise_sources(&mut self) -> Result<u8> {
        self.execute_command(Command::ShutDown)
    }

    /// Powers the noise sources back up. The device acknowledges with
    /// [`crate::STATUS_NOISE_SOURCES_UP`].
    pub fn start_up_noise_sources(&mut self) -> Result<u8> {
        self.execute_command(Command::StartUp)
    }

    /// Restores the factory UART baud rate. Has no effect on SPI and only
    /// applies after the device is power cycled or reset.
    pub fn reset_uart(&mut self) -> Result<u8> {
        self.execute_command(Command::ResetUartBaudRate)
    }

    pub fn retrieve_test_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.retrieve_bytes(Command::Test, "test bytes", buf)
    }

    pub fn retrieve_random_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.retrieve_bytes(Command::RandomByte, "random bytes", buf)
    }

    pub fn retrieve_raw_random_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.retrieve_bytes(Command::RawRandomByte, "raw random bytes", buf)
    }

    /// Fills `buf` one command at a time. On failure the bytes before the
    /// failing position are valid and the rest of `buf` is untouched.
    fn retrieve_bytes(&mut self, cmd: Command, what: &'static str, buf: &mut [u8]) -> Result<()> {
        self.ensure_connected()?;
        if buf.is_empty() {
            return self.fail(Error::InvalidLength { what });
        }
        for slot in buf.iter_mut() {
            *slot = self.execute_command(cmd)?;
        }
        Ok(())
    }

    /// Checks that the device answers 16 test commands with a counter that
    /// increments by one each time.
    pub fn validate_device(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let mut expected = self.retrieve_test_byte()?;
        for _ in 1..DEVICE_VALIDATION_TRANSFERS {
            expected = expected.wrapping_add(1);
            let id = self.retrieve_test_byte()?;
            if id != expected {
                debug!("Transfer id 0x{:02x}, expected 0x{:02x}", id, expected);
                return self.fail(Error::DeviceNotFound);
            }
        }
        Ok(())
    }

    /// Sustained version of [`MicroRng::validate_device`] over a 2048 byte
    /// block at the current clock.
    pub fn validate_communication(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let mut block = [0u8; COMMUNICATION_VALIDATION_BYTES];
        self.retrieve_test_bytes(&mut block)?;
        if is_incrementing(&block) {
            Ok(())
        } else {
            self.fail(Error::ValidationFailed)
        }
    }

    /// Raises the clock one minimum-clock step at a time while communication
    /// still validates, stopping at the first failure and restoring the last
    /// rate that worked.
    ///
    /// Returns the selected clock. Fails, with the clock left at its previous
    /// value, if not even the first step validates.
    pub fn autodetect_max_frequency(&mut self) -> Result<u32> {
        self.ensure_connected()?;
        let step = self.link.min_clock_hz;
        let max = self.link.max_clock_hz;
        let mut found = false;

        let mut freq_hz = step;
        while freq_hz < max {
            let prev_hz = self.clock_hz();
            self.set_clock_hz(freq_hz);
            match self.validate_communication() {
                Ok(()) => {
                    debug!("Communication valid at {} Hz", freq_hz);
                    found = true;
                }
                Err(e) => {
                    debug!("Communication failed at {} Hz: {}", freq_hz, e);
                    self.set_clock_hz(prev_hz);
                    if !found {
                        return Err(e);
                    }
                    break;
                }
            }
            freq_hz = match freq_hz.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        info!("Maximum SPI clock frequency: {} Hz", self.clock_hz());
        Ok(self.clock_hz())
    }
}

impl<O: BusOpener> Drop for MicroRng<O> {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.disconnect();
        }
    }
}

type ConfigFailure = (LinkParameter, io::Error);

fn configure_link<B: SpiBus>(
    bus: &mut B,
    requested: &LinkConfig,
) -> std::result::Result<LinkConfig, ConfigFailure> {
    let mut link = requested.clone();

    debug!("Setting SPI mode {}", link.mode);
    bus.set_mode(link.mode)
        .map_err(|e| (LinkParameter::WriteMode, e))?;
    link.mode = bus.mode().map_err(|e| (LinkParameter::ReadMode, e))?;

    debug!("Setting {} bits per word", link.bits_per_word);
    bus.set_bits_per_word(link.bits_per_word)
        .map_err(|e| (LinkParameter::WriteBitsPerWord, e))?;
    link.bits_per_word = bus
        .bits_per_word()
        .map_err(|e| (LinkParameter::ReadBitsPerWord, e))?;

    debug!("Setting clock to {} Hz", link.clock_hz);
    bus.set_max_speed_hz(link.clock_hz)
        .map_err(|e| (LinkParameter::WriteMaxSpeed, e))?;
    link.clock_hz = bus
        .max_speed_hz()
        .map_err(|e| (LinkParameter::ReadMaxSpeed, e))?;

    Ok(link)
}
