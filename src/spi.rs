use linux_embedded_hal::spidev::{spidevioctl, SpiModeFlags, Spidev, SpidevTransfer};
use log::debug;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

/// One of the configuration calls issued while bringing up the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkParameter {
    WriteMode,
    ReadMode,
    WriteBitsPerWord,
    ReadBitsPerWord,
    WriteMaxSpeed,
    ReadMaxSpeed,
}

impl fmt::Display for LinkParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkParameter::WriteMode => "write mode",
            LinkParameter::ReadMode => "read mode",
            LinkParameter::WriteBitsPerWord => "transmission word bits",
            LinkParameter::ReadBitsPerWord => "word bits",
            LinkParameter::WriteMaxSpeed => "transmission clock frequency",
            LinkParameter::ReadMaxSpeed => "clock frequency",
        };
        f.write_str(name)
    }
}

/// An open SPI bus descriptor. Dropping the value closes it.
pub trait SpiBus {
    fn set_mode(&mut self, mode: u8) -> io::Result<()>;
    fn mode(&mut self) -> io::Result<u8>;
    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()>;
    fn bits_per_word(&mut self) -> io::Result<u8>;
    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()>;
    fn max_speed_hz(&mut self) -> io::Result<u32>;

    /// Full-duplex transfer of `tx` while filling `rx`.
    ///
    /// Returns the number of bytes moved across the bus.
    fn transfer(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        speed_hz: u32,
        bits_per_word: u8,
    ) -> io::Result<usize>;
}

/// Opens bus descriptors by device path.
pub trait BusOpener {
    type Bus: SpiBus;

    fn open(&mut self, path: &Path) -> io::Result<Self::Bus>;
}

/// Linux spidev character device, e.g. `/dev/spidev0.0`.
pub struct SpidevBus {
    spidev: Spidev,
    device_path: String,
}

impl SpidevBus {
    pub fn open(device_path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)?;
        debug!("Opened SPI device: {}", device_path.display());

        Ok(SpidevBus {
            spidev: Spidev::new(file),
            device_path: device_path.display().to_string(),
        })
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn fd(&self) -> RawFd {
        self.spidev.inner().as_raw_fd()
    }
}

impl SpiBus for SpidevBus {
    fn set_mode(&mut self, mode: u8) -> io::Result<()> {
        spidevioctl::set_mode(self.fd(), SpiModeFlags::from_bits_truncate(u32::from(mode)))
    }

    fn mode(&mut self) -> io::Result<u8> {
        spidevioctl::get_mode(self.fd())
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        spidevioctl::set_bits_per_word(self.fd(), bits)
    }

    fn bits_per_word(&mut self) -> io::Result<u8> {
        spidevioctl::get_bits_per_word(self.fd())
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        spidevioctl::set_max_speed_hz(self.fd(), speed_hz)
    }

    fn max_speed_hz(&mut self) -> io::Result<u32> {
        spidevioctl::get_max_speed_hz(self.fd())
    }

    fn transfer(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        speed_hz: u32,
        bits_per_word: u8,
    ) -> io::Result<usize> {
        let len = tx.len().min(rx.len());
        let mut transfer = SpidevTransfer::read_write(&tx[..len], &mut rx[..len]);
        transfer.speed_hz = speed_hz;
        transfer.bits_per_word = bits_per_word;
        transfer.delay_usecs = 0;
        self.spidev.transfer(&mut transfer)?;
        Ok(len)
    }
}

impl Drop for SpidevBus {
    fn drop(&mut self) {
        debug!("Closing SPI device: {}", self.device_path);
    }
}

/// Opens [`SpidevBus`] descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpidevOpener;

impl BusOpener for SpidevOpener {
    type Bus = SpidevBus;

    fn open(&mut self, path: &Path) -> io::Result<SpidevBus> {
        SpidevBus::open(path)
    }
}
