//! In-memory MicroRNG used by the unit tests.

use std::cell::{Ref, RefCell, RefMut};
use std::io;
use std::path::Path;
use std::rc::Rc;

use crate::command::{Command, STATUS_NOISE_SOURCES_DOWN, STATUS_NOISE_SOURCES_UP};
use crate::spi::{BusOpener, LinkParameter, SpiBus};

#[derive(Debug)]
pub(crate) struct SimState {
    pub opened: usize,
    pub closed: usize,
    pub config_calls: Vec<LinkParameter>,
    pub mode: u8,
    pub bits_per_word: u8,
    pub max_speed_hz: u32,
    /// Overrides the clock the kernel reports back.
    pub speed_read_back: Option<u32>,

    /// Transfers attempted, failed ones included.
    pub transfers: usize,
    pub counter: u8,
    pub pending: Option<u8>,
    pub status: u8,
    pub noise_enabled: bool,
    pub random: u32,
    /// Responses above this clock come back as 0xff.
    pub max_reliable_hz: u32,

    pub fail_open: bool,
    pub fail_config: Option<LinkParameter>,
    pub fail_at_transfer: Option<usize>,
    pub corrupt_transfer: Option<usize>,
    pub short_transfer: bool,
}

impl Default for SimState {
    fn default() -> Self {
        SimState {
            opened: 0,
            closed: 0,
            config_calls: Vec::new(),
            mode: 0,
            bits_per_word: 0,
            max_speed_hz: 0,
            speed_read_back: None,
            transfers: 0,
            counter: 0,
            pending: None,
            status: 0,
            noise_enabled: true,
            random: 0x2545_f491,
            max_reliable_hz: u32::MAX,
            fail_open: false,
            fail_config: None,
            fail_at_transfer: None,
            corrupt_transfer: None,
            short_transfer: false,
        }
    }
}

impl SimState {
    fn next_random(&mut self) -> u8 {
        // xorshift32
        let mut x = self.random;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.random = x;
        (x >> 24) as u8
    }

    fn respond(&mut self, cmd: Option<u8>) -> u8 {
        match cmd.and_then(Command::from_byte) {
            Some(Command::Test) => self.counter,
            Some(Command::RandomByte) | Some(Command::RawRandomByte) => self.next_random(),
            Some(Command::Status) | Some(Command::ResetUartBaudRate) => self.status,
            Some(Command::ShutDown) => {
                self.noise_enabled = false;
                self.status = STATUS_NOISE_SOURCES_DOWN;
                self.status
            }
            Some(Command::StartUp) => {
                self.noise_enabled = true;
                self.status = STATUS_NOISE_SOURCES_UP;
                self.status
            }
            None => 0,
        }
    }

    fn check_config(&mut self, parameter: LinkParameter) -> io::Result<()> {
        self.config_calls.push(parameter);
        if self.fail_config == Some(parameter) {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "ioctl rejected"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct SimOpener(Rc<RefCell<SimState>>);

impl SimOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, SimState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, SimState> {
        self.0.borrow_mut()
    }
}

impl BusOpener for SimOpener {
    type Bus = SimBus;

    fn open(&mut self, path: &Path) -> io::Result<SimBus> {
        let mut state = self.0.borrow_mut();
        if state.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such device: {}", path.display()),
            ));
        }
        state.opened += 1;
        state.config_calls.clear();
        Ok(SimBus(Rc::clone(&self.0)))
    }
}

pub(crate) struct SimBus(Rc<RefCell<SimState>>);

impl Drop for SimBus {
    fn drop(&mut self) {
        self.0.borrow_mut().closed += 1;
    }
}

impl SpiBus for SimBus {
    fn set_mode(&mut self, mode: u8) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::WriteMode)?;
        s.mode = mode;
        Ok(())
    }

    fn mode(&mut self) -> io::Result<u8> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::ReadMode)?;
        Ok(s.mode)
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::WriteBitsPerWord)?;
        s.bits_per_word = bits;
        Ok(())
    }

    fn bits_per_word(&mut self) -> io::Result<u8> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::ReadBitsPerWord)?;
        Ok(s.bits_per_word)
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::WriteMaxSpeed)?;
        s.max_speed_hz = speed_hz;
        Ok(())
    }

    fn max_speed_hz(&mut self) -> io::Result<u32> {
        let mut s = self.0.borrow_mut();
        s.check_config(LinkParameter::ReadMaxSpeed)?;
        Ok(s.speed_read_back.unwrap_or(s.max_speed_hz))
    }

    fn transfer(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        speed_hz: u32,
        _bits_per_word: u8,
    ) -> io::Result<usize> {
        let mut s = self.0.borrow_mut();
        let index = s.transfers;
        s.transfers += 1;

        if s.fail_at_transfer == Some(index) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bus fault"));
        }
        if s.short_transfer {
            return Ok(0);
        }

        s.counter = s.counter.wrapping_add(1);
        let pending = s.pending.take();
        let mut response = s.respond(pending);
        s.pending = tx.first().copied();

        if speed_hz > s.max_reliable_hz {
            response = 0xff;
        } else if s.corrupt_transfer == Some(index) {
            response = response.wrapping_add(0x55);
        }
        rx[0] = response;
        Ok(1)
    }
}
