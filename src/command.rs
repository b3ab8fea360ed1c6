use std::fmt;

/// Status byte reported by a healthy device.
pub const STATUS_HEALTHY: u8 = 0;
/// Acknowledgement for [`Command::ShutDown`].
pub const STATUS_NOISE_SOURCES_DOWN: u8 = 200;
/// Acknowledgement for [`Command::StartUp`].
pub const STATUS_NOISE_SOURCES_UP: u8 = 0;

/// Single-byte commands understood by the MicroRNG firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Transfer sequence counter, incremented by the device on every transfer.
    Test,
    /// Random byte passed through the on-chip linear corrector.
    RandomByte,
    /// Unprocessed noise-source byte, for diagnostics only.
    RawRandomByte,
    /// Device status, zero when healthy.
    Status,
    /// Power down both noise sources.
    ShutDown,
    /// Power up both noise sources.
    StartUp,
    /// Restore the factory UART baud rate (19200) on the next power cycle.
    ResetUartBaudRate,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Test,
        Command::RandomByte,
        Command::RawRandomByte,
        Command::Status,
        Command::ShutDown,
        Command::StartUp,
        Command::ResetUartBaudRate,
    ];

    pub const fn as_byte(self) -> u8 {
        match self {
            Command::Test => b't',
            Command::RandomByte => b'l',
            Command::RawRandomByte => b'r',
            Command::Status => b's',
            Command::ShutDown => b'D',
            Command::StartUp => b'U',
            Command::ResetUartBaudRate => b'R',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Command> {
        Command::ALL.into_iter().find(|cmd| cmd.as_byte() == byte)
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Test => "test byte",
            Command::RandomByte => "random byte",
            Command::RawRandomByte => "raw random byte",
            Command::Status => "status byte",
            Command::ShutDown => "shut down noise sources",
            Command::StartUp => "start up noise sources",
            Command::ResetUartBaudRate => "reset UART baud rate",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd.as_byte()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.as_byte() as char, self.description())
    }
}
