use crate::error::ProtocolError;
use std::fmt;

/// Whether a command reads from or writes to the laser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Wire value of the command-type byte.
    #[inline]
    pub fn type_byte(self) -> u8 {
        match self {
            Direction::Read => 0x01,
            Direction::Write => 0x02,
        }
    }

    pub fn from_type_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Direction::Read),
            0x02 => Some(Direction::Write),
            _ => None,
        }
    }
}

/// Pump current window in 0.1 mA.
pub const CURRENT_LIMITS: (u64, u64) = (600, 1200);
/// Thermistor set-point window in ohms.
pub const TEMPERATURE_LIMITS: (u64, u64) = (6500, 15000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    FirmwareRead,
    DefaultCurrentRead,
    DefaultTempRead,
    SerialNumberRead,
    OnTimeRead,
    StatusRead,
    ActualTempRead,
    BoardTempRead,
    PhotodiodeVoltageRead,
    VolatileCurrentRead,
    VolatileCurrentWrite,
    VolatileTempRead,
    VolatileTempWrite,
    EnableSerial,
    DisableSerial,
    NonVolatileCurrentRead,
    NonVolatileCurrentWrite,
    NonVolatileTempRead,
    NonVolatileTempWrite,
    PartNumberRead,
    ItuChannelRead,
}

struct Entry {
    command: Command,
    id: u8,
    name: &'static str,
    direction: Direction,
    limits: Option<(u64, u64)>,
}

const fn entry(
    command: Command,
    id: u8,
    name: &'static str,
    direction: Direction,
    limits: Option<(u64, u64)>,
) -> Entry {
    Entry {
        command,
        id,
        name,
        direction,
        limits,
    }
}

use Direction::{Read, Write};

static TABLE: [Entry; 21] = [
    entry(Command::FirmwareRead, 0x01, "frmwRead", Read, None),
    entry(Command::DefaultCurrentRead, 0x04, "defIRead", Read, None),
    entry(Command::DefaultTempRead, 0x06, "defTempRead", Read, None),
    entry(Command::SerialNumberRead, 0x08, "snRead", Read, None),
    entry(Command::OnTimeRead, 0x0A, "ontimeRead", Read, None),
    entry(Command::StatusRead, 0x0E, "statusRead", Read, None),
    entry(Command::ActualTempRead, 0x11, "actTempRead", Read, None),
    entry(Command::BoardTempRead, 0x12, "brdTempRead", Read, None),
    entry(Command::PhotodiodeVoltageRead, 0x13, "phtVRead", Read, None),
    entry(Command::VolatileCurrentRead, 0x1D, "volIRead", Read, None),
    entry(Command::VolatileCurrentWrite, 0x1E, "volIWrt", Write, Some(CURRENT_LIMITS)),
    entry(Command::VolatileTempRead, 0x1F, "volTempRead", Read, None),
    entry(Command::VolatileTempWrite, 0x20, "volTempWrt", Write, Some(TEMPERATURE_LIMITS)),
    entry(Command::EnableSerial, 0x24, "enbSer", Write, None),
    entry(Command::DisableSerial, 0x25, "disSer", Write, None),
    entry(Command::NonVolatileCurrentRead, 0x26, "nvlIRead", Read, None),
    entry(Command::NonVolatileCurrentWrite, 0x27, "nvlIWrt", Write, Some(CURRENT_LIMITS)),
    entry(Command::NonVolatileTempRead, 0x28, "nvlTempRead", Read, None),
    entry(Command::NonVolatileTempWrite, 0x29, "nvlTempWrt", Write, Some(TEMPERATURE_LIMITS)),
    entry(Command::PartNumberRead, 0x42, "pnRead", Read, None),
    entry(Command::ItuChannelRead, 0x44, "ituRead", Read, None),
];

impl Command {
    pub const ALL: [Command; 21] = [
        Command::FirmwareRead,
        Command::DefaultCurrentRead,
        Command::DefaultTempRead,
        Command::SerialNumberRead,
        Command::OnTimeRead,
        Command::StatusRead,
        Command::ActualTempRead,
        Command::BoardTempRead,
        Command::PhotodiodeVoltageRead,
        Command::VolatileCurrentRead,
        Command::VolatileCurrentWrite,
        Command::VolatileTempRead,
        Command::VolatileTempWrite,
        Command::EnableSerial,
        Command::DisableSerial,
        Command::NonVolatileCurrentRead,
        Command::NonVolatileCurrentWrite,
        Command::NonVolatileTempRead,
        Command::NonVolatileTempWrite,
        Command::PartNumberRead,
        Command::ItuChannelRead,
    ];

    fn entry(self) -> &'static Entry {
        // TABLE and ALL share ordering
        &TABLE[self as usize]
    }

    pub fn from_id(id: u8) -> Result<Self, ProtocolError> {
        TABLE
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.command)
            .ok_or(ProtocolError::InvalidCommand(id))
    }

    /// Look up a command by its protocol mnemonic (e.g. `volTempRead`), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        TABLE
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.command)
    }

    #[inline]
    pub fn id(self) -> u8 {
        self.entry().id
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.entry().name
    }

    #[inline]
    pub fn direction(self) -> Direction {
        self.entry().direction
    }

    /// Default accepted `[min, max]` for write commands that carry a set-point.
    #[inline]
    pub fn limits(self) -> Option<(u64, u64)> {
        self.entry().limits
    }

    /// Encoded request packet for this command.
    pub fn request(self, value: Option<u64>, packet_id: u8) -> Vec<u8> {
        super::codec::Request::new(self, value, packet_id).to_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.id())
    }
}

/// Human-readable text for a laser status byte.
pub fn status_text(code: u8) -> &'static str {
    match code {
        0x00 => "no error",
        0x01 => "invalid command (incorrect packet format - header, footer, checksum)",
        0x04 => "command timeout (packet has not been correctly terminated in 65 sec)",
        0x08 => "correct packet format, invalid command type, command ID",
        0x20 => "invalid switch command (during firmware update)",
        0x21 => "invalid commit command (during firmware update)",
        0x22 => "invalid erase command (during firmware update)",
        0x23 => "write flash error (during firmware update)",
        0x24 => "invalid flash address (in the firmware update write flash command)",
        0x25 => "invalid page checksum (during firmware update)",
        0x30 => "correct packet format, command argument (set-point) out of range",
        _ => "unknown status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_enum() {
        for (i, c) in Command::ALL.iter().enumerate() {
            assert_eq!(TABLE[i].command, *c);
            assert_eq!(Command::from_id(c.id()), Ok(*c));
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert_eq!(Command::from_id(0x02), Err(ProtocolError::InvalidCommand(0x02)));
    }

    #[test]
    fn set_point_writes_carry_limits() {
        assert_eq!(Command::VolatileCurrentWrite.limits(), Some((600, 1200)));
        assert_eq!(Command::NonVolatileTempWrite.limits(), Some((6500, 15000)));
        assert_eq!(Command::EnableSerial.limits(), None);
        assert_eq!(Command::EnableSerial.direction(), Direction::Write);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(Command::from_name("voltempread"), Some(Command::VolatileTempRead));
        assert_eq!(Command::from_name("nope"), None);
    }

    #[test]
    fn status_codes_render() {
        assert_eq!(status_text(0x00), "no error");
        assert!(status_text(0x30).contains("out of range"));
        assert_eq!(status_text(0x99), "unknown status");
    }
}
