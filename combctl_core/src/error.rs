use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CombError {
    #[error("instrument i/o error: {0}")]
    InstrumentIo(String),
    #[error("instrument fault: {0}")]
    InstrumentFault(String),
    #[error("timeout waiting for instrument")]
    Timeout,
    #[error("value {value} rejected: outside [{min}, {max}]")]
    ValidationRejected { value: f64, min: f64, max: f64 },
    #[error("no channel with index {0}")]
    UnknownChannel(usize),
    #[error("invalid state: {0}")]
    State(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Which structural check rejected an ORION packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCheck {
    MinimumLength,
    Checksum,
    DeclaredLength,
    Header,
    Footer,
    PacketId,
    PayloadWidth,
}

impl fmt::Display for PacketCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketCheck::MinimumLength => "minimum length",
            PacketCheck::Checksum => "checksum",
            PacketCheck::DeclaredLength => "declared length",
            PacketCheck::Header => "header",
            PacketCheck::Footer => "footer",
            PacketCheck::PacketId => "packet id",
            PacketCheck::PayloadWidth => "payload width",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid command id 0x{0:02X}")]
    InvalidCommand(u8),
    #[error("malformed packet: {0} check failed")]
    MalformedPacket(PacketCheck),
    #[error("stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("invalid filter config: {0}")]
    InvalidFilterConfig(&'static str),
    #[error("invalid limits: min {min} > max {max}")]
    InvalidLimits { min: f64, max: f64 },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
