//! ORION reference-laser serial protocol.
//!
//! Requests:  `HDR PKT_ID LEN SRC DEST TYPE CMD DATA.. CHK FTR`
//! Responses: `HDR PKT_ID LEN SRC DEST TYPE STATUS CMD DATA.. CHK FTR`
//!
//! `LEN` is the total packet length minus two. The link runs at 9600 baud, 8-N-1.

pub mod codec;
pub mod command;
pub mod laser;

pub use codec::{
    Request, Response, checksum, decode, decode_request, encode, encode_response, read_from_stream,
    read_packet,
};
pub use command::{Command, Direction, status_text};
pub use laser::{OrionLaser, SerialSettings, find};

pub const HEADER: u8 = 0xA9;
pub const FOOTER: u8 = 0xA5;
pub const ID_COMPUTER: u8 = 0x00;
pub const ID_LASER: u8 = 0xFF;
pub const STATUS_OK: u8 = 0x00;
/// Smallest legal packet: a request with no payload.
pub const MIN_PACKET_LEN: usize = 9;
