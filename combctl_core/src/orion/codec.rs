//! Byte-level packet assembly and validation. No I/O beyond a caller-supplied byte source.

use super::command::{Command, Direction};
use super::{FOOTER, HEADER, ID_COMPUTER, ID_LASER, MIN_PACKET_LEN};
use crate::error::{PacketCheck, ProtocolError};
use std::io::Read;

/// `(-Σ signed(bytes[..len-2])) & 0xFF`; the last two bytes (checksum, footer) are excluded.
pub fn checksum(packet: &[u8]) -> u8 {
    let end = packet.len().saturating_sub(2);
    let sum: i32 = packet[..end].iter().map(|&b| i32::from(b as i8)).sum();
    ((-sum) & 0xFF) as u8
}

/// Minimal big-endian encoding. `None` is empty, `Some(0)` is a single zero byte.
fn value_bytes(value: Option<u64>) -> Vec<u8> {
    match value {
        None => Vec::new(),
        Some(0) => vec![0x00],
        Some(v) => {
            let be = v.to_be_bytes();
            let skip = (v.leading_zeros() / 8) as usize;
            be[skip..].to_vec()
        }
    }
}

fn bytes_value(data: &[u8]) -> Result<Option<u64>, ProtocolError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data.len() > 8 {
        return Err(ProtocolError::MalformedPacket(PacketCheck::PayloadWidth));
    }
    Ok(Some(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))))
}

/// Fill in the length and checksum bytes of an assembled packet.
fn seal(mut packet: Vec<u8>) -> Vec<u8> {
    let n = packet.len();
    packet[2] = (n - 2) as u8;
    packet[n - 2] = checksum(&packet);
    packet
}

/// A computer-to-laser packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub packet_id: u8,
    pub command: Command,
    pub value: Option<u64>,
}

impl Request {
    pub fn new(command: Command, value: Option<u64>, packet_id: u8) -> Self {
        Self {
            packet_id,
            command,
            value,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let data = value_bytes(self.value);
        let mut packet = Vec::with_capacity(MIN_PACKET_LEN + data.len());
        packet.extend_from_slice(&[
            HEADER,
            self.packet_id,
            0x00,
            ID_COMPUTER,
            ID_LASER,
            self.command.direction().type_byte(),
            self.command.id(),
        ]);
        packet.extend_from_slice(&data);
        packet.extend_from_slice(&[0x00, FOOTER]);
        seal(packet)
    }
}

/// A laser-to-computer packet, structurally validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub packet_id: u8,
    pub status: u8,
    pub command_id: u8,
    pub data: Vec<u8>,
}

impl Response {
    /// Strip leading pad bytes, validate, and split out the fields.
    pub fn parse(raw: &[u8], expected_packet_id: Option<u8>) -> Result<Self, ProtocolError> {
        let mut start = 0;
        while raw.len() - start > MIN_PACKET_LEN && raw[start] == 0x00 {
            start += 1;
        }
        let packet = &raw[start..];
        validate(packet, expected_packet_id)?;
        let n = packet.len();
        Ok(Self {
            packet_id: packet[1],
            status: packet[6],
            command_id: packet[7],
            data: packet[8..n - 2].to_vec(),
        })
    }

    pub fn value(&self) -> Result<Option<u64>, ProtocolError> {
        bytes_value(&self.data)
    }

    /// Payload as trimmed ASCII text (used for the part number).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string()
    }
}

/// Structural checks in order: minimum length, checksum, declared length,
/// header, footer, then packet id when one is expected.
fn validate(packet: &[u8], expected_packet_id: Option<u8>) -> Result<(), ProtocolError> {
    let fail = |check| Err(ProtocolError::MalformedPacket(check));
    let n = packet.len();
    if n < MIN_PACKET_LEN {
        return fail(PacketCheck::MinimumLength);
    }
    if checksum(packet) != packet[n - 2] {
        return fail(PacketCheck::Checksum);
    }
    if usize::from(packet[2]) != n - 2 {
        return fail(PacketCheck::DeclaredLength);
    }
    if packet[0] != HEADER {
        return fail(PacketCheck::Header);
    }
    if packet[n - 1] != FOOTER {
        return fail(PacketCheck::Footer);
    }
    if let Some(id) = expected_packet_id
        && packet[1] != id
    {
        return fail(PacketCheck::PacketId);
    }
    Ok(())
}

/// Encode a request for a raw command id.
pub fn encode(
    command_id: u8,
    value: Option<u64>,
    packet_id: u8,
) -> Result<Vec<u8>, ProtocolError> {
    let command = Command::from_id(command_id)?;
    Ok(Request::new(command, value, packet_id).to_bytes())
}

/// Encode a response as the laser would send it.
pub fn encode_response(command: Command, value: Option<u64>, status: u8, packet_id: u8) -> Vec<u8> {
    let data = value_bytes(value);
    let mut packet = Vec::with_capacity(MIN_PACKET_LEN + 1 + data.len());
    packet.extend_from_slice(&[
        HEADER,
        packet_id,
        0x00,
        ID_LASER,
        ID_COMPUTER,
        command.direction().type_byte(),
        status,
        command.id(),
    ]);
    packet.extend_from_slice(&data);
    packet.extend_from_slice(&[0x00, FOOTER]);
    seal(packet)
}

/// Decode a response into `(value, status)`.
pub fn decode(raw: &[u8], expected_packet_id: Option<u8>) -> Result<(Option<u64>, u8), ProtocolError> {
    let response = Response::parse(raw, expected_packet_id)?;
    Ok((response.value()?, response.status))
}

/// Decode a request packet (laser side of the link).
pub fn decode_request(raw: &[u8]) -> Result<Request, ProtocolError> {
    validate(raw, None)?;
    let n = raw.len();
    let command = Command::from_id(raw[6])?;
    if Direction::from_type_byte(raw[5]) != Some(command.direction()) {
        return Err(ProtocolError::InvalidCommand(raw[6]));
    }
    Ok(Request {
        packet_id: raw[1],
        command,
        value: bytes_value(&raw[7..n - 2])?,
    })
}

/// Pull one packet from a byte source: skip to the header, read id and
/// length, then the `len - 1` remaining bytes.
pub fn read_from_stream<F>(mut next_byte: F) -> Result<Vec<u8>, ProtocolError>
where
    F: FnMut() -> Option<u8>,
{
    loop {
        match next_byte() {
            Some(HEADER) => break,
            Some(_) => continue,
            None => {
                return Err(ProtocolError::Stream(
                    "stream did not contain header".to_string(),
                ));
            }
        }
    }
    let short = || ProtocolError::Stream("insufficient bytes in stream".to_string());
    let packet_id = next_byte().ok_or_else(short)?;
    let len = next_byte().ok_or_else(short)?;
    let remaining = usize::from(len).saturating_sub(1);

    let mut packet = Vec::with_capacity(3 + remaining);
    packet.extend_from_slice(&[HEADER, packet_id, len]);
    for _ in 0..remaining {
        match next_byte() {
            Some(b) => packet.push(b),
            None => {
                return Err(ProtocolError::Stream(format!(
                    "insufficient bytes to match packet size ({} vs {})",
                    packet.len(),
                    remaining + 3
                )));
            }
        }
    }
    Ok(packet)
}

/// `read_from_stream` over any reader. A zero-length read or I/O error ends the stream.
pub fn read_packet<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut io_error = None;
    let result = read_from_stream(|| {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                io_error = Some(e);
                None
            }
        }
    });
    match (result, io_error) {
        (Err(ProtocolError::Stream(msg)), Some(e)) => {
            Err(ProtocolError::Stream(format!("{msg}: {e}")))
        }
        (r, _) => r,
    }
}
