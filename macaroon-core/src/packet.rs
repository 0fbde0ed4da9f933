//! Append-only packet codec
//!
//! Every macaroon field is stored as a packet inside one growable buffer:
//!
//! ```text
//! [u16 little-endian total length][u8 field tag][payload]
//! ```
//!
//! The total length includes the three header bytes. A [`Packet`] is a span
//! into the buffer rather than an owned copy, so the buffer itself is the
//! binary form of the macaroon minus its trailing signature packet.

use crate::error::MacaroonError;
use std::fmt;

/// Size of the length prefix plus the field tag.
pub const HEADER_LEN: usize = 3;

/// Largest total packet length representable by the length prefix.
pub const MAX_PACKET_LEN: usize = 0xffff;

/// Fewest bytes that may remain in a buffer for a packet to be parsed from it.
pub const MIN_PACKET_REMAINING: usize = 6;

/// Field tags of the binary encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Field {
    Invalid = 0,
    Location = 1,
    Identifier = 2,
    Signature = 3,
    CaveatId = 4,
    VerificationId = 5,
    CaveatLocation = 6,
}

impl Field {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Field::Location,
            2 => Field::Identifier,
            3 => Field::Signature,
            4 => Field::CaveatId,
            5 => Field::VerificationId,
            6 => Field::CaveatLocation,
            _ => Field::Invalid,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Invalid => write!(f, "invalid"),
            Field::Location => write!(f, "location"),
            Field::Identifier => write!(f, "identifier"),
            Field::Signature => write!(f, "signature"),
            Field::CaveatId => write!(f, "cid"),
            Field::VerificationId => write!(f, "vid"),
            Field::CaveatLocation => write!(f, "cl"),
        }
    }
}

/// A span of a [`PacketBuf`]. The zero-length packet is the "absent" value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Packet {
    start: u32,
    total_len: u16,
}

impl Packet {
    /// The absent packet
    pub const EMPTY: Packet = Packet {
        start: 0,
        total_len: 0,
    };

    pub fn start(&self) -> usize {
        self.start as usize
    }

    /// Total length including the header
    pub fn len(&self) -> usize {
        self.total_len as usize
    }

    /// Offset of the first byte after this packet
    pub fn end(&self) -> usize {
        self.start() + self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }
}

/// Total encoded size of a packet carrying `payload_len` bytes.
pub fn packet_size(payload_len: usize) -> usize {
    HEADER_LEN + payload_len
}

/// Whether a payload of `payload_len` bytes fits in a single packet.
pub fn fits(payload_len: usize) -> bool {
    packet_size(payload_len) <= MAX_PACKET_LEN
}

/// Appends a packet to a raw byte vector, returning the span written.
///
/// Returns `None` without touching `buf` when the packet would exceed
/// [`MAX_PACKET_LEN`].
pub fn append_raw(buf: &mut Vec<u8>, field: Field, payload: &[u8]) -> Option<Packet> {
    let total_len = packet_size(payload.len());
    if total_len > MAX_PACKET_LEN {
        return None;
    }
    let start = u32::try_from(buf.len()).ok()?;
    buf.reserve(total_len);
    buf.extend_from_slice(&(total_len as u16).to_le_bytes());
    buf.push(field.tag());
    buf.extend_from_slice(payload);
    Some(Packet {
        start,
        total_len: total_len as u16,
    })
}

/// An owned, append-only buffer of packets.
///
/// Each macaroon owns its own `PacketBuf`; nothing else can observe or
/// mutate the bytes, so appends never disturb another macaroon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketBuf {
    data: Vec<u8>,
}

impl PacketBuf {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Copies `bytes` into a fresh buffer sized exactly to them.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a packet, failing with a too-big error naming `what`.
    pub fn append(
        &mut self,
        field: Field,
        payload: &[u8],
        what: &'static str,
    ) -> Result<Packet, MacaroonError> {
        append_raw(&mut self.data, field, payload).ok_or(MacaroonError::TooBig { what })
    }

    /// Payload bytes of a packet; empty for the absent packet.
    pub fn payload(&self, packet: Packet) -> &[u8] {
        if packet.is_empty() {
            return &[];
        }
        &self.data[packet.start() + HEADER_LEN..packet.end()]
    }

    /// The whole packet, header included.
    pub fn packet_bytes(&self, packet: Packet) -> &[u8] {
        &self.data[packet.start()..packet.end()]
    }

    pub fn field(&self, packet: Packet) -> Field {
        if packet.is_empty() {
            return Field::Invalid;
        }
        Field::from_tag(self.data[packet.start() + 2])
    }

    /// Bytes from `start` to the end of the buffer.
    pub fn tail(&self, start: usize) -> &[u8] {
        &self.data[start.min(self.data.len())..]
    }

    /// Parses the packet starting at `start`.
    pub fn parse(&self, start: usize) -> Result<Packet, MacaroonError> {
        parse_at(&self.data, start)
    }

    /// Parses the packet at `start` and checks its field tag.
    pub fn expect(&self, start: usize, expected: Field) -> Result<Packet, MacaroonError> {
        let packet = self.parse(start)?;
        let found = self.field(packet);
        if found != expected {
            return Err(MacaroonError::UnexpectedField { found, expected });
        }
        Ok(packet)
    }
}

/// Parses a packet header at `start` within `data`.
pub fn parse_at(data: &[u8], start: usize) -> Result<Packet, MacaroonError> {
    let rest = data.get(start..).unwrap_or_default();
    if rest.len() < MIN_PACKET_REMAINING {
        return Err(MacaroonError::malformed("packet too short"));
    }
    let total_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
    if total_len > rest.len() {
        return Err(MacaroonError::malformed("packet size too big"));
    }
    if total_len < HEADER_LEN {
        return Err(MacaroonError::malformed("packet size smaller than its header"));
    }
    let start = u32::try_from(start)
        .map_err(|_| MacaroonError::malformed("packet offset out of range"))?;
    Ok(Packet {
        start,
        total_len: total_len as u16,
    })
}

/// Reads the field tag of a packet parsed from `data`.
pub fn field_at(data: &[u8], packet: Packet) -> Field {
    if packet.is_empty() {
        return Field::Invalid;
    }
    Field::from_tag(data[packet.start() + 2])
}

/// Reads the payload of a packet parsed from `data`.
pub fn payload_at(data: &[u8], packet: Packet) -> &[u8] {
    if packet.is_empty() {
        return &[];
    }
    &data[packet.start() + HEADER_LEN..packet.end()]
}
