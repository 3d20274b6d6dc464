//! Packet codec
//!
//! Every packet starts with a fixed 20-byte header:
//! ```text
//! +--------+-------------------+----------+-----------------+
//! | type   | user              | reserved | room            |
//! | 1 byte | 10 bytes, 0-padded| 1 byte 0 | 8 bytes, 0-pad  |
//! +--------+-------------------+----------+-----------------+
//! ```
//! CHATMSG and SENDMSG carry a payload of one length byte followed by that
//! many bytes of text. All other types are header-only.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ChatError;

/// Fixed header size
pub const HEADER_LEN: usize = 20;

/// Width of the username field
pub const USER_FIELD_LEN: usize = 10;

/// Width of the room field
pub const ROOM_FIELD_LEN: usize = 8;

/// Longest text a single message payload can carry
pub const MAX_TEXT_LEN: usize = u8::MAX as usize;

const USER_OFFSET: usize = 1;
const RESERVED_OFFSET: usize = 11;
const ROOM_OFFSET: usize = 12;

/// Packet type tags
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Server keepalive probe
    Ping = 0,
    /// Client registration request
    Reg = 1,
    /// Registration accepted
    RegAck = 2,
    /// Registration refused (name taken or invalid)
    RegReject = 3,
    /// Server -> client delivered message
    ChatMsg = 4,
    /// Client -> server outgoing message
    SendMsg = 5,
    /// Client graceful leave
    Dereg = 6,
}

impl PacketType {
    /// Convert from u8, returns None for unknown types
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketType::Ping),
            1 => Some(PacketType::Reg),
            2 => Some(PacketType::RegAck),
            3 => Some(PacketType::RegReject),
            4 => Some(PacketType::ChatMsg),
            5 => Some(PacketType::SendMsg),
            6 => Some(PacketType::Dereg),
            _ => None,
        }
    }

    /// Whether a packet with this raw type tag carries a length-prefixed payload
    pub fn has_payload(kind: u8) -> bool {
        kind == PacketType::ChatMsg as u8 || kind == PacketType::SendMsg as u8
    }
}

/// Decoded packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Raw type tag; unknown tags are preserved so callers can log them
    pub kind: u8,
    pub user: String,
    pub room: String,
    /// False if either name field held invalid UTF-8 and was decoded lossily
    pub names_exact: bool,
}

impl Header {
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u8(self.kind)
    }
}

fn put_field(buf: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}

/// Read a NUL-padded field; the flag is false if the bytes were not UTF-8
fn read_field(buf: &[u8]) -> (String, bool) {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..end]) {
        Ok(value) => (value.to_string(), true),
        Err(_) => (String::from_utf8_lossy(&buf[..end]).into_owned(), false),
    }
}

/// Encode a 20-byte header
///
/// `user` and `room` are truncated to their field widths. Callers that need
/// exact round-trips validate with `Username`/`RoomName` first.
pub fn encode_header(kind: PacketType, user: &str, room: &str) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = kind as u8;
    put_field(&mut header[USER_OFFSET..RESERVED_OFFSET], user);
    put_field(&mut header[ROOM_OFFSET..HEADER_LEN], room);
    header
}

/// Encode a header followed by a length-prefixed text payload
pub fn encode_message(
    kind: PacketType,
    user: &str,
    room: &str,
    text: &str,
) -> Result<Bytes, ChatError> {
    let len = u8::try_from(text.len()).map_err(|_| ChatError::PayloadTooLarge(text.len()))?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + 1 + text.len());
    buf.put_slice(&encode_header(kind, user, room));
    buf.put_u8(len);
    buf.put_slice(text.as_bytes());
    Ok(buf.freeze())
}

/// Decode a header, returning the uninterpreted bytes that follow it
pub fn decode_packet(buf: &[u8]) -> Result<(Header, &[u8]), ChatError> {
    if buf.len() < HEADER_LEN {
        return Err(ChatError::malformed(format!(
            "packet too short: {} bytes",
            buf.len()
        )));
    }

    let (user, user_exact) = read_field(&buf[USER_OFFSET..RESERVED_OFFSET]);
    let (room, room_exact) = read_field(&buf[ROOM_OFFSET..HEADER_LEN]);
    let header = Header {
        kind: buf[0],
        user,
        room,
        names_exact: user_exact && room_exact,
    };
    Ok((header, &buf[HEADER_LEN..]))
}

/// Decode a length-prefixed text payload
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn decode_message_payload(rest: &[u8]) -> Result<String, ChatError> {
    let Some((&len, text)) = rest.split_first() else {
        return Err(ChatError::malformed("missing payload length"));
    };
    let len = len as usize;
    if len > text.len() {
        return Err(ChatError::malformed(format!(
            "payload declares {} bytes, {} present",
            len,
            text.len()
        )));
    }
    Ok(String::from_utf8_lossy(&text[..len]).into_owned())
}
