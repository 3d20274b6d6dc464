//! Incremental packet framing over a byte stream
//!
//! A single socket read may hold a partial packet or several packets.
//! `PacketReader` accumulates reads in a buffer and splits off one complete
//! packet at a time, using the header type to decide whether a
//! length-prefixed payload follows.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{decode_packet, Header, PacketType, HEADER_LEN};
use crate::error::ChatError;

/// A complete packet split off the stream
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    /// Bytes following the header (length byte + text for message types)
    pub payload: Bytes,
}

/// Length of the next complete packet in `buf`, or None if more data is needed
fn frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    if !PacketType::has_payload(buf[0]) {
        return Some(HEADER_LEN);
    }
    let len = *buf.get(HEADER_LEN)? as usize;
    let total = HEADER_LEN + 1 + len;
    (buf.len() >= total).then_some(total)
}

/// Try to split one packet off the front of `buf`
///
/// Returns Ok(None) if more data is needed.
pub fn split_packet(buf: &mut BytesMut) -> Result<Option<Packet>, ChatError> {
    let Some(len) = frame_len(buf) else {
        return Ok(None);
    };
    let frame = buf.split_to(len).freeze();
    let (header, _) = decode_packet(&frame)?;
    let payload = frame.slice(HEADER_LEN..);
    Ok(Some(Packet { header, payload }))
}

/// Reads packets from any async byte stream
pub struct PacketReader<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Read the next complete packet
    ///
    /// Returns Ok(None) on a clean end-of-stream between packets. A stream
    /// that ends mid-packet is reported as `MalformedPacket`.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, ChatError> {
        loop {
            if let Some(packet) = split_packet(&mut self.buffer)? {
                return Ok(Some(packet));
            }

            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ChatError::malformed(format!(
                    "stream ended inside a packet ({} bytes buffered)",
                    self.buffer.len()
                )));
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
