use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::Packet;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "EM" (0x45 0x4D).
pub const MAGIC: [u8; 2] = [0x45, 0x4D];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Serialize a packet into its JSON body, without framing.
pub fn encode_body(packet: &Packet) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(packet)?)
}

/// Parse a JSON body back into a packet.
pub fn decode_body(body: &[u8]) -> Result<Packet> {
    Ok(serde_json::from_slice(body)?)
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────────┐
/// │ Magic (2B)   │ Length    │ Body                 │
/// │ 0x45 0x4D    │ (4B LE)   │ (JSON packet)        │
/// │ "EM"         │           │                      │
/// └──────────────┴───────────┴──────────────────────┘
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let body = encode_body(packet)?;
    let max = max_payload.min(u32::MAX as usize);
    if body.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A frame whose body
/// is not a valid packet is consumed before the error is returned, so the
/// stream stays in sync.
pub fn decode_packet(src: &mut BytesMut, max_payload: usize) -> Result<Option<Packet>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let body_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + body_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    decode_body(&body).map(Some)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
