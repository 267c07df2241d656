//! Event packets and their framing on the wire.
//!
//! Every emitted event travels as one [`Packet`]: an event name, an ordered
//! list of JSON arguments, and an optional acknowledgment id. On a byte stream
//! each packet is framed with:
//! - A 2-byte magic number ("EM") for stream synchronization
//! - A 4-byte little-endian body length
//! - The packet encoded as a JSON object
//!
//! Event names in [`RESERVED_EVENTS`] belong to the protocol itself and are
//! never available to application listeners.

pub mod codec;
pub mod error;
pub mod packet;
pub mod reader;
pub mod reserved;
pub mod writer;

pub use codec::{
    decode_body, decode_packet, encode_body, encode_packet, FrameConfig, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use packet::{AckReply, Packet};
pub use reader::FrameReader;
pub use reserved::{is_ack, is_reserved, reserved_events, ACK_EVENT, RESERVED_EVENTS};
pub use writer::FrameWriter;
