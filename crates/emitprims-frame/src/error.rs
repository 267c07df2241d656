/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x454D \"EM\")")]
    InvalidMagic,

    /// The encoded packet exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame body is not a valid packet.
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A standalone frame buffer ended before the frame did.
    #[error("truncated frame ({0} bytes)")]
    Truncated(usize),

    /// A standalone frame buffer held bytes past the end of its frame.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
