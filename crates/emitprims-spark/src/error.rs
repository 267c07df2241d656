use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

/// Errors returned synchronously by spark operations.
#[derive(Debug, thiserror::Error)]
pub enum SparkError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] emitprims_frame::FrameError),

    /// The event name belongs to the protocol.
    #[error("event name '{0}' is reserved")]
    InvalidEventName(String),

    /// An error reply must carry a non-null value; `null` reads as success.
    #[error("ack error reply must not be null")]
    NullErrorReply,

    /// The connection has already been closed.
    #[error("spark {0} is closed")]
    Closed(String),

    /// Failed to bind the listening socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a listening socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SparkError>;

/// Failure delivered to an acknowledgment callback.
///
/// These never surface as return values; each pending acknowledgment
/// receives exactly one outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AckError {
    /// No reply arrived within the ack window.
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The connection closed while the reply was outstanding.
    #[error("connection closed before acknowledgment")]
    ConnectionClosed,

    /// The peer replied with a non-null error value.
    #[error("peer replied with error: {0}")]
    Remote(Value),
}

/// What an acknowledgment callback receives.
pub type AckOutcome = std::result::Result<Value, AckError>;
