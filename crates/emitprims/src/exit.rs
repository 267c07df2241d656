use std::fmt;
use std::io;

use emitprims_frame::FrameError;
use emitprims_spark::{AckError, SparkError};

// Exit codes follow the sysexits-style layout shared across our CLIs.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const ACK_REJECTED: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. }
        | FrameError::Malformed(_)
        | FrameError::Truncated(_)
        | FrameError::TrailingBytes(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn spark_error(context: &str, err: SparkError) -> CliError {
    match err {
        SparkError::Frame(err) => frame_error(context, err),
        SparkError::Bind { source, .. }
        | SparkError::Connect { source, .. }
        | SparkError::Io(source) => io_error(context, source),
        SparkError::InvalidEventName(_) => CliError::new(USAGE, format!("{context}: {err}")),
        SparkError::NullErrorReply => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SparkError::Closed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn ack_error(context: &str, err: AckError) -> CliError {
    let code = match err {
        AckError::Timeout(_) => TIMEOUT,
        AckError::ConnectionClosed => FAILURE,
        AckError::Remote(_) => ACK_REJECTED,
    };
    CliError::new(code, format!("{context}: {err}"))
}
