use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// Outgoing half of a connection.
///
/// A sink receives fully framed packets and delivers them to the peer in the
/// order they were handed over. It never inspects the frame.
pub trait FrameSink: Send + Sync {
    /// Deliver one frame.
    fn send_frame(&self, frame: Bytes) -> Result<()>;

    /// Release the underlying connection. Called once when the spark closes.
    fn close(&self) {}
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    fn send_frame(&self, frame: Bytes) -> Result<()> {
        (**self).send_frame(frame)
    }

    fn close(&self) {
        (**self).close()
    }
}
