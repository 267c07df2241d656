//! Named events with acknowledgments over local IPC.
//!
//! emitprims lets two ends of an open connection exchange named events with
//! JSON arguments, optionally asking the other side to acknowledge, and lets
//! a server fan one event out to every connected peer.
//!
//! # Crate Structure
//!
//! - [`frame`]: packet model, reserved event names and length-prefixed framing
//! - [`spark`]: connections, ack correlation and broadcast (behind the `spark` feature)

/// Re-export frame types.
pub mod frame {
    pub use emitprims_frame::*;
}

/// Re-export spark types (requires `spark` feature).
#[cfg(feature = "spark")]
pub mod spark {
    pub use emitprims_spark::*;
}
