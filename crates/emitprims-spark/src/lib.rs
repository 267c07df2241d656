//! Named events with acknowledgments over framed connections.
//!
//! A [`Spark`] is one open connection. Emit events with [`Spark::send`], ask
//! for a reply with [`Spark::send_with_ack`] or [`Spark::request`], and
//! listen with [`Spark::on`]. A [`Hub`] tracks every open spark and fans an
//! event out to all of them.
//!
//! Each spark owns its own [`AckLedger`] and [`EventRouter`]; nothing is
//! shared between connections. The transport only needs to move frames, see
//! [`FrameSink`].

pub mod config;
#[cfg(unix)]
pub mod connector;
pub mod error;
pub mod hub;
pub mod ledger;
#[cfg(unix)]
pub mod listener;
pub mod memory;
pub mod router;
pub mod spark;
pub mod stream;
pub mod transport;

pub use config::EmitterConfig;
#[cfg(unix)]
pub use connector::{connect, connect_with, connect_with_config};
pub use error::{AckError, AckOutcome, Result, SparkError};
pub use hub::{BroadcastReport, Hub};
pub use ledger::{AckCallback, AckLedger, PendingAck};
#[cfg(unix)]
pub use listener::SparkListener;
pub use memory::pair;
pub use router::{Dispatch, DropReason, EventRouter, Handler};
pub use spark::{AckReceiver, Reply, Spark, WeakSpark};
pub use stream::{attach, StreamSink};
pub use transport::FrameSink;

pub use emitprims_frame::{is_reserved, reserved_events, ACK_EVENT, RESERVED_EVENTS};
