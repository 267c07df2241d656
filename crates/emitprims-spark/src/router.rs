use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use emitprims_frame::{is_ack, is_reserved, AckReply, Packet};
use serde_json::Value;

use crate::error::{Result, SparkError};
use crate::spark::Reply;

/// Listener for one event name.
///
/// Receives the packet's arguments in order, plus a [`Reply`] when the
/// sender asked for an acknowledgment.
pub type Handler = Arc<dyn Fn(&[Value], Option<Reply>) + Send + Sync + 'static>;

/// Why an incoming packet reached no listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Reserved name other than the ack control event.
    Reserved,
    /// Nobody listens on this event.
    NoListeners,
    /// Ack control event whose payload is not an [`AckReply`].
    MalformedAck,
}

/// Routing decision for one incoming packet.
pub enum Dispatch {
    /// Acknowledgment reply, destined for the ledger.
    Ack(AckReply),
    /// Listeners to invoke, in registration order.
    Listeners(Vec<Handler>),
    Dropped(DropReason),
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Ack(reply) => f.debug_tuple("Ack").field(reply).finish(),
            Dispatch::Listeners(handlers) => f
                .debug_tuple("Listeners")
                .field(&handlers.len())
                .finish(),
            Dispatch::Dropped(reason) => f.debug_tuple("Dropped").field(reason).finish(),
        }
    }
}

/// Event name to listener table for one connection.
#[derive(Default)]
pub struct EventRouter {
    listeners: HashMap<String, Vec<Handler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Reserved names are rejected.
    pub fn on(&mut self, event: &str, handler: Handler) -> Result<()> {
        if is_reserved(event) {
            return Err(SparkError::InvalidEventName(event.to_string()));
        }
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Remove every listener for `event`, returning how many were removed.
    pub fn off(&mut self, event: &str) -> usize {
        self.listeners
            .remove(event)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Decide where an incoming packet goes.
    ///
    /// Ack replies never reach user listeners, even if the peer sent them
    /// with an ack id of their own.
    pub fn dispatch(&self, packet: &Packet) -> Dispatch {
        if is_ack(&packet.event) {
            return match AckReply::from_args(&packet.args) {
                Some(reply) => Dispatch::Ack(reply),
                None => Dispatch::Dropped(DropReason::MalformedAck),
            };
        }
        if is_reserved(&packet.event) {
            return Dispatch::Dropped(DropReason::Reserved);
        }
        match self.listeners.get(&packet.event) {
            Some(handlers) if !handlers.is_empty() => Dispatch::Listeners(handlers.clone()),
            _ => Dispatch::Dropped(DropReason::NoListeners),
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Event names with at least one listener, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("events", &self.event_names())
            .finish()
    }
}
