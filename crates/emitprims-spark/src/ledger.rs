//! Pending acknowledgments for one connection.
//!
//! Every entry ends in exactly one of three ways: the peer replies
//! ([`PendingAck::resolve`]), its window elapses ([`PendingAck::expire`]), or
//! the connection closes ([`PendingAck::invalidate`]). All three consume the
//! entry, so a callback cannot fire twice.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::{AckError, AckOutcome};

/// Callback invoked with the outcome of an acknowledged send.
pub type AckCallback = Box<dyn FnOnce(AckOutcome) + Send + 'static>;

/// One outstanding acknowledgment.
pub struct PendingAck {
    id: u64,
    callback: AckCallback,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl PendingAck {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deliver the peer's reply.
    pub fn resolve(self, outcome: std::result::Result<Value, Value>) {
        let outcome = outcome.map_err(AckError::Remote);
        (self.callback)(outcome);
    }

    /// Deliver a timeout.
    pub fn expire(self) {
        let window = self.timeout.unwrap_or_default();
        (self.callback)(Err(AckError::Timeout(window)));
    }

    /// Deliver a connection-closed failure.
    pub fn invalidate(self) {
        (self.callback)(Err(AckError::ConnectionClosed));
    }
}

impl fmt::Debug for PendingAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAck")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Table of pending acknowledgments keyed by ack id.
#[derive(Debug)]
pub struct AckLedger {
    next_id: u64,
    pending: HashMap<u64, PendingAck>,
}

impl Default for AckLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AckLedger {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Store a callback and return the id to embed in the outgoing packet.
    ///
    /// Ids increase monotonically and wrap; an id still pending is never
    /// handed out again. A window too large to represent as an `Instant`
    /// leaves the entry without a deadline.
    pub fn register(
        &mut self,
        callback: AckCallback,
        timeout: Option<Duration>,
        now: Instant,
    ) -> u64 {
        let id = self.allocate_id();
        let deadline = timeout.and_then(|window| now.checked_add(window));
        self.pending.insert(
            id,
            PendingAck {
                id,
                callback,
                timeout,
                deadline,
            },
        );
        id
    }

    fn allocate_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Remove an entry without invoking it.
    pub fn take(&mut self, id: u64) -> Option<PendingAck> {
        self.pending.remove(&id)
    }

    /// Remove an entry and invoke its callback with the peer's reply.
    ///
    /// Returns `false` for an unknown id: a duplicate or late reply is a
    /// normal race, not an error.
    pub fn resolve(&mut self, id: u64, outcome: std::result::Result<Value, Value>) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.resolve(outcome);
                true
            }
            None => {
                debug!(ack_id = id, "reply for unknown ack id dropped");
                false
            }
        }
    }

    /// Remove every entry whose deadline is at or before `now`.
    pub fn expire_due(&mut self, now: Instant) -> Vec<PendingAck> {
        let due: Vec<u64> = self
            .pending
            .values()
            .filter(|entry| entry.deadline.is_some_and(|deadline| deadline <= now))
            .map(|entry| entry.id)
            .collect();

        let mut expired: Vec<PendingAck> = due
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect();
        expired.sort_by_key(|entry| entry.id);
        expired
    }

    /// Earliest deadline among pending entries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter_map(|entry| entry.deadline)
            .min()
    }

    /// Remove every entry, oldest id first.
    pub fn drain(&mut self) -> Vec<PendingAck> {
        let mut entries: Vec<PendingAck> = self.pending.drain().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Fail every pending entry with `ConnectionClosed` and empty the table.
    pub fn invalidate_all(&mut self) -> usize {
        let entries = self.drain();
        let count = entries.len();
        for entry in entries {
            entry.invalidate();
        }
        count
    }

    /// Deadline of a pending entry, if it has one.
    pub fn deadline_of(&self, id: u64) -> Option<Instant> {
        self.pending.get(&id).and_then(PendingAck::deadline)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
