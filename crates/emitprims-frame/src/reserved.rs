//! Event names owned by the protocol.
//!
//! Application code can neither emit nor listen on these names. The first
//! entry carries acknowledgment replies; the rest are connection lifecycle
//! names a transport may surface internally.

/// Control event that carries acknowledgment replies.
pub const ACK_EVENT: &str = "ack";

/// The fixed, ordered set of reserved event names.
pub const RESERVED_EVENTS: &[&str] = &[
    ACK_EVENT,
    "open",
    "close",
    "end",
    "error",
    "data",
    "connection",
    "disconnection",
    "reconnect",
    "reconnecting",
    "reconnected",
    "online",
    "offline",
    "timeout",
    "heartbeat",
    "ping",
    "pong",
    "incoming::data",
    "outgoing::data",
];

/// Returns the reserved event names, in registry order.
pub fn reserved_events() -> &'static [&'static str] {
    RESERVED_EVENTS
}

/// Returns true if `name` is reserved for protocol use.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

/// Returns true if `name` is the acknowledgment control event.
pub fn is_ack(name: &str) -> bool {
    name == ACK_EVENT
}
