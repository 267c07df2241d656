use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reserved::ACK_EVENT;

/// One emitted event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Packet {
    /// Event name.
    pub event: String,
    /// Positional arguments, passed through untouched.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Acknowledgment id. Present only when the sender expects a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl Packet {
    /// Create a packet that expects no reply.
    pub fn event(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
            ack: None,
        }
    }

    /// Create a packet that asks the peer to reply under `ack_id`.
    pub fn with_ack(event: impl Into<String>, args: Vec<Value>, ack_id: u64) -> Self {
        Self {
            event: event.into(),
            args,
            ack: Some(ack_id),
        }
    }

    /// Create the reply packet for `ack_id`.
    pub fn ack_reply(ack_id: u64, outcome: std::result::Result<Value, Value>) -> Self {
        let reply = match outcome {
            Ok(result) => AckReply {
                ack_id,
                error: Value::Null,
                result,
            },
            Err(error) => AckReply {
                ack_id,
                error,
                result: Value::Null,
            },
        };
        Self {
            event: ACK_EVENT.to_string(),
            args: vec![reply.to_value()],
            ack: None,
        }
    }
}

/// Payload of an acknowledgment reply packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckReply {
    /// Id of the packet being acknowledged.
    #[serde(rename = "ackId")]
    pub ack_id: u64,
    /// `null` on success.
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub result: Value,
}

impl AckReply {
    /// Extract the reply from an ack packet's arguments.
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let first = args.first()?;
        serde_json::from_value(first.clone()).ok()
    }

    /// Split into the outcome the original sender observes. A `null` error
    /// means success, so an error reply must carry a non-null value.
    pub fn into_outcome(self) -> std::result::Result<Value, Value> {
        if self.error.is_null() {
            Ok(self.result)
        } else {
            Err(self.error)
        }
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "ackId": self.ack_id,
            "error": self.error,
            "result": self.result,
        })
    }
}
