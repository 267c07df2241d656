//! In-process connection pair.
//!
//! Frames are delivered synchronously to the other end, in send order.
//! Closing either end closes both, the way a socket peer sees EOF.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tracing::warn;

use crate::config::EmitterConfig;
use crate::error::{Result, SparkError};
use crate::spark::{Spark, WeakSpark};
use crate::transport::FrameSink;

#[derive(Default)]
struct MemorySink {
    peer: OnceLock<WeakSpark>,
}

impl MemorySink {
    fn peer(&self) -> Option<Spark> {
        self.peer.get().and_then(WeakSpark::upgrade)
    }
}

impl FrameSink for MemorySink {
    fn send_frame(&self, frame: Bytes) -> Result<()> {
        let peer = self
            .peer()
            .ok_or_else(|| SparkError::Closed("memory peer".to_string()))?;
        if !peer.is_open() {
            return Err(SparkError::Closed(peer.id().to_string()));
        }
        // Decoding failures belong to the receiving side, as on a real wire.
        if let Err(err) = peer.receive_frame(&frame) {
            warn!(spark = %peer.id(), error = %err, "dropping undecodable frame");
        }
        Ok(())
    }

    fn close(&self) {
        if let Some(peer) = self.peer() {
            peer.close();
        }
    }
}

/// Create two connected sparks sharing `config`.
pub fn pair(config: EmitterConfig) -> (Spark, Spark) {
    pair_with_ids("memory-a", "memory-b", config)
}

/// Create two connected sparks with explicit ids.
pub fn pair_with_ids(
    left_id: impl Into<String>,
    right_id: impl Into<String>,
    config: EmitterConfig,
) -> (Spark, Spark) {
    let left_sink = Arc::new(MemorySink::default());
    let right_sink = Arc::new(MemorySink::default());

    let left = Spark::new(left_id, left_sink.clone(), config.clone());
    let right = Spark::new(right_id, right_sink.clone(), config);

    let _ = left_sink.peer.set(right.downgrade());
    let _ = right_sink.peer.set(left.downgrade());

    (left, right)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use super::*;
    use crate::error::AckError;

    #[test]
    fn frames_arrive_in_send_order() {
        let (a, b) = pair(EmitterConfig::default());
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        {
            let seen = seen.clone();
            b.on("count", move |args, _| seen.lock().unwrap().extend_from_slice(args))
                .unwrap();
        }

        for n in 0..10 {
            a.send("count", vec![json!(n)]).unwrap();
        }

        let expected: Vec<Value> = (0..10).map(|n| json!(n)).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[test]
    fn closing_one_end_closes_both() {
        let (a, b) = pair(EmitterConfig::default());
        let pending_a = a.request("news", vec![]).unwrap();
        let pending_b = b.request("news", vec![]).unwrap();

        b.close();

        assert!(!a.is_open());
        assert_eq!(pending_a.wait(), Err(AckError::ConnectionClosed));
        assert_eq!(pending_b.wait(), Err(AckError::ConnectionClosed));
        assert!(matches!(a.send("news", vec![]), Err(SparkError::Closed(_))));
    }

    #[test]
    fn ids_are_preserved() {
        let (a, b) = pair_with_ids("server", "client", EmitterConfig::default());
        assert_eq!(a.id(), "server");
        assert_eq!(b.id(), "client");
    }

    #[test]
    fn dropped_peer_reports_closed() {
        let (a, b) = pair(EmitterConfig::default());
        drop(b);
        assert!(matches!(a.send("news", vec![]), Err(SparkError::Closed(_))));
        assert!(!a.is_open());
    }
}
