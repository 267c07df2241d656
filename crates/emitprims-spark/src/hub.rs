use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use emitprims_frame::is_reserved;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, SparkError};
use crate::spark::Spark;

type SparkTable = Mutex<BTreeMap<String, Spark>>;

/// The set of currently open sparks, for fan-out.
///
/// Sparks leave the hub on their own when they close.
#[derive(Clone, Default)]
pub struct Hub {
    sparks: Arc<SparkTable>,
}

/// Outcome of one [`Hub::broadcast`].
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Ids of sparks the event was handed to.
    pub delivered: Vec<String>,
    /// Sparks whose send failed, with the reason.
    pub failed: Vec<(String, SparkError)>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn lock(table: &SparkTable) -> MutexGuard<'_, BTreeMap<String, Spark>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an open spark. A spark that is already closed is ignored.
    ///
    /// Inserting a second spark under an existing id replaces the first.
    pub fn insert(&self, spark: Spark) {
        if !spark.is_open() {
            return;
        }
        let id = spark.id().to_string();
        let previous = lock(&self.sparks).insert(id.clone(), spark.clone());
        if previous.is_some() {
            warn!(spark = %id, "replacing spark with duplicate id");
        }
        debug!(spark = %id, "spark joined hub");

        let table = Arc::downgrade(&self.sparks);
        let member = spark.downgrade();
        spark.on_close(move |id| {
            let Some(table) = table.upgrade() else {
                return;
            };
            let mut sparks = lock(&table);
            let same = match (sparks.get(id), member.upgrade()) {
                (Some(current), Some(member)) => current.ptr_eq(&member),
                _ => false,
            };
            if same {
                sparks.remove(id);
                debug!(spark = %id, "spark left hub");
            }
        });
    }

    /// Stop tracking a spark without closing it.
    pub fn remove(&self, id: &str) -> Option<Spark> {
        lock(&self.sparks).remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Spark> {
        lock(&self.sparks).get(id).cloned()
    }

    /// Ids of tracked sparks, sorted.
    pub fn ids(&self) -> Vec<String> {
        lock(&self.sparks).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.sparks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sparks).is_empty()
    }

    /// Emit `event` on every open spark.
    ///
    /// Broadcasts carry no acknowledgment. A reserved event name fails the
    /// whole call before anything is sent; a failing spark does not stop
    /// delivery to the others.
    pub fn broadcast(&self, event: &str, args: Vec<Value>) -> Result<BroadcastReport> {
        if is_reserved(event) {
            return Err(SparkError::InvalidEventName(event.to_string()));
        }

        let targets: Vec<Spark> = lock(&self.sparks).values().cloned().collect();
        let mut report = BroadcastReport::default();
        for spark in targets {
            if !spark.is_open() {
                continue;
            }
            match spark.send(event, args.clone()) {
                Ok(()) => report.delivered.push(spark.id().to_string()),
                Err(err) => {
                    warn!(spark = %spark.id(), error = %err, event, "broadcast send failed");
                    report.failed.push((spark.id().to_string(), err));
                }
            }
        }
        debug!(
            event,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast complete"
        );
        Ok(report)
    }

    /// Close every tracked spark.
    pub fn close_all(&self) {
        let sparks: Vec<Spark> = lock(&self.sparks).values().cloned().collect();
        for spark in sparks {
            spark.close();
        }
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub").field("sparks", &self.ids()).finish()
    }
}
