//! Snapshot model for the monitoring engine.
//!
//! The snapshot is a two-level map: subsystem → metric → [`MetricValue`].
//! Payloads are `serde_json::Value` at this layer; each probe owns the
//! concrete shape and serializes it before emitting. Change detection
//! compares payloads structurally and ignores the update timestamp.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A metric map for one subsystem.
pub type SubsystemState = BTreeMap<String, MetricValue>;

/// The latest observed value for one metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricValue {
    /// Probe-owned payload.
    pub data: Value,
    /// Unix timestamp (seconds) of the emission that produced this value.
    pub updated_at: u64,
}

impl MetricValue {
    /// Wrap a payload with the current timestamp.
    pub fn now(data: Value) -> Self {
        Self {
            data,
            updated_at: epoch_secs(),
        }
    }
}

/// One emission from an observer, as delivered on the fan-in channel.
#[derive(Debug, Clone)]
pub struct MetricUpdate {
    pub subsystem: String,
    pub metric: String,
    pub data: Value,
}

/// The complete current mapping of all metrics to their latest value.
///
/// Snapshots are immutable per version: every update builds a new snapshot
/// via [`SystemSnapshot::with_metric`], so readers holding a reference never
/// observe a partial merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SystemSnapshot(BTreeMap<String, SubsystemState>);

impl SystemSnapshot {
    /// The empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// All subsystems with their metric maps.
    pub fn subsystems(&self) -> &BTreeMap<String, SubsystemState> {
        &self.0
    }

    /// The metric map for one subsystem, if present.
    pub fn subsystem(&self, subsystem: &str) -> Option<&SubsystemState> {
        self.0.get(subsystem)
    }

    /// One metric's latest value, if present.
    pub fn metric(&self, subsystem: &str, metric: &str) -> Option<&MetricValue> {
        self.0.get(subsystem).and_then(|s| s.get(metric))
    }

    /// Build the successor snapshot with a single metric replaced.
    pub fn with_metric(&self, subsystem: &str, metric: &str, value: MetricValue) -> Self {
        let mut next = self.clone();
        next.0
            .entry(subsystem.to_string())
            .or_default()
            .insert(metric.to_string(), value);
        next
    }

    /// Whether no metrics are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of metrics across all subsystems.
    pub fn metric_count(&self) -> usize {
        self.0.values().map(|s| s.len()).sum()
    }

    /// Structural equality over metric payloads only, ignoring `updated_at`.
    ///
    /// This is the change-detection predicate for persistence: re-observing
    /// an identical value refreshes the timestamp but is not a change.
    pub fn data_eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|(subsystem, metrics)| {
            match other.0.get(subsystem) {
                Some(other_metrics) if other_metrics.len() == metrics.len() => metrics
                    .iter()
                    .all(|(metric, value)| {
                        other_metrics.get(metric).is_some_and(|o| o.data == value.data)
                    }),
                _ => false,
            }
        })
    }
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
