//! The metric observer contract.
//!
//! A probe is one `(subsystem, metric)` pair wrapping an external data
//! source. Pull probes implement `fetch`, push probes implement
//! `on_webhook`; either folds fresh data into the probe's [`MetricEmitter`],
//! whose `emit` forwards it to the aggregator over the fan-in channel.
//!
//! `emit` is synchronous and performs no I/O: it updates the cached value
//! and hands the update to the channel. Seeding via `init`/`seed` updates
//! the cache only — the seed is never delivered to the pipeline, so restored
//! state is not double-counted as a fresh observation on startup.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ObserverError;
use crate::types::MetricUpdate;

/// Per-probe handle into the aggregator's update channel.
pub struct MetricEmitter {
    subsystem: String,
    metric: String,
    cached: RwLock<Option<Value>>,
    tx: mpsc::UnboundedSender<MetricUpdate>,
}

impl MetricEmitter {
    /// Create an emitter for one metric, bound to the aggregator's channel.
    pub fn new(
        subsystem: impl Into<String>,
        metric: impl Into<String>,
        tx: mpsc::UnboundedSender<MetricUpdate>,
    ) -> Self {
        Self {
            subsystem: subsystem.into(),
            metric: metric.into(),
            cached: RwLock::new(None),
            tx,
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// The last value this probe emitted or was seeded with.
    pub fn data(&self) -> Option<Value> {
        self.cached.read().expect("emitter cache poisoned").clone()
    }

    /// Seed the cached value without publishing an update.
    pub fn seed(&self, data: Value) {
        *self.cached.write().expect("emitter cache poisoned") = Some(data);
    }

    /// Publish a new value: cache it and deliver it to the aggregator.
    ///
    /// Delivery failure means the pipeline has shut down; the value is still
    /// cached so the probe keeps a consistent previous-cycle view.
    pub fn emit(&self, data: Value) {
        self.seed(data.clone());

        let update = MetricUpdate {
            subsystem: self.subsystem.clone(),
            metric: self.metric.clone(),
            data,
        };
        if self.tx.send(update).is_err() {
            debug!(
                subsystem = %self.subsystem,
                metric = %self.metric,
                "update channel closed, emission dropped"
            );
        }
    }
}

/// One observed `(subsystem, metric)` pair.
///
/// Default implementations mark both data paths unsupported; a probe
/// overrides the one(s) it actually has.
#[async_trait]
pub trait MetricObserver: Send + Sync {
    /// The emitter carrying this observer's identity and emissions.
    fn emitter(&self) -> &MetricEmitter;

    fn subsystem(&self) -> &str {
        self.emitter().subsystem()
    }

    fn metric(&self) -> &str {
        self.emitter().metric()
    }

    /// Seed initial state (e.g. from a persisted snapshot) without
    /// broadcasting it as a new update.
    fn init(&self, data: Value) {
        self.emitter().seed(data);
    }

    /// Pull current state from the external source and emit it.
    ///
    /// Returns the emitted value, or `None` when the cycle was skipped.
    async fn fetch(&self) -> Result<Option<Value>, ObserverError> {
        Err(ObserverError::Unsupported("fetch"))
    }

    /// Accept externally pushed data, validate it, and fold it into state.
    async fn on_webhook(&self, _payload: Value) -> Result<(), ObserverError> {
        Err(ObserverError::Unsupported("webhook"))
    }
}
