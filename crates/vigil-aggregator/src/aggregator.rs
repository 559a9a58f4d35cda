//! The aggregator service.
//!
//! Owns the observer registry and the only shared mutable resource in the
//! engine: the current snapshot, held as `Arc<SystemSnapshot>` and replaced
//! wholesale on every update. Readers clone the `Arc` and can never observe
//! a partially merged state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use vigil_core::types::SubsystemState;
use vigil_core::{
    AlertSink, DispatchError, MetricEmitter, MetricObserver, MetricUpdate, MetricValue,
    QueryError, RegisterError, SystemSnapshot,
};
use vigil_state::SnapshotStore;

/// Default quiescence window before a snapshot version is persisted.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

type SubsystemObservers = HashMap<String, Arc<dyn MetricObserver>>;

/// Result of a hierarchical state query.
#[derive(Debug, Clone)]
pub enum StateView {
    /// The whole snapshot.
    Full(Arc<SystemSnapshot>),
    /// One subsystem's metric map.
    Subsystem(SubsystemState),
    /// A single metric value.
    Metric(MetricValue),
}

/// Central state aggregator.
pub struct Aggregator {
    observers: RwLock<HashMap<String, SubsystemObservers>>,
    current: RwLock<Arc<SystemSnapshot>>,
    store: SnapshotStore,
    alerts: Arc<dyn AlertSink>,
    debounce: Duration,
    tx: mpsc::UnboundedSender<MetricUpdate>,
    /// Taken by `run`; emissions before the pipeline starts queue up here.
    rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<MetricUpdate>>>,
}

impl Aggregator {
    /// Create an aggregator with the default debounce window.
    pub fn new(store: SnapshotStore, alerts: Arc<dyn AlertSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            observers: RwLock::new(HashMap::new()),
            current: RwLock::new(Arc::new(SystemSnapshot::new())),
            store,
            alerts,
            debounce: DEFAULT_DEBOUNCE,
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
        }
    }

    /// Override the persistence debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Create an emitter bound to this aggregator's update channel.
    ///
    /// Every probe is constructed around one of these; its identity doubles
    /// as the registry key. Emissions only reach the snapshot once the
    /// owning observer is registered; until then the pipeline drops them.
    pub fn emitter(&self, subsystem: &str, metric: &str) -> MetricEmitter {
        MetricEmitter::new(subsystem, metric, self.tx.clone())
    }

    /// Register an observer under its `(subsystem, metric)` identity.
    ///
    /// A duplicate pair is a configuration error and fails immediately; the
    /// daemon treats it as fatal at startup.
    pub fn register(&self, observer: Arc<dyn MetricObserver>) -> Result<(), RegisterError> {
        let subsystem = observer.subsystem().to_string();
        let metric = observer.metric().to_string();

        let mut observers = self.observers.write().expect("observer registry poisoned");
        let slot = observers.entry(subsystem.clone()).or_default();
        if slot.contains_key(&metric) {
            return Err(RegisterError::Duplicate { subsystem, metric });
        }
        slot.insert(metric.clone(), observer);

        info!(%subsystem, %metric, "observer registered");
        Ok(())
    }

    /// Restore state from the last persisted snapshot.
    ///
    /// Seeds each registered observer with its persisted value (without
    /// re-broadcasting it). A missing or undecodable record is recoverable:
    /// the aggregator starts empty, the decode failure is alerted.
    pub async fn init_state(&self) {
        match self.store.load() {
            Ok(Some(snapshot)) => {
                for (subsystem, metrics) in snapshot.subsystems() {
                    for (metric, value) in metrics {
                        if let Some(observer) = self.find_observer(subsystem, metric) {
                            observer.init(value.data.clone());
                        }
                    }
                }
                let count = snapshot.metric_count();
                *self.current.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
                info!(metrics = count, "state restored from persisted snapshot");
            }
            Ok(None) => {
                warn!("no persisted state found, starting empty");
            }
            Err(e) => {
                error!(error = %e, "failed to load persisted state, starting empty");
                self.alerts
                    .send(
                        "Monitoring error: failed to load persisted state",
                        &[e.to_string()],
                    )
                    .await;
            }
        }
    }

    /// The current snapshot version.
    pub fn snapshot(&self) -> Arc<SystemSnapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    /// Three-level state query.
    ///
    /// No filter returns the whole snapshot; a subsystem filter returns that
    /// subsystem's metric map; subsystem + metric returns one value. Unknown
    /// names are `QueryError`s, never empty successes. A metric filter
    /// without a subsystem is ignored.
    pub fn get_state(
        &self,
        subsystem: Option<&str>,
        metric: Option<&str>,
    ) -> Result<StateView, QueryError> {
        let snapshot = self.snapshot();
        match (subsystem, metric) {
            (None, _) => Ok(StateView::Full(snapshot)),
            (Some(s), None) => snapshot
                .subsystem(s)
                .cloned()
                .map(StateView::Subsystem)
                .ok_or_else(|| QueryError::SubsystemNotFound(s.to_string())),
            (Some(s), Some(m)) => {
                let metrics = snapshot
                    .subsystem(s)
                    .ok_or_else(|| QueryError::SubsystemNotFound(s.to_string()))?;
                metrics
                    .get(m)
                    .cloned()
                    .map(StateView::Metric)
                    .ok_or_else(|| QueryError::MetricNotFound {
                        subsystem: s.to_string(),
                        metric: m.to_string(),
                    })
            }
        }
    }

    /// Route a pushed payload to the owning observer.
    ///
    /// The observer's validation error propagates to the caller unmodified,
    /// so an HTTP layer above can turn it into a 4xx response.
    pub async fn dispatch_webhook(
        &self,
        subsystem: &str,
        metric: &str,
        payload: Value,
    ) -> Result<(), DispatchError> {
        let observer = self.dispatch_target(subsystem, metric)?;
        observer.on_webhook(payload).await?;
        Ok(())
    }

    /// Look up the dispatch target, distinguishing "unknown subsystem" from
    /// "unknown metric within a known subsystem".
    fn dispatch_target(
        &self,
        subsystem: &str,
        metric: &str,
    ) -> Result<Arc<dyn MetricObserver>, QueryError> {
        let observers = self.observers.read().expect("observer registry poisoned");
        let slot = observers
            .get(subsystem)
            .ok_or_else(|| QueryError::NoObservers(subsystem.to_string()))?;
        slot.get(metric)
            .cloned()
            .ok_or_else(|| QueryError::ObserverNotFound {
                subsystem: subsystem.to_string(),
                metric: metric.to_string(),
            })
    }

    fn find_observer(&self, subsystem: &str, metric: &str) -> Option<Arc<dyn MetricObserver>> {
        let observers = self.observers.read().expect("observer registry poisoned");
        observers.get(subsystem).and_then(|s| s.get(metric)).cloned()
    }

    /// Run the update pipeline until shutdown.
    ///
    /// Applies emissions in arrival order, each as an atomic snapshot
    /// replacement, and arms the debounce timer. Persistence always applies
    /// to the latest snapshot version and is diffed against the last state
    /// actually written, so re-emitting identical data never causes a write.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut rx = match self.rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("update pipeline already running");
                return;
            }
        };

        let mut last_persisted = self.snapshot().as_ref().clone();
        let mut deadline: Option<Instant> = None;

        info!(
            debounce_ms = self.debounce.as_millis() as u64,
            "update pipeline started"
        );

        loop {
            // Placeholder target keeps the disabled branch inert.
            let flush_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                update = rx.recv() => match update {
                    Some(update) => {
                        self.apply_update(update);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => break,
                },
                _ = sleep_until(flush_at), if deadline.is_some() => {
                    self.persist_if_changed(&mut last_persisted).await;
                    deadline = None;
                }
                _ = shutdown.changed() => {
                    // Drain emissions that raced the shutdown signal, then
                    // flush so the latest version survives restarts.
                    while let Ok(update) = rx.try_recv() {
                        self.apply_update(update);
                        deadline = Some(Instant::now());
                    }
                    if deadline.is_some() {
                        self.persist_if_changed(&mut last_persisted).await;
                    }
                    info!("update pipeline shutting down");
                    break;
                }
            }
        }
    }

    /// Replace one metric's value and publish the successor snapshot.
    ///
    /// Only registered metric identities are folded in: an emitter whose
    /// observer was never registered cannot inject state.
    fn apply_update(&self, update: MetricUpdate) {
        if self.find_observer(&update.subsystem, &update.metric).is_none() {
            warn!(
                subsystem = %update.subsystem,
                metric = %update.metric,
                "emission from unregistered metric dropped"
            );
            return;
        }

        let mut current = self.current.write().expect("snapshot lock poisoned");
        let next = current.with_metric(
            &update.subsystem,
            &update.metric,
            MetricValue::now(update.data),
        );
        *current = Arc::new(next);
        debug!(
            subsystem = %update.subsystem,
            metric = %update.metric,
            "snapshot updated"
        );
    }

    /// Persist the latest snapshot if any metric's data changed since the
    /// last successful write. Write failures are alerted, never re-thrown:
    /// the pipeline continues with the stale persisted state.
    async fn persist_if_changed(&self, last_persisted: &mut SystemSnapshot) {
        let current = self.snapshot();
        if current.data_eq(last_persisted) {
            debug!("no metric data changed, skipping persistence");
            return;
        }

        match self.store.save(&current) {
            Ok(()) => {
                *last_persisted = current.as_ref().clone();
                debug!(metrics = current.metric_count(), "snapshot persisted");
            }
            Err(e) => {
                error!(error = %e, "failed to persist snapshot");
                self.alerts
                    .send(
                        "Monitoring error: failed to persist state",
                        &[e.to_string()],
                    )
                    .await;
            }
        }
    }
}
