//! The pool health probe.
//!
//! One observer (`node`/`health` by default) covering every configured
//! pool. Each fetch cycle runs the failover algorithm against the
//! collaborator's error list, performs required swaps, sends at most one
//! batched alert, and always emits the fresh pool states so the snapshot
//! reflects the latest health even when nothing changed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use vigil_core::{epoch_secs, AlertSink, MetricEmitter, MetricObserver, ObserverError};

use crate::controller::{
    build_pool_states, fully_down_transition, instance_transitions, preferred_instance, summary,
    InstanceError, PoolSpec, PoolState,
};

/// Subject line of the batched node health alert.
const ALERT_SUBJECT: &str = "Node health";

/// The external collaborator a pool probe drives: one health-check call per
/// cycle plus the active-connection registry it can swap.
#[async_trait]
pub trait PoolClient: Send + Sync {
    /// Check every instance and return the errors found. An instance absent
    /// from the result is healthy. Timeouts are ordinary error entries.
    async fn check(&self) -> Vec<InstanceError>;

    /// The currently connected instance of a pool, if one is managed.
    fn active_instance(&self, pool: &str) -> Option<String>;

    /// Reconnect the pool's traffic to the given instance.
    async fn swap_active(&self, pool: &str, instance: &str);
}

/// Pool health observer with embedded failover control.
pub struct PoolHealthProbe {
    emitter: MetricEmitter,
    specs: Vec<PoolSpec>,
    client: Arc<dyn PoolClient>,
    alerts: Arc<dyn AlertSink>,
    /// Previous cycle's states; transition detection compares against this.
    prev: Mutex<Option<Vec<PoolState>>>,
    /// Held for the duration of a cycle; a tick arriving mid-cycle skips.
    cycle: tokio::sync::Mutex<()>,
}

impl PoolHealthProbe {
    pub fn new(
        emitter: MetricEmitter,
        specs: Vec<PoolSpec>,
        client: Arc<dyn PoolClient>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            emitter,
            specs,
            client,
            alerts,
            prev: Mutex::new(None),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Pool-level check: pick the preferred instance and swap if the active
    /// connection differs. Returns the alert lines this pool contributed.
    async fn check_pool(&self, pool: &PoolState, prev: Option<&PoolState>) -> Vec<String> {
        let mut lines = Vec::new();

        match preferred_instance(pool) {
            None => {
                if fully_down_transition(prev) {
                    error!(pool = %pool.pool, "pool is fully down");
                    lines.push(format!("pool '{}' is fully down", pool.pool));
                }
            }
            Some(preferred) => {
                let Some(active) = self.client.active_instance(&pool.pool) else {
                    debug!(pool = %pool.pool, "no managed connection, skipping swap check");
                    return lines;
                };
                if active != preferred.instance {
                    self.client.swap_active(&pool.pool, &preferred.instance).await;
                    warn!(
                        pool = %pool.pool,
                        from = %active,
                        to = %preferred.instance,
                        "pool switched active instance"
                    );
                    lines.push(format!(
                        "pool '{}' switched from {} to {}",
                        pool.pool, active, preferred.instance
                    ));
                }
            }
        }

        lines
    }
}

#[async_trait]
impl MetricObserver for PoolHealthProbe {
    fn emitter(&self) -> &MetricEmitter {
        &self.emitter
    }

    fn init(&self, data: Value) {
        // Restore the previous cycle from the persisted snapshot so
        // transition detection survives restarts.
        match serde_json::from_value::<Vec<PoolState>>(data.clone()) {
            Ok(states) => {
                *self.prev.lock().expect("pool state poisoned") = Some(states);
                self.emitter.seed(data);
            }
            Err(e) => warn!(error = %e, "ignoring undecodable persisted pool state"),
        }
    }

    async fn fetch(&self) -> Result<Option<Value>, ObserverError> {
        // The runner never overlaps cycles, but webhook-triggered or manual
        // fetches could; transition detection requires strict sequencing.
        let Ok(_guard) = self.cycle.try_lock() else {
            warn!("previous health cycle still running, skipping");
            return Ok(None);
        };

        let errors = self.client.check().await;
        let prev = self.prev.lock().expect("pool state poisoned").clone();
        let states = build_pool_states(&self.specs, &errors, prev.as_deref(), epoch_secs());

        let mut lines = Vec::new();
        for pool in &states {
            let prev_pool = prev
                .as_deref()
                .and_then(|p| p.iter().find(|s| s.pool == pool.pool));
            lines.extend(self.check_pool(pool, prev_pool).await);
            lines.extend(instance_transitions(pool, prev_pool));
        }

        if !lines.is_empty() {
            lines.push(summary(&states));
            self.alerts.send(ALERT_SUBJECT, &lines).await;
        } else {
            debug!(pools = states.len(), "health cycle completed, no transitions");
        }

        *self.prev.lock().expect("pool state poisoned") = Some(states.clone());

        let value = serde_json::to_value(&states)
            .map_err(|e| ObserverError::Upstream(e.to_string()))?;
        self.emitter.emit(value.clone());

        if let Some(first) = states.iter().find(|p| p.fully_down()) {
            info!(pool = %first.pool, "at least one pool currently fully down");
        }

        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::mpsc;
    use vigil_core::MetricUpdate;

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, subject: &str, lines: &[String]) {
            self.alerts
                .lock()
                .unwrap()
                .push((subject.to_string(), lines.to_vec()));
        }
    }

    /// Scriptable pool client: per-cycle error sets, an active-instance map,
    /// and a swap log.
    struct ScriptedClient {
        errors: Mutex<Vec<InstanceError>>,
        active: Mutex<HashMap<String, String>>,
        swaps: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedClient {
        fn new(active: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                errors: Mutex::new(Vec::new()),
                active: Mutex::new(
                    active
                        .iter()
                        .map(|(p, i)| (p.to_string(), i.to_string()))
                        .collect(),
                ),
                swaps: Mutex::new(Vec::new()),
            })
        }

        fn set_errors(&self, errors: Vec<InstanceError>) {
            *self.errors.lock().unwrap() = errors;
        }
    }

    #[async_trait]
    impl PoolClient for ScriptedClient {
        async fn check(&self) -> Vec<InstanceError> {
            self.errors.lock().unwrap().clone()
        }

        fn active_instance(&self, pool: &str) -> Option<String> {
            self.active.lock().unwrap().get(pool).cloned()
        }

        async fn swap_active(&self, pool: &str, instance: &str) {
            self.active
                .lock()
                .unwrap()
                .insert(pool.to_string(), instance.to_string());
            self.swaps
                .lock()
                .unwrap()
                .push((pool.to_string(), instance.to_string()));
        }
    }

    fn error(pool: &str, instance: &str, message: &str) -> InstanceError {
        InstanceError {
            pool: pool.to_string(),
            instance: instance.to_string(),
            message: message.to_string(),
        }
    }

    fn probe(
        client: Arc<ScriptedClient>,
    ) -> (
        PoolHealthProbe,
        Arc<RecordingSink>,
        mpsc::UnboundedReceiver<MetricUpdate>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alerts = Arc::new(RecordingSink::default());
        let specs = vec![PoolSpec {
            pool: "btc".to_string(),
            instances: vec!["a".to_string(), "b".to_string()],
        }];
        let probe = PoolHealthProbe::new(
            MetricEmitter::new("node", "health", tx),
            specs,
            client,
            alerts.clone(),
        );
        (probe, alerts, rx)
    }

    #[tokio::test]
    async fn healthy_cycle_emits_but_does_not_alert() {
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, alerts, mut rx) = probe(client);

        let value = probe.fetch().await.unwrap().unwrap();

        assert!(alerts.alerts.lock().unwrap().is_empty());
        let states: Vec<PoolState> = serde_json::from_value(value).unwrap();
        assert!(!states[0].fully_down());
        // Emission happened even though nothing changed state.
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn degraded_active_triggers_swap_and_alert() {
        // Active = b, but a (higher priority) is up: swap to a.
        let client = ScriptedClient::new(&[("btc", "b")]);
        let (probe, alerts, _rx) = probe(client.clone());

        probe.fetch().await.unwrap();

        assert_eq!(
            client.swaps.lock().unwrap().as_slice(),
            &[("btc".to_string(), "a".to_string())]
        );
        let alerts = alerts.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0]
            .1
            .iter()
            .any(|l| l.contains("switched from b to a")));
    }

    #[tokio::test]
    async fn no_swap_when_preferred_is_already_active() {
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, _alerts, _rx) = probe(client.clone());

        probe.fetch().await.unwrap();
        assert!(client.swaps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn swap_scenario_is_edge_triggered() {
        // Cycle 1: a up, b down, active = b → swap to a + alert.
        let client = ScriptedClient::new(&[("btc", "b")]);
        let (probe, alerts, _rx) = probe(client.clone());
        client.set_errors(vec![error("btc", "b", "rpc down")]);

        probe.fetch().await.unwrap();
        assert_eq!(client.swaps.lock().unwrap().len(), 1);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 1);

        // Cycle 2: identical conditions → no further swap, no further alert.
        probe.fetch().await.unwrap();
        assert_eq!(client.swaps.lock().unwrap().len(), 1);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fully_down_pool_alerts_once() {
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, alerts, _rx) = probe(client.clone());
        client.set_errors(vec![error("btc", "a", "x"), error("btc", "b", "y")]);

        probe.fetch().await.unwrap();
        probe.fetch().await.unwrap();

        let alerts = alerts.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].1.iter().any(|l| l.contains("fully down")));
        // No swap possible with nothing up.
        assert!(client.swaps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovery_after_full_outage_alerts_again() {
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, alerts, _rx) = probe(client.clone());

        client.set_errors(vec![error("btc", "a", "x"), error("btc", "b", "y")]);
        probe.fetch().await.unwrap();

        client.set_errors(vec![]);
        probe.fetch().await.unwrap();

        let alerts = alerts.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts[1].1.iter().any(|l| l.contains("back up")));
    }

    #[tokio::test]
    async fn one_batched_alert_per_cycle() {
        // Both instances transition in the same cycle: one alert, two lines
        // plus the summary.
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, alerts, _rx) = probe(client.clone());
        client.set_errors(vec![error("btc", "a", "x"), error("btc", "b", "y")]);

        probe.fetch().await.unwrap();

        let alerts = alerts.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        let lines = &alerts[0].1;
        assert!(lines.iter().any(|l| l.contains("'btc/a' is down")));
        assert!(lines.iter().any(|l| l.contains("'btc/b' is down")));
        assert!(lines.last().unwrap().starts_with("current state:"));
    }

    #[tokio::test]
    async fn init_restores_previous_cycle() {
        let client = ScriptedClient::new(&[("btc", "a")]);

        // First probe records a fully-down pool, then "restarts".
        let (first, _alerts, _rx) = probe(client.clone());
        client.set_errors(vec![error("btc", "a", "x"), error("btc", "b", "y")]);
        let persisted = first.fetch().await.unwrap().unwrap();

        let (second, alerts, _rx2) = probe(client.clone());
        second.init(persisted);

        // Still fully down after restart: no repeated alert.
        second.fetch().await.unwrap();
        assert!(alerts.alerts.lock().unwrap().is_empty());

        // down_since carried over from before the restart.
        let states: Vec<PoolState> =
            serde_json::from_value(second.emitter().data().unwrap()).unwrap();
        assert!(states[0].instances[0].down_since.is_some());
    }

    #[tokio::test]
    async fn webhook_remains_unsupported() {
        let client = ScriptedClient::new(&[("btc", "a")]);
        let (probe, _alerts, _rx) = probe(client);

        assert!(matches!(
            probe.on_webhook(json!({})).await,
            Err(ObserverError::Unsupported("webhook"))
        ));
    }
}
