//! Account balance probe.
//!
//! Polls the external balance source (bank API, hot wallet) on a slow
//! cadence, compares every account against its configured minimum, and
//! alerts once per below-minimum transition. Recovery clears the latch so
//! a later drop alerts again.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use vigil_core::{AlertSink, MetricEmitter, MetricObserver, ObserverError};

/// Subject line of the low-balance alert.
const ALERT_SUBJECT: &str = "Balance below minimum";

/// Subject line of the source-failure alert.
const SOURCE_ALERT_SUBJECT: &str = "Balance source unreachable";

/// One account's balance as reported by the external source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalance {
    pub account: String,
    pub balance: f64,
}

/// Configured floor for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceLimit {
    pub account: String,
    pub minimum: f64,
}

/// Per-account status in the emitted report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountStatus {
    pub account: String,
    pub balance: f64,
    /// Configured minimum, if any.
    pub minimum: Option<f64>,
    pub below_minimum: bool,
}

/// The external collaborator: one balance read per cycle.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balances(&self) -> Result<Vec<AccountBalance>, String>;
}

/// Balance observer (`payment`/`balance`).
pub struct BalanceProbe {
    emitter: MetricEmitter,
    source: Arc<dyn BalanceSource>,
    alerts: Arc<dyn AlertSink>,
    limits: Vec<BalanceLimit>,
    /// Accounts currently latched below minimum; alerting is edge-triggered
    /// on entry into this set.
    low: Mutex<BTreeSet<String>>,
    /// Latched while the source keeps failing; the failure alert fires only
    /// on the first failed cycle after a successful one.
    source_down: AtomicBool,
}

impl BalanceProbe {
    pub fn new(
        emitter: MetricEmitter,
        source: Arc<dyn BalanceSource>,
        alerts: Arc<dyn AlertSink>,
        limits: Vec<BalanceLimit>,
    ) -> Self {
        Self {
            emitter,
            source,
            alerts,
            limits,
            low: Mutex::new(BTreeSet::new()),
            source_down: AtomicBool::new(false),
        }
    }

    fn minimum_for(&self, account: &str) -> Option<f64> {
        self.limits
            .iter()
            .find(|l| l.account == account)
            .map(|l| l.minimum)
    }
}

#[async_trait]
impl MetricObserver for BalanceProbe {
    fn emitter(&self) -> &MetricEmitter {
        &self.emitter
    }

    fn init(&self, data: Value) {
        // Restore the low-balance latch so a persisting shortfall does not
        // re-alert after a restart.
        match serde_json::from_value::<Vec<AccountStatus>>(data.clone()) {
            Ok(report) => {
                let low = report
                    .iter()
                    .filter(|s| s.below_minimum)
                    .map(|s| s.account.clone())
                    .collect();
                *self.low.lock().expect("balance latch poisoned") = low;
                self.emitter.seed(data);
            }
            Err(e) => warn!(error = %e, "ignoring undecodable persisted balance report"),
        }
    }

    async fn fetch(&self) -> Result<Option<Value>, ObserverError> {
        let balances = match self.source.fetch_balances().await {
            Ok(balances) => balances,
            Err(message) => {
                if !self.source_down.swap(true, Ordering::SeqCst) {
                    self.alerts
                        .send(SOURCE_ALERT_SUBJECT, &[message.clone()])
                        .await;
                }
                return Err(ObserverError::Upstream(message));
            }
        };
        self.source_down.store(false, Ordering::SeqCst);

        let report: Vec<AccountStatus> = balances
            .iter()
            .map(|b| {
                let minimum = self.minimum_for(&b.account);
                AccountStatus {
                    account: b.account.clone(),
                    balance: b.balance,
                    minimum,
                    below_minimum: minimum.is_some_and(|m| b.balance < m),
                }
            })
            .collect();

        let now_low: BTreeSet<String> = report
            .iter()
            .filter(|s| s.below_minimum)
            .map(|s| s.account.clone())
            .collect();

        let lines: Vec<String> = {
            let previous = self.low.lock().expect("balance latch poisoned");
            report
                .iter()
                .filter(|s| s.below_minimum && !previous.contains(&s.account))
                .map(|s| {
                    format!(
                        "account '{}' balance {} below minimum {}",
                        s.account,
                        s.balance,
                        s.minimum.unwrap_or_default()
                    )
                })
                .collect()
        };

        if !lines.is_empty() {
            warn!(accounts = lines.len(), "balances below minimum");
            self.alerts.send(ALERT_SUBJECT, &lines).await;
        } else {
            debug!(accounts = report.len(), "balance cycle completed");
        }

        *self.low.lock().expect("balance latch poisoned") = now_low;

        let value =
            serde_json::to_value(&report).map_err(|e| ObserverError::Upstream(e.to_string()))?;
        self.emitter.emit(value.clone());
        Ok(Some(value))
    }
}
