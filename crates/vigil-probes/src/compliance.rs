//! KYC pipeline probe.
//!
//! Push-only: the KYC provider posts status updates to the webhook
//! endpoint. The payload is validated against the expected shape and the
//! records are folded into the cached per-customer map; `fetch` stays
//! unsupported.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use vigil_core::{MetricEmitter, MetricObserver, ObserverError};

/// Status of one customer's KYC file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

/// One KYC status record, keyed by the provider's customer reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KycRecord {
    pub reference: String,
    pub status: KycStatus,
    /// Provider-side timestamp of the status change (Unix seconds).
    pub changed_at: u64,
}

/// Webhook payload shape: a batch of records.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KycWebhook {
    records: Vec<KycRecord>,
}

/// KYC observer (`compliance`/`kyc`).
pub struct ComplianceProbe {
    emitter: MetricEmitter,
    records: Mutex<BTreeMap<String, KycRecord>>,
}

impl ComplianceProbe {
    pub fn new(emitter: MetricEmitter) -> Self {
        Self {
            emitter,
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl MetricObserver for ComplianceProbe {
    fn emitter(&self) -> &MetricEmitter {
        &self.emitter
    }

    fn init(&self, data: Value) {
        match serde_json::from_value::<BTreeMap<String, KycRecord>>(data.clone()) {
            Ok(records) => {
                *self.records.lock().expect("kyc records poisoned") = records;
                self.emitter.seed(data);
            }
            Err(e) => warn!(error = %e, "ignoring undecodable persisted kyc state"),
        }
    }

    async fn on_webhook(&self, payload: Value) -> Result<(), ObserverError> {
        let webhook: KycWebhook = serde_json::from_value(payload)
            .map_err(|e| ObserverError::Validation(e.to_string()))?;

        if webhook.records.is_empty() {
            return Err(ObserverError::Validation(
                "payload contains no records".to_string(),
            ));
        }
        if let Some(bad) = webhook.records.iter().find(|r| r.reference.is_empty()) {
            return Err(ObserverError::Validation(format!(
                "record with empty reference (status {:?})",
                bad.status
            )));
        }

        let merged = {
            let mut records = self.records.lock().expect("kyc records poisoned");
            for record in webhook.records {
                records.insert(record.reference.clone(), record);
            }
            records.clone()
        };

        debug!(customers = merged.len(), "kyc state updated from webhook");
        let value =
            serde_json::to_value(&merged).map_err(|e| ObserverError::Validation(e.to_string()))?;
        self.emitter.emit(value);
        Ok(())
    }
}
