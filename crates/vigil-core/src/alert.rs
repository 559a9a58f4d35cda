//! Alert channel.
//!
//! Alerts are fire-and-forget: the engine never waits on delivery
//! confirmation and never fails because the channel itself failed.
//! Implementations log their own delivery errors locally.

use async_trait::async_trait;
use tracing::warn;

/// Outbound alert channel consumed by probes and the aggregator.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Send one batched alert with a subject and message lines.
    async fn send(&self, subject: &str, lines: &[String]);
}

/// Alert sink that writes to the local log only.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, subject: &str, lines: &[String]) {
        warn!(%subject, lines = lines.len(), "alert");
        for line in lines {
            warn!(%subject, "  {line}");
        }
    }
}
