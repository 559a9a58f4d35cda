//! Periodic probe driver.
//!
//! One sequential loop per pull probe: tick, fetch (bounded by a timeout),
//! repeat. Because the loop awaits each cycle before taking the next tick,
//! two cycles of the same probe can never overlap — ticks that arrive while
//! a cycle is still running are delayed. A slow probe therefore only delays
//! itself; other probes and the aggregator are unaffected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use vigil_core::MetricObserver;

/// Drive a pull probe until shutdown.
///
/// A fetch error or timeout is logged and the loop continues; the probe's
/// scheduled task survives indefinitely.
pub async fn run_probe(
    observer: Arc<dyn MetricObserver>,
    interval: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let subsystem = observer.subsystem().to_string();
    let metric = observer.metric().to_string();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        %subsystem,
        %metric,
        interval_secs = interval.as_secs(),
        "probe runner started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(timeout, observer.fetch()).await {
                    Ok(Ok(_)) => {
                        debug!(%subsystem, %metric, "probe cycle completed");
                    }
                    Ok(Err(e)) => {
                        warn!(%subsystem, %metric, error = %e, "probe cycle failed");
                    }
                    Err(_) => {
                        warn!(
                            %subsystem,
                            %metric,
                            timeout_secs = timeout.as_secs(),
                            "probe cycle timed out"
                        );
                    }
                }
            }
            _ = shutdown.changed() => {
                info!(%subsystem, %metric, "probe runner shutting down");
                break;
            }
        }
    }
}
