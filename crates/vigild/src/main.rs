//! vigild — the vigil daemon.
//!
//! Single binary that assembles the monitoring engine:
//! - Snapshot store (redb)
//! - Aggregator + persistence pipeline
//! - Node pool health probe with automatic failover
//! - Balance and compliance probes
//! - Operator API
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml
//! ```

mod config;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use vigil_aggregator::{run_probe, Aggregator};
use vigil_core::{LogAlertSink, MetricObserver};
use vigil_failover::{HttpPoolClient, PoolHealthProbe};
use vigil_probes::{BalanceProbe, ComplianceProbe};
use vigil_state::SnapshotStore;

use config::Config;
use sources::HttpBalanceSource;

#[derive(Parser)]
#[command(name = "vigild", about = "vigil monitoring daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to the configuration file.
        #[arg(long, default_value = "/etc/vigil/vigil.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigild=debug,vigil=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(Config::load(&config)?).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("vigil daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("vigil.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = SnapshotStore::open(&db_path)?;
    info!(path = ?db_path, "snapshot store opened");

    let alerts = Arc::new(LogAlertSink);

    let aggregator = Arc::new(
        Aggregator::new(store, alerts.clone()).with_debounce(config.debounce()),
    );
    info!(debounce_ms = config.debounce_ms, "aggregator initialized");

    // Node pool health + failover.
    let pool_client = Arc::new(HttpPoolClient::new(
        config.node_health.http_pool_specs(),
        config.node_health.check_timeout(),
    ));
    let node_probe = Arc::new(PoolHealthProbe::new(
        aggregator.emitter("node", "health"),
        config.node_health.pool_specs(),
        pool_client,
        alerts.clone(),
    ));
    aggregator.register(node_probe.clone())?;
    info!(
        pools = config.node_health.pools.len(),
        interval_secs = config.node_health.interval_secs,
        "node health probe registered"
    );

    // Balance probe, only when a source is configured.
    let balance_probe = match &config.balances {
        Some(balances) => {
            let source = Arc::new(HttpBalanceSource::new(
                balances.address.clone(),
                balances.path.clone(),
                balances.cycle_timeout(),
            ));
            let probe = Arc::new(BalanceProbe::new(
                aggregator.emitter("payment", "balance"),
                source,
                alerts.clone(),
                balances.limits(),
            ));
            aggregator.register(probe.clone())?;
            info!(
                minimums = balances.minimums.len(),
                interval_secs = balances.interval_secs,
                "balance probe registered"
            );
            Some(probe)
        }
        None => None,
    };

    // Compliance webhook receiver.
    let compliance_probe: Arc<dyn MetricObserver> =
        Arc::new(ComplianceProbe::new(aggregator.emitter("compliance", "kyc")));
    aggregator.register(compliance_probe)?;
    info!("compliance probe registered");

    // Seed observers from the persisted snapshot before any cycle runs.
    aggregator.init_state().await;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let pipeline = aggregator.clone();
    let pipeline_shutdown = shutdown_rx.clone();
    let pipeline_handle = tokio::spawn(async move {
        pipeline.run(pipeline_shutdown).await;
    });

    let node_handle = tokio::spawn(run_probe(
        node_probe as Arc<dyn MetricObserver>,
        config.node_health.interval(),
        config.node_health.cycle_timeout(),
        shutdown_rx.clone(),
    ));

    let balance_handle = match (&config.balances, balance_probe) {
        (Some(balances), Some(probe)) => Some(tokio::spawn(run_probe(
            probe as Arc<dyn MetricObserver>,
            balances.interval(),
            balances.cycle_timeout(),
            shutdown_rx.clone(),
        ))),
        _ => None,
    };

    // ── Start API server ───────────────────────────────────────

    let router = vigil_api::build_router(aggregator);

    info!(addr = %config.api_addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(config.api_addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks; the pipeline flushes pending state first.
    let _ = node_handle.await;
    if let Some(handle) = balance_handle {
        let _ = handle.await;
    }
    let _ = pipeline_handle.await;

    info!("vigil daemon stopped");
    Ok(())
}
