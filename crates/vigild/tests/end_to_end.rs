//! Full-pipeline test: real HTTP health checks against local stub servers,
//! through the pool probe, aggregator, and persistence, with state surviving
//! a restart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::sync::watch;

use vigil_aggregator::Aggregator;
use vigil_core::{AlertSink, MetricObserver};
use vigil_failover::{HttpPoolClient, HttpPoolSpec, PoolClient, PoolHealthProbe, PoolSpec, PoolState};
use vigil_probes::ComplianceProbe;
use vigil_state::SnapshotStore;

struct NullSink;

#[async_trait]
impl AlertSink for NullSink {
    async fn send(&self, _subject: &str, _lines: &[String]) {}
}

/// Stub health endpoint answering every connection with the given status.
async fn health_server(status: u16) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let svc = service_fn(move |_req| async move {
                    let resp = hyper::Response::builder()
                        .status(status)
                        .body(Full::new(bytes::Bytes::from("{}")))
                        .unwrap();
                    Ok::<_, hyper::Error>(resp)
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });
    address
}

fn pool_wiring(
    primary_addr: &str,
    secondary_addr: &str,
) -> (Vec<PoolSpec>, Arc<HttpPoolClient>) {
    let specs = vec![PoolSpec {
        pool: "btc".to_string(),
        instances: vec!["primary".to_string(), "secondary".to_string()],
    }];
    let client = Arc::new(HttpPoolClient::new(
        vec![HttpPoolSpec {
            pool: "btc".to_string(),
            instances: vec![
                ("primary".to_string(), primary_addr.to_string()),
                ("secondary".to_string(), secondary_addr.to_string()),
            ],
            path: "/health".to_string(),
        }],
        Duration::from_millis(500),
    ));
    (specs, client)
}

#[tokio::test]
async fn probe_cycle_reaches_the_persisted_snapshot() {
    // Primary is dead (nothing listens on port 1), secondary answers 200.
    let secondary = health_server(200).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vigil.redb");

    let (specs, client) = pool_wiring("127.0.0.1:1", &secondary);

    {
        let store = SnapshotStore::open(&db_path).unwrap();
        let aggregator = Arc::new(
            Aggregator::new(store, Arc::new(NullSink))
                .with_debounce(Duration::from_millis(20)),
        );

        let probe = Arc::new(PoolHealthProbe::new(
            aggregator.emitter("node", "health"),
            specs.clone(),
            client.clone(),
            Arc::new(NullSink),
        ));
        aggregator.register(probe.clone()).unwrap();
        aggregator
            .register(Arc::new(ComplianceProbe::new(
                aggregator.emitter("compliance", "kyc"),
            )))
            .unwrap();
        aggregator.init_state().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pipeline = aggregator.clone();
        let handle = tokio::spawn(async move { pipeline.run(shutdown_rx).await });

        // One manual probe cycle plus one webhook.
        probe.fetch().await.unwrap();
        aggregator
            .dispatch_webhook(
                "compliance",
                "kyc",
                json!({
                    "records": [{"reference": "c-1", "status": "approved", "changed_at": 7}]
                }),
            )
            .await
            .unwrap();

        // Wait past the debounce window for the flush.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = aggregator.snapshot();
        let health = snapshot.metric("node", "health").unwrap();
        let states: Vec<PoolState> = serde_json::from_value(health.data.clone()).unwrap();
        assert_eq!(states.len(), 1);
        assert!(states[0].instance("primary").unwrap().is_down);
        assert!(!states[0].instance("secondary").unwrap().is_down);
        assert!(snapshot.metric("compliance", "kyc").is_some());

        // Failover happened: the client now points at the secondary.
        assert_eq!(
            client.active_instance("btc").as_deref(),
            Some("secondary")
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    // Restart: a fresh aggregator over the same database restores the state.
    let store = SnapshotStore::open(&db_path).unwrap();
    let aggregator = Arc::new(Aggregator::new(store, Arc::new(NullSink)));
    let probe = Arc::new(PoolHealthProbe::new(
        aggregator.emitter("node", "health"),
        specs,
        client,
        Arc::new(NullSink),
    ));
    aggregator.register(probe).unwrap();
    aggregator.init_state().await;

    let snapshot = aggregator.snapshot();
    let health = snapshot.metric("node", "health").unwrap();
    let states: Vec<PoolState> = serde_json::from_value(health.data.clone()).unwrap();
    assert!(states[0].instance("primary").unwrap().down_since.is_some());
}

#[tokio::test]
async fn healthy_pool_keeps_its_primary() {
    let primary = health_server(200).await;
    let secondary = health_server(200).await;
    let (specs, client) = pool_wiring(&primary, &secondary);

    let aggregator = Arc::new(Aggregator::new(
        SnapshotStore::open_in_memory().unwrap(),
        Arc::new(NullSink),
    ));
    let probe = Arc::new(PoolHealthProbe::new(
        aggregator.emitter("node", "health"),
        specs,
        client.clone(),
        Arc::new(NullSink),
    ));
    aggregator.register(probe.clone()).unwrap();

    probe.fetch().await.unwrap();

    assert_eq!(client.active_instance("btc").as_deref(), Some("primary"));
}
