//! HTTP instance checks.
//!
//! The daemon's pool client probes each instance's health endpoint over
//! plain HTTP/1.1. Any failure mode — connect error, handshake error,
//! non-2xx, timeout — produces an error message that feeds straight into
//! the down-detection algorithm.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::controller::InstanceError;
use crate::probe::PoolClient;

/// Probe one instance's health endpoint.
///
/// Returns `None` when the endpoint answered 2xx, otherwise the error
/// message for the down-detection algorithm.
pub async fn http_check(address: &str, path: &str, timeout: Duration) -> Option<String> {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => return Some(format!("connect failed: {e}")),
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => return Some(format!("handshake failed: {e}")),
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "vigil-failover/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => return Some(format!("invalid request: {e}")),
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => None,
            Ok(resp) => Some(format!("health endpoint returned {}", resp.status())),
            Err(e) => Some(format!("request failed: {e}")),
        }
    })
    .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(_) => Some(format!("health check timed out after {timeout:?}")),
    };

    if let Some(msg) = &outcome {
        debug!(%uri, error = %msg, "instance check failed");
    }
    outcome
}

/// Configuration of one HTTP-checked pool: instance name → address, in
/// priority order, plus the health path probed on each.
#[derive(Debug, Clone)]
pub struct HttpPoolSpec {
    pub pool: String,
    /// `(instance name, host:port)` in priority order.
    pub instances: Vec<(String, String)>,
    /// Health endpoint path, e.g. `/health`.
    pub path: String,
}

/// Pool client that health-checks instances over HTTP and keeps the
/// active-connection registry in memory.
pub struct HttpPoolClient {
    specs: Vec<HttpPoolSpec>,
    timeout: Duration,
    active: Mutex<HashMap<String, String>>,
}

impl HttpPoolClient {
    /// Create a client; each pool starts connected to its highest-priority
    /// instance.
    pub fn new(specs: Vec<HttpPoolSpec>, timeout: Duration) -> Self {
        let active = specs
            .iter()
            .filter_map(|s| {
                s.instances
                    .first()
                    .map(|(name, _)| (s.pool.clone(), name.clone()))
            })
            .collect();
        Self {
            specs,
            timeout,
            active: Mutex::new(active),
        }
    }

    fn address_of(&self, pool: &str, instance: &str) -> Option<String> {
        self.specs
            .iter()
            .find(|s| s.pool == pool)?
            .instances
            .iter()
            .find(|(name, _)| name == instance)
            .map(|(_, addr)| addr.clone())
    }
}

#[async_trait]
impl PoolClient for HttpPoolClient {
    async fn check(&self) -> Vec<InstanceError> {
        let mut errors = Vec::new();
        for spec in &self.specs {
            for (instance, address) in &spec.instances {
                if let Some(message) = http_check(address, &spec.path, self.timeout).await {
                    errors.push(InstanceError {
                        pool: spec.pool.clone(),
                        instance: instance.clone(),
                        message,
                    });
                }
            }
        }
        errors
    }

    fn active_instance(&self, pool: &str) -> Option<String> {
        self.active
            .lock()
            .expect("active registry poisoned")
            .get(pool)
            .cloned()
    }

    async fn swap_active(&self, pool: &str, instance: &str) {
        let address = self.address_of(pool, instance).unwrap_or_default();
        self.active
            .lock()
            .expect("active registry poisoned")
            .insert(pool.to_string(), instance.to_string());
        info!(%pool, %instance, %address, "active instance reconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pool: &str, instances: &[(&str, &str)]) -> HttpPoolSpec {
        HttpPoolSpec {
            pool: pool.to_string(),
            instances: instances
                .iter()
                .map(|(n, a)| (n.to_string(), a.to_string()))
                .collect(),
            path: "/health".to_string(),
        }
    }

    #[tokio::test]
    async fn check_against_closed_port_reports_error() {
        // Port 1 won't be listening.
        let msg = http_check("127.0.0.1:1", "/health", Duration::from_millis(200)).await;
        assert!(msg.is_some());
    }

    #[tokio::test]
    async fn check_against_live_endpoint_is_healthy() {
        use http_body_util::Full;
        use hyper::service::service_fn;
        use hyper_util::rt::TokioIo;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let svc = service_fn(|_req| async {
                Ok::<_, hyper::Error>(hyper::Response::new(Full::new(bytes::Bytes::from("ok"))))
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), svc)
                .await;
        });

        let msg = http_check(&address, "/health", Duration::from_secs(1)).await;
        assert_eq!(msg, None);
    }

    #[tokio::test]
    async fn client_checks_all_instances_and_collects_errors() {
        let client = HttpPoolClient::new(
            vec![spec("btc", &[("a", "127.0.0.1:1"), ("b", "127.0.0.1:1")])],
            Duration::from_millis(100),
        );

        let errors = client.check().await;
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.pool == "btc"));
    }

    #[tokio::test]
    async fn active_starts_at_highest_priority_and_swaps() {
        let client = HttpPoolClient::new(
            vec![spec("btc", &[("a", "127.0.0.1:1"), ("b", "127.0.0.1:2")])],
            Duration::from_millis(100),
        );

        assert_eq!(client.active_instance("btc"), Some("a".to_string()));
        client.swap_active("btc", "b").await;
        assert_eq!(client.active_instance("btc"), Some("b".to_string()));
        assert_eq!(client.active_instance("eth"), None);
    }
}
