//! External data source clients for the daemon's probes.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;

use vigil_probes::{AccountBalance, BalanceSource};

/// Balance source that reads a JSON report (`[{account, balance}]`) from an
/// HTTP endpoint, e.g. the banking gateway's internal reporting route.
pub struct HttpBalanceSource {
    address: String,
    path: String,
    timeout: Duration,
}

impl HttpBalanceSource {
    pub fn new(address: String, path: String, timeout: Duration) -> Self {
        Self {
            address,
            path,
            timeout,
        }
    }

    async fn get(&self) -> Result<Vec<AccountBalance>, String> {
        let uri = format!("http://{}{}", self.address, self.path);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| format!("connect failed: {e}"))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("handshake failed: {e}"))?;
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &self.address)
            .header("user-agent", "vigild/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("invalid request: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("balance endpoint returned {}", resp.status()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| format!("body read failed: {e}"))?
            .to_bytes();
        serde_json::from_slice(&body).map_err(|e| format!("invalid balance report: {e}"))
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    async fn fetch_balances(&self) -> Result<Vec<AccountBalance>, String> {
        match tokio::time::timeout(self.timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "balance fetch timed out after {:?}",
                self.timeout
            )),
        }
    }
}
