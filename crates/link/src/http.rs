//! HTTP client for a peer's `/battery` endpoint.
//!
//! One GET per fetch, bounded by a hard timeout that covers connecting,
//! the response head and the body read.

use std::time::Duration;

use crate::level::BatteryLevel;
use crate::peer::PeerAddress;
use crate::provider::{FetchError, FetchFuture, StatusSource};
use crate::{BATTERY_PATH, DEFAULT_FETCH_TIMEOUT, DEFAULT_PORT};

/// Polls peers over plain HTTP on a fixed port.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    client: reqwest::Client,
    port: u16,
    timeout: Duration,
}

impl HttpStatusClient {
    pub fn new(port: u16, timeout: Duration) -> Self {
        // LAN peers are never reached through a system proxy.
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client, port, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self, peer: &PeerAddress) -> String {
        format!("http://{}:{}{}", peer.url_host(), self.port, BATTERY_PATH)
    }

    async fn fetch_level(&self, peer: &PeerAddress) -> Result<BatteryLevel, FetchError> {
        let url = self.endpoint(peer);
        match tokio::time::timeout(self.timeout, self.request(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }

    async fn request(&self, url: &str) -> Result<BatteryLevel, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        BatteryLevel::parse_body(&body).map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl Default for HttpStatusClient {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_FETCH_TIMEOUT)
    }
}

impl StatusSource for HttpStatusClient {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch<'a>(&'a self, peer: &'a PeerAddress) -> FetchFuture<'a> {
        Box::pin(self.fetch_level(peer))
    }
}
