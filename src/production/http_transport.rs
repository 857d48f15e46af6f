//! Reqwest-based order endpoint client

use std::time::{Duration, Instant};

use reqwest::Client;

use crate::traits::{AckMode, DeliveryError, DeliveryResponse, OrderTransport};

/// Upper bound for a single request; the worker applies its own, shorter
/// per-attempt timeout on top of this
const TIMEOUT_SECONDS: u64 = 25;

pub(crate) fn build_client() -> Result<Client, DeliveryError> {
    Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECONDS))
        .build()
        .map_err(|e| DeliveryError::Network(e.to_string()))
}

pub(crate) fn map_send_error(e: reqwest::Error, url: &str) -> DeliveryError {
    if e.is_timeout() {
        tracing::warn!(url, "Request timed out");
        DeliveryError::Timeout
    } else if e.is_connect() || e.is_request() {
        tracing::warn!(url, error = %e, "Network error");
        DeliveryError::Network(e.to_string())
    } else {
        tracing::error!(url, error = %e, "Unexpected request error");
        DeliveryError::Network(e.to_string())
    }
}

/// Posts each order entry as a JSON text body to the order endpoint
pub struct HttpOrderTransport {
    client: Client,
    url: String,
    ack_mode: AckMode,
}

impl HttpOrderTransport {
    pub fn new(url: &str, ack_mode: AckMode) -> Result<Self, DeliveryError> {
        Self::with_client(build_client()?, url, ack_mode)
    }

    pub fn with_client(client: Client, url: &str, ack_mode: AckMode) -> Result<Self, DeliveryError> {
        reqwest::Url::parse(url).map_err(|e| DeliveryError::InvalidUrl(e.to_string()))?;
        tracing::debug!(url, ?ack_mode, "Initialized order endpoint client");
        Ok(Self {
            client,
            url: url.to_string(),
            ack_mode,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl OrderTransport for HttpOrderTransport {
    async fn deliver(&self, entry: &serde_json::Value) -> Result<DeliveryResponse, DeliveryError> {
        let body = serde_json::to_string(entry).map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        let start = Instant::now();

        // Plain text keeps script-hosted endpoints free of CORS preflight
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain;charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.url))?;

        let duration_ms = start.elapsed().as_millis() as u64;

        match self.ack_mode {
            AckMode::Opaque => {
                tracing::debug!(url = %self.url, duration_ms, "Order dispatched (opaque ack)");
                Ok(DeliveryResponse {
                    status: None,
                    duration_ms,
                })
            }
            AckMode::Observed => {
                let status = response.status().as_u16();
                tracing::debug!(url = %self.url, status, duration_ms, "Order endpoint response");
                if !(200..300).contains(&status) {
                    return Err(DeliveryError::Http(status));
                }
                Ok(DeliveryResponse {
                    status: Some(status),
                    duration_ms,
                })
            }
        }
    }
}
