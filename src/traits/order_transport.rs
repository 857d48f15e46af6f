//! Order delivery transport trait

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Timeout")]
    Timeout,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DeliveryError {
    /// Whether a later attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Network(_) => true,
            DeliveryError::Http(code) => *code >= 500 || *code == 429,
            DeliveryError::Timeout => true,
            DeliveryError::InvalidUrl(_) => false,
            DeliveryError::Serialization(_) => false,
        }
    }
}

/// How a transport decides that the remote side accepted a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Only a 2xx status counts as delivered
    #[default]
    Observed,
    /// The response is not inspected; a request that was dispatched without
    /// a transport error counts as delivered
    Opaque,
}

impl AckMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "observed" => Some(AckMode::Observed),
            "opaque" => Some(AckMode::Opaque),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    /// `None` when the transport runs in opaque mode
    pub status: Option<u16>,
    pub duration_ms: u64,
}

/// Trait for one delivery destination
///
/// Production: reqwest POST to the order endpoint, Telegram bot API
/// Testing: recorded responses
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OrderTransport: Send + Sync {
    /// Deliver one serialized order entry
    async fn deliver(&self, entry: &serde_json::Value) -> Result<DeliveryResponse, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(DeliveryError::Timeout.is_retryable());
        assert!(DeliveryError::Http(503).is_retryable());
        assert!(DeliveryError::Http(429).is_retryable());
        assert!(!DeliveryError::Http(400).is_retryable());
        assert!(!DeliveryError::InvalidUrl("x".into()).is_retryable());
    }

    #[test]
    fn test_ack_mode_parse() {
        assert_eq!(AckMode::parse(" Opaque "), Some(AckMode::Opaque));
        assert_eq!(AckMode::parse("observed"), Some(AckMode::Observed));
        assert_eq!(AckMode::parse("maybe"), None);
        assert_eq!(AckMode::default(), AckMode::Observed);
    }
}
