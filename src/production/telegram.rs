//! Telegram bot notification used as the secondary delivery channel

use std::time::Instant;

use reqwest::Client;
use serde_json::{json, Value};

use super::http_transport::{build_client, map_send_error};
use crate::config::TelegramConfig;
use crate::traits::{DeliveryError, DeliveryResponse, OrderTransport};

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, DeliveryError> {
        Ok(Self::with_client(build_client()?, API_BASE, config))
    }

    pub fn with_client(client: Client, api_base: &str, config: TelegramConfig) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token)
    }

    /// Short message naming the customer
    pub fn message_for(&self, entry: &Value) -> Value {
        let name = entry.get("fullName").and_then(Value::as_str).unwrap_or("?");
        json!({
            "chat_id": self.config.chat_id,
            "text": format!("📦 {}", name),
        })
    }
}

#[async_trait::async_trait]
impl OrderTransport for TelegramNotifier {
    async fn deliver(&self, entry: &Value) -> Result<DeliveryResponse, DeliveryError> {
        let start = Instant::now();
        // The token is part of the path, keep it out of logs
        let response = self
            .client
            .post(self.endpoint())
            .json(&self.message_for(entry))
            .send()
            .await
            .map_err(|e| map_send_error(e.without_url(), "telegram"))?;

        let status = response.status().as_u16();
        let duration_ms = start.elapsed().as_millis() as u64;
        if !(200..300).contains(&status) {
            return Err(DeliveryError::Http(status));
        }
        Ok(DeliveryResponse {
            status: Some(status),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::http_transport::tests::local_client;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-100200".to_string(),
        }
    }

    #[test]
    fn test_message_names_customer() {
        let notifier = TelegramNotifier::with_client(local_client(), API_BASE, config());

        let message = notifier.message_for(&json!({"fullName": "Salma Idrissi"}));

        assert_eq!(message, json!({"chat_id": "-100200", "text": "📦 Salma Idrissi"}));
    }

    #[test]
    fn test_endpoint_includes_token() {
        let notifier = TelegramNotifier::with_client(local_client(), "https://api.telegram.org/", config());

        assert_eq!(notifier.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn test_deliver_posts_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "-100200", "text": "📦 Omar"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let notifier = TelegramNotifier::with_client(local_client(), &server.uri(), config());

        let response = notifier.deliver(&json!({"fullName": "Omar"})).await.unwrap();

        assert_eq!(response.status, Some(200));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_rejected_message_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let notifier = TelegramNotifier::with_client(local_client(), &server.uri(), config());

        let result = notifier.deliver(&json!({"fullName": "Omar"})).await;

        assert_eq!(result, Err(DeliveryError::Http(401)));
    }
}
