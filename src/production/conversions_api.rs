//! Server-side conversion reporting through the Graph API

use reqwest::Client;
use serde_json::{json, Value};

use crate::analytics::TrackingEvent;
use crate::config::ConversionsConfig;
use crate::traits::{AnalyticsError, AnalyticsSink};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

pub struct ConversionsApiSink {
    client: Client,
    api_base: String,
    config: ConversionsConfig,
}

/// Request body for one event
pub fn report_body(event: &TrackingEvent, config: &ConversionsConfig) -> Value {
    let mut body = json!({
        "data": [{
            "event_name": event.name(),
            "event_time": event.event_time,
            "event_id": event.event_id,
            "action_source": "website",
            "event_source_url": config.source_url,
            "user_data": event.user_data,
            "custom_data": event.custom_data,
        }]
    });
    if let Some(ref code) = config.test_event_code {
        body["test_event_code"] = json!(code);
    }
    body
}

impl ConversionsApiSink {
    pub fn new(config: ConversionsConfig) -> Result<Self, AnalyticsError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AnalyticsError::Network(e.to_string()))?;
        Ok(Self::with_client(client, GRAPH_API_BASE, config))
    }

    pub fn with_client(client: Client, api_base: &str, config: ConversionsConfig) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/events", self.api_base, self.config.pixel_id)
    }
}

#[async_trait::async_trait]
impl AnalyticsSink for ConversionsApiSink {
    fn name(&self) -> &str {
        "conversions_api"
    }

    async fn emit(&self, event: &TrackingEvent) -> Result<(), AnalyticsError> {
        if !event.kind.is_standard() {
            return Ok(());
        }
        if self.config.access_token.is_empty() {
            return Err(AnalyticsError::NotConfigured);
        }

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("access_token", self.config.access_token.as_str())])
            .json(&report_body(event, &self.config))
            .send()
            .await
            .map_err(|e| AnalyticsError::Network(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(AnalyticsError::Http(status));
        }
        Ok(())
    }
}
