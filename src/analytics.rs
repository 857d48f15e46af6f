//! Marketing lifecycle events and the fire-and-forget tracker
//!
//! Events fan out to every registered `AnalyticsSink`. Sink failures are
//! logged and dropped; they never reach the order flow.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::catalog;
use crate::order::OrderPayload;
use crate::order_form::e164_phone;
use crate::traits::AnalyticsSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    ViewContent,
    ProductColorSelected,
    ProductMirrorSelected,
    AddToCart,
    InitiateCheckout,
    Purchase,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ViewContent => "ViewContent",
            EventKind::ProductColorSelected => "ProductColorSelected",
            EventKind::ProductMirrorSelected => "ProductMirrorSelected",
            EventKind::AddToCart => "AddToCart",
            EventKind::InitiateCheckout => "InitiateCheckout",
            EventKind::Purchase => "Purchase",
        }
    }

    /// Standard events are understood by the ad platform; the rest are custom
    pub fn is_standard(&self) -> bool {
        !matches!(self, EventKind::ProductColorSelected | EventKind::ProductMirrorSelected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    /// Hex SHA-256 digests of the E.164 phone
    #[serde(rename = "ph", skip_serializing_if = "Vec::is_empty")]
    pub phone_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingEvent {
    pub kind: EventKind,
    pub event_id: String,
    /// Unix seconds
    pub event_time: i64,
    pub custom_data: Map<String, Value>,
    pub user_data: UserData,
}

/// Lowercase hex SHA-256 of the phone in E.164 form
pub fn hashed_phone(local: &str) -> String {
    hex::encode(Sha256::digest(e164_phone(local).as_bytes()))
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl TrackingEvent {
    pub fn new(kind: EventKind, custom_data: Map<String, Value>) -> Self {
        Self {
            kind,
            event_id: uuid::Uuid::new_v4().to_string(),
            event_time: chrono::Utc::now().timestamp(),
            custom_data,
            user_data: UserData::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        if !user_agent.is_empty() {
            self.user_data.client_user_agent = Some(user_agent.to_string());
        }
        self
    }

    pub fn view_content() -> Self {
        Self::new(
            EventKind::ViewContent,
            object(json!({
                "content_name": catalog::PRODUCT_NAME,
                "value": catalog::PRICE,
                "currency": catalog::CURRENCY,
            })),
        )
    }

    pub fn color_selected(color_id: &str) -> Self {
        Self::new(EventKind::ProductColorSelected, object(json!({ "id": color_id })))
    }

    pub fn mirror_selected(mirror_id: &str) -> Self {
        Self::new(EventKind::ProductMirrorSelected, object(json!({ "id": mirror_id })))
    }

    pub fn add_to_cart() -> Self {
        Self::new(
            EventKind::AddToCart,
            object(json!({ "value": catalog::PRICE, "currency": catalog::CURRENCY })),
        )
    }

    pub fn initiate_checkout() -> Self {
        Self::new(
            EventKind::InitiateCheckout,
            object(json!({ "value": catalog::PRICE, "currency": catalog::CURRENCY })),
        )
    }

    /// Purchase event for an accepted order. Shares the order's event id so
    /// client and server reports deduplicate.
    pub fn purchase(payload: &OrderPayload) -> Self {
        let mut event = Self::new(
            EventKind::Purchase,
            object(json!({
                "value": catalog::PRICE,
                "currency": catalog::CURRENCY,
                "content_name": payload.selected_color_name,
            })),
        )
        .with_user_agent(&payload.user_agent);
        event.event_id = payload.event_id.clone();
        event.user_data.phone_hashes.push(hashed_phone(&payload.phone));
        event
    }
}

/// Fans events out to all sinks
#[derive(Clone, Default)]
pub struct Tracker {
    sinks: Vec<Arc<dyn AnalyticsSink>>,
}

impl Tracker {
    pub fn new(sinks: Vec<Arc<dyn AnalyticsSink>>) -> Self {
        Self { sinks }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Emit in the background. Outside a tokio runtime the event is dropped.
    pub fn track(&self, event: TrackingEvent) {
        if self.sinks.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tracker = self.clone();
                handle.spawn(async move { tracker.track_and_wait(&event).await });
            }
            Err(_) => {
                tracing::debug!(event = event.name(), "No runtime, analytics event dropped");
            }
        }
    }

    /// Emit to every sink and wait for all of them. Never fails.
    pub async fn track_and_wait(&self, event: &TrackingEvent) {
        let results = join_all(self.sinks.iter().map(|sink| async move { (sink.name(), sink.emit(event).await) })).await;
        for (sink, result) in results {
            match result {
                Ok(()) => tracing::debug!(sink, event = event.name(), event_id = %event.event_id, "Analytics event sent"),
                Err(e) => tracing::warn!(sink, event = event.name(), error = %e, "Analytics event failed"),
            }
        }
    }
}
