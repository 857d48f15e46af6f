//! Order entries held by the delivery queue

use serde::{Deserialize, Serialize};

/// Delivery status of a queued order.
///
/// Delivered orders are removed from the queue rather than kept with a
/// `sent` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    FailedPermanent,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::FailedPermanent => "failed_permanent",
        }
    }
}

/// Business data of one order, as sent to the order endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    /// Idempotency id the endpoint uses to drop duplicate deliveries
    pub event_id: String,
    pub selected_color_name: String,
    pub selected_mirror_name: String,
    pub full_name: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub comments: String,
    /// RFC 3339 submission time
    pub timestamp: String,
    #[serde(default)]
    pub user_agent: String,
}

/// One submitted order awaiting confirmed delivery.
///
/// Serialized flat (payload fields next to the queue bookkeeping) so the
/// endpoint receives a single JSON object per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub id: String,
    #[serde(flatten)]
    pub payload: OrderPayload,
    pub status: EntryStatus,
    pub attempts: u32,
    /// Epoch millis of the latest attempt, 0 before the first one
    pub last_attempt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OrderEntry {
    /// Fresh pending entry with a generated id
    pub fn new(payload: OrderPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            status: EntryStatus::Pending,
            attempts: 0,
            last_attempt: 0,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    /// Apply a partial update; fields left as `None` are kept
    pub fn merged(&self, update: &EntryUpdate) -> Self {
        let mut next = self.clone();
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(attempts) = update.attempts {
            next.attempts = attempts;
        }
        if let Some(last_attempt) = update.last_attempt {
            next.last_attempt = last_attempt;
        }
        if let Some(ref error) = update.last_error {
            next.last_error = Some(error.clone());
        }
        next
    }
}

/// Partial update merged into an entry by `QueueAction::UpdateStatus`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryUpdate {
    pub status: Option<EntryStatus>,
    pub attempts: Option<u32>,
    pub last_attempt: Option<i64>,
    pub last_error: Option<String>,
}

impl EntryUpdate {
    /// Update recorded after a failed attempt
    pub fn failed_attempt(attempts: u32, at: i64, status: EntryStatus, error: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            attempts: Some(attempts),
            last_attempt: Some(at),
            last_error: Some(error.into()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_payload(name: &str) -> OrderPayload {
    OrderPayload {
        event_id: uuid::Uuid::new_v4().to_string(),
        selected_color_name: "اللون الابيض".to_string(),
        selected_mirror_name: "الشكل 1".to_string(),
        full_name: name.to_string(),
        phone: "0612345678".to_string(),
        address: "12 Rue Atlas, Casablanca".to_string(),
        comments: String::new(),
        timestamp: "2026-10-17T10:00:00Z".to_string(),
        user_agent: "test-agent".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_pending() {
        let entry = OrderEntry::new(sample_payload("Salma"));

        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.last_attempt, 0);
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = OrderEntry::new(sample_payload("A"));
        let b = OrderEntry::new(sample_payload("B"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serializes_flat_camel_case() {
        let entry = OrderEntry::new(sample_payload("Salma"));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["fullName"], "Salma");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["lastAttempt"], 0);
        assert!(json.get("payload").is_none());
        assert!(json.get("lastError").is_none());
    }

    #[test]
    fn test_deserializes_without_optional_fields() {
        let json = serde_json::json!({
            "id": "abc",
            "eventId": "evt",
            "selectedColorName": "N/A",
            "selectedMirrorName": "N/A",
            "fullName": "Omar",
            "phone": "0712345678",
            "address": "Rabat",
            "timestamp": "2026-10-17T10:00:00Z",
            "status": "failed_permanent",
            "attempts": 5,
            "lastAttempt": 1000
        });

        let entry: OrderEntry = serde_json::from_value(json).unwrap();

        assert_eq!(entry.status, EntryStatus::FailedPermanent);
        assert_eq!(entry.payload.comments, "");
        assert_eq!(entry.payload.user_agent, "");
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let entry = OrderEntry::new(sample_payload("Salma"));
        let merged = entry.merged(&EntryUpdate {
            attempts: Some(2),
            ..Default::default()
        });

        assert_eq!(merged.attempts, 2);
        assert_eq!(merged.status, EntryStatus::Pending);
        assert_eq!(merged.last_attempt, 0);
        assert_eq!(merged.id, entry.id);
    }
}
