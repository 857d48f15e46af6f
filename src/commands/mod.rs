//! Calls exposed to the presentation layer
//!
//! Every response is plain serialisable data; errors are flattened to strings
//! or field maps the page can render directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analytics::TrackingEvent;
use crate::catalog;
use crate::order::OrderEntry;
use crate::order_form::{FormStep, OrderForm};
use crate::order_queue::{Banner, OrderQueue, SubmitError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub queue_length: usize,
    pub has_permanent_errors: bool,
    pub is_online: bool,
    pub banner: Banner,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub accepted: bool,
    pub order_id: Option<String>,
    pub event_id: Option<String>,
    /// Field name to message, empty when accepted
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOrderItem {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub submitted_at: String,
}

impl From<OrderEntry> for FailedOrderItem {
    fn from(entry: OrderEntry) -> Self {
        Self {
            id: entry.id,
            full_name: entry.payload.full_name,
            phone: entry.payload.phone,
            address: entry.payload.address,
            attempts: entry.attempts,
            last_error: entry.last_error,
            submitted_at: entry.payload.timestamp,
        }
    }
}

/// Request shape for a submission from the page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub form: OrderForm,
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub ok: bool,
    pub errors: BTreeMap<String, String>,
}

pub fn get_queue_status(queue: &OrderQueue) -> QueueStatusResponse {
    let status = queue.status();
    QueueStatusResponse {
        banner: status.banner(),
        queue_length: status.queue_length,
        has_permanent_errors: status.has_permanent_errors,
        is_online: status.is_online,
    }
}

pub fn submit_order(queue: &OrderQueue, request: &SubmitRequest) -> SubmitResponse {
    match queue.submit(&request.form, &request.user_agent) {
        Ok(entry) => SubmitResponse {
            accepted: true,
            order_id: Some(entry.id),
            event_id: Some(entry.payload.event_id),
            errors: BTreeMap::new(),
        },
        Err(SubmitError::Validation(errors)) => SubmitResponse {
            accepted: false,
            order_id: None,
            event_id: None,
            errors: errors.fields,
        },
    }
}

/// Validate one step before moving on. Leaving the mirror step counts as
/// adding to cart.
pub fn advance_step(queue: &OrderQueue, form: &OrderForm, step: FormStep) -> StepResponse {
    match form.validate_step(step) {
        Ok(()) => {
            if step == FormStep::Mirror {
                queue.tracker().track(TrackingEvent::add_to_cart());
            }
            StepResponse {
                ok: true,
                errors: BTreeMap::new(),
            }
        }
        Err(errors) => StepResponse {
            ok: false,
            errors: errors.fields,
        },
    }
}

/// Record a variant selection on the form and report it
pub fn select_variant(queue: &OrderQueue, form: &mut OrderForm, step: FormStep, id: &str) -> Result<(), String> {
    match step {
        FormStep::Color => {
            catalog::find_color(id).ok_or_else(|| format!("Unknown color: {}", id))?;
            form.select_color(id);
            queue.tracker().track(TrackingEvent::color_selected(id));
        }
        FormStep::Mirror => {
            catalog::find_mirror(id).ok_or_else(|| format!("Unknown mirror style: {}", id))?;
            form.select_mirror(id);
            queue.tracker().track(TrackingEvent::mirror_selected(id));
        }
        FormStep::Contact => return Err("Contact step has no variants".to_string()),
    }
    Ok(())
}

pub fn page_viewed(queue: &OrderQueue, user_agent: &str) {
    queue
        .tracker()
        .track(TrackingEvent::view_content().with_user_agent(user_agent));
}

pub fn set_online(queue: &OrderQueue, online: bool) -> QueueStatusResponse {
    queue.set_online(online);
    get_queue_status(queue)
}

pub fn get_failed_orders(queue: &OrderQueue) -> Vec<FailedOrderItem> {
    queue.failed_entries().into_iter().map(FailedOrderItem::from).collect()
}

/// Returns the number of orders removed
pub fn clear_failed_orders(queue: &OrderQueue) -> usize {
    queue.clear_failed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::analytics::Tracker;
    use crate::config::RelayConfig;
    use crate::mocks::{ManualClock, RecordedTransport, RecordingSink};
    use crate::order_queue::QueueDeps;
    use crate::store::SafeStore;

    fn queue(sink: &RecordingSink) -> OrderQueue {
        OrderQueue::new(
            &RelayConfig::default(),
            QueueDeps {
                store: SafeStore::ephemeral(),
                primary: Arc::new(RecordedTransport::success()),
                secondary: None,
                clock: Arc::new(ManualClock::new(0)),
                tracker: Tracker::new(vec![Arc::new(sink.clone())]),
                online: true,
            },
        )
    }

    fn request(json: &str) -> SubmitRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_status_response_serializes_camel_case() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);

        let value = serde_json::to_value(get_queue_status(&queue)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({"queueLength": 0, "hasPermanentErrors": false, "isOnline": true, "banner": "idle"})
        );
    }

    #[test]
    fn test_submit_accepted() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);

        let response = submit_order(
            &queue,
            &request(r#"{"selectedColor":"white","selectedMirror":"style_1","fullName":"Omar","phoneLocalPart":"612345678","address":"Fes","userAgent":"UA"}"#),
        );

        assert!(response.accepted);
        assert!(response.order_id.is_some());
        assert_eq!(get_queue_status(&queue).queue_length, 1);
    }

    #[test]
    fn test_submit_rejected_returns_field_errors() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);

        let response = submit_order(&queue, &request(r#"{"selectedColor":"white","phoneLocalPart":"12"}"#));

        assert!(!response.accepted);
        assert!(response.errors.contains_key("selectedMirror"));
        assert!(response.errors.contains_key("phoneLocalPart"));
        assert_eq!(get_queue_status(&queue).queue_length, 0);
    }

    #[test]
    fn test_select_variant_validates_ids() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);
        let mut form = OrderForm::default();

        assert!(select_variant(&queue, &mut form, FormStep::Color, "purple").is_err());
        select_variant(&queue, &mut form, FormStep::Color, "wood").unwrap();
        select_variant(&queue, &mut form, FormStep::Mirror, "style_3").unwrap();

        assert_eq!(form.selected_color.as_deref(), Some("wood"));
        assert_eq!(form.selected_mirror.as_deref(), Some("style_3"));
        assert!(advance_step(&queue, &form, FormStep::Mirror).ok);
        assert!(!advance_step(&queue, &form, FormStep::Contact).ok);
    }

    #[test]
    fn test_set_online_reports_banner() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);

        assert_eq!(set_online(&queue, false).banner, Banner::Offline);
        assert_eq!(set_online(&queue, true).banner, Banner::Idle);
    }

    #[test]
    fn test_failed_orders_empty_initially() {
        let sink = RecordingSink::new();
        let queue = queue(&sink);

        assert!(get_failed_orders(&queue).is_empty());
        assert_eq!(clear_failed_orders(&queue), 0);
    }
}
