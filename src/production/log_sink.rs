//! Client pixel stand-in: records lifecycle events in the log

use crate::analytics::TrackingEvent;
use crate::traits::{AnalyticsError, AnalyticsSink};

#[derive(Debug, Default)]
pub struct PixelLogSink;

#[async_trait::async_trait]
impl AnalyticsSink for PixelLogSink {
    fn name(&self) -> &str {
        "pixel"
    }

    async fn emit(&self, event: &TrackingEvent) -> Result<(), AnalyticsError> {
        let method = if event.kind.is_standard() { "track" } else { "trackCustom" };
        tracing::info!(
            method,
            event = event.name(),
            event_id = %event.event_id,
            data = %serde_json::Value::Object(event.custom_data.clone()),
            "Pixel event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_never_fails() {
        let sink = PixelLogSink;

        assert!(sink.emit(&TrackingEvent::color_selected("black")).await.is_ok());
        assert!(sink.emit(&TrackingEvent::add_to_cart()).await.is_ok());
    }
}
