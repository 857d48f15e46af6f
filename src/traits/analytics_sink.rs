//! Marketing analytics sink trait

use thiserror::Error;

use crate::analytics::TrackingEvent;

#[derive(Debug, Clone, Error)]
pub enum AnalyticsError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Sink not configured")]
    NotConfigured,
}

/// A destination for lifecycle events (client pixel, conversion API, ...)
///
/// Failures are reported to the caller only so they can be logged; the
/// tracker never lets them reach the order flow.
#[async_trait::async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn emit(&self, event: &TrackingEvent) -> Result<(), AnalyticsError>;
}
