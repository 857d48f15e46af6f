//! Order Relay - offline-tolerant order submission with guaranteed delivery
//!
//! Orders accepted from the storefront form are persisted locally and retried
//! against the order endpoint with exponential backoff until acknowledged or
//! permanently failed. Dependencies are injected through the traits in
//! `traits` so every layer can be tested in isolation.

pub mod commands;
pub mod mocks;
pub mod production;
pub mod traits;

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod delivery_worker;
pub mod order;
pub mod order_form;
pub mod order_queue;
pub mod queue_state;
pub mod store;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::RelayConfig;
pub use order_queue::{OrderQueue, QueueStatus, SubmitError};

/// Initialize logging to both stdout and a daily-rolling file in `log_dir`.
///
/// The returned guard flushes the file writer; keep it alive for the
/// lifetime of the process.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = rolling::daily(log_dir, "order-relay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "order_relay=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .try_init()?;

    Ok(guard)
}
