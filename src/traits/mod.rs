//! Trait definitions for dependency injection
//!
//! Every collaborator outside the queue (durable storage, the order endpoint,
//! analytics sinks, wall-clock time) sits behind a trait so tests can swap it.

mod analytics_sink;
mod clock;
mod key_value_store;
mod order_transport;

pub use analytics_sink::{AnalyticsError, AnalyticsSink};
pub use clock::{Clock, SystemClock};
pub use key_value_store::{KeyValueStore, StoreError};
pub use order_transport::{AckMode, DeliveryError, DeliveryResponse, OrderTransport};

#[cfg(test)]
pub use key_value_store::MockKeyValueStore;
#[cfg(test)]
pub use order_transport::MockOrderTransport;
