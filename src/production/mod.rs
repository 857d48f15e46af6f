//! Production implementations of traits

mod conversions_api;
pub(crate) mod http_transport;
mod log_sink;
mod telegram;

pub use conversions_api::{report_body, ConversionsApiSink};
pub use http_transport::HttpOrderTransport;
pub use log_sink::PixelLogSink;
pub use telegram::TelegramNotifier;
