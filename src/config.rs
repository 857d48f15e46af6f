//! Runtime configuration for the order relay
//!
//! Defaults mirror the storefront's queue constants. Every field can be
//! overridden from the environment; values that fail to parse keep the
//! default and log a warning.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::traits::AckMode;

pub const DEFAULT_STORAGE_KEY: &str = "elite_order_queue_v8";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 4000;
pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 8000;
pub const DEFAULT_BURST_DELAY_MS: u64 = 1000;

/// Telegram bot used as the optional secondary notification channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Server-side conversion reporting (Graph API)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionsConfig {
    pub pixel_id: String,
    pub access_token: String,
    pub test_event_code: Option<String>,
    /// Reported as `event_source_url`
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Slot key of the persisted queue; bump the version suffix to invalidate old data
    pub storage_key: String,
    pub max_retries: u32,
    pub sync_interval: Duration,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    /// Delay before the follow-up run when a batch leaves pending entries
    pub burst_delay: Duration,
    pub primary_endpoint: Option<String>,
    pub ack_mode: AckMode,
    pub telegram: Option<TelegramConfig>,
    pub conversions: Option<ConversionsConfig>,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            burst_delay: Duration::from_millis(DEFAULT_BURST_DELAY_MS),
            primary_endpoint: None,
            ack_mode: AckMode::Observed,
            telegram: None,
            conversions: None,
            database_path: PathBuf::from("order-relay.sqlite"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RelayConfig {
    /// Read overrides from the process environment without logging.
    /// Rejected values are returned so they can be logged once a subscriber
    /// is installed.
    pub fn from_env_deferred() -> (Self, Vec<ConfigWarning>) {
        Self::from_lookup_deferred(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup, logging rejected values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, warnings) = Self::from_lookup_deferred(lookup);
        for warning in &warnings {
            warning.log();
        }
        config
    }

    pub fn from_lookup_deferred<F>(lookup: F) -> (Self, Vec<ConfigWarning>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut warnings = Vec::new();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("ORDER_RELAY_STORAGE_KEY") {
            config.storage_key = key;
        }
        if let Some(v) = parse_var(&get, &mut warnings, "ORDER_RELAY_MAX_RETRIES") {
            config.max_retries = v;
        }
        if let Some(v) = parse_var(&get, &mut warnings, "ORDER_RELAY_SYNC_INTERVAL_MS") {
            config.sync_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<usize, _>(&get, &mut warnings, "ORDER_RELAY_BATCH_SIZE") {
            config.batch_size = v.max(1);
        }
        if let Some(v) = parse_var(&get, &mut warnings, "ORDER_RELAY_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&get, &mut warnings, "ORDER_RELAY_BURST_DELAY_MS") {
            config.burst_delay = Duration::from_millis(v);
        }
        config.primary_endpoint = get("ORDER_RELAY_ENDPOINT");
        if let Some(raw) = get("ORDER_RELAY_ACK_MODE") {
            match AckMode::parse(&raw) {
                Some(mode) => config.ack_mode = mode,
                None => warnings.push(ConfigWarning::UnknownAckMode(raw)),
            }
        }

        if let (Some(bot_token), Some(chat_id)) =
            (get("ORDER_RELAY_TELEGRAM_TOKEN"), get("ORDER_RELAY_TELEGRAM_CHAT_ID"))
        {
            config.telegram = Some(TelegramConfig { bot_token, chat_id });
        }

        if let (Some(pixel_id), Some(access_token)) =
            (get("ORDER_RELAY_PIXEL_ID"), get("ORDER_RELAY_CAPI_TOKEN"))
        {
            config.conversions = Some(ConversionsConfig {
                pixel_id,
                access_token,
                test_event_code: get("ORDER_RELAY_CAPI_TEST_CODE"),
                source_url: get("ORDER_RELAY_SOURCE_URL").unwrap_or_default(),
            });
        }

        if let Some(path) = get("ORDER_RELAY_DB") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = get("ORDER_RELAY_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        (config, warnings)
    }
}

/// An override that was present but rejected; the default was kept
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("Ignoring unparseable config value {key}={value}")]
    Unparseable { key: String, value: String },
    #[error("Unknown ORDER_RELAY_ACK_MODE {0}, keeping observed")]
    UnknownAckMode(String),
}

impl ConfigWarning {
    pub fn log(&self) {
        match self {
            ConfigWarning::Unparseable { key, value } => {
                tracing::warn!(key = %key, value = %value, "Ignoring unparseable config value")
            }
            ConfigWarning::UnknownAckMode(value) => {
                tracing::warn!(value = %value, "Unknown ORDER_RELAY_ACK_MODE, keeping observed")
            }
        }
    }
}

fn parse_var<T, G>(get: &G, warnings: &mut Vec<ConfigWarning>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warnings.push(ConfigWarning::Unparseable {
                key: key.to_string(),
                value: raw,
            });
            None
        }
    }
}
