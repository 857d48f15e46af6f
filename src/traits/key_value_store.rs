//! Durable key-value slot trait

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("Storage unavailable")]
    Unavailable,
}

/// Trait for a durable slot store holding JSON values under string keys
///
/// Production: SQLite table
/// Testing: in-memory map with failure injection
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `Ok(None)` when nothing was written
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Overwrite the value stored under `key`
    fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;

    /// Drop the value stored under `key`
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
