//! Persistent slot storage for the order queue
//!
//! `SqliteStore` is the durable backend. `SafeStore` wraps any backend and
//! never fails: when a read or write errors it silently serves the value from
//! an in-process map keyed the same way, so callers cannot tell whether this
//! session is durable or ephemeral.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::traits::{KeyValueStore, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the slot database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Self::init_table(&conn)?;
        tracing::debug!(path = %path.display(), "Opened slot store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_table(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT value FROM slots WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );
        let raw = match result {
            Ok(raw) => raw,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, raw, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::DiskFull => {
                StoreError::QuotaExceeded
            }
            other => StoreError::Database(other.to_string()),
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM slots WHERE key = ?1", params![key])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Infallible store front with an in-memory fallback.
///
/// A key lands in the fallback map whenever its durable write fails, and is
/// served from there until a later durable write of the same key succeeds.
/// With no backend at all every key lives in the map.
#[derive(Clone)]
pub struct SafeStore {
    durable: Option<Arc<dyn KeyValueStore>>,
    memory: Arc<Mutex<HashMap<String, Value>>>,
}

impl SafeStore {
    pub fn new(durable: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable: Some(durable),
            memory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Memory-only store, for contexts without durable storage
    pub fn ephemeral() -> Self {
        Self {
            durable: None,
            memory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.lock().unwrap().get(key) {
            return Some(value.clone());
        }
        let durable = self.durable.as_ref()?;
        match durable.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Durable read failed, using memory fallback");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: Value) {
        let Some(durable) = self.durable.as_ref() else {
            self.memory.lock().unwrap().insert(key.to_string(), value);
            return;
        };
        match durable.set(key, &value) {
            Ok(()) => {
                self.memory.lock().unwrap().remove(key);
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Durable write failed, using memory fallback");
                self.memory.lock().unwrap().insert(key.to_string(), value);
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.memory.lock().unwrap().remove(key);
        if let Some(durable) = self.durable.as_ref() {
            if let Err(e) = durable.delete(key) {
                tracing::debug!(key = %key, error = %e, "Durable delete failed");
            }
        }
    }
}
