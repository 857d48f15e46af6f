//! Test doubles for dependency injection
//!
//! Provides in-memory implementations of all external dependencies for isolated testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::analytics::TrackingEvent;
use crate::traits::{
    AnalyticsError, AnalyticsSink, Clock, DeliveryError, DeliveryResponse, KeyValueStore, OrderTransport,
    StoreError,
};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory slot store for testing
///
/// Writes can be switched to fail (e.g. quota exceeded) to exercise the
/// `SafeStore` fallback.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, Value>>>,
    write_error: Arc<Mutex<Option<StoreError>>>,
    read_error: Arc<Mutex<Option<StoreError>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail with `error`
    pub fn fail_writes(&self, error: StoreError) {
        *self.write_error.lock().unwrap() = Some(error);
    }

    /// Make every subsequent `get` fail with `error`
    pub fn fail_reads(&self, error: StoreError) {
        *self.read_error.lock().unwrap() = Some(error);
    }

    /// Restore normal behaviour
    pub fn heal(&self) {
        *self.write_error.lock().unwrap() = None;
        *self.read_error.lock().unwrap() = None;
    }

    /// Write a value directly, bypassing failure injection and the write counter
    pub fn seed(&self, key: &str, value: Value) {
        self.slots.lock().unwrap().insert(key.to_string(), value);
    }

    /// Read what is actually stored (for assertions)
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.slots.lock().unwrap().get(key).cloned()
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if let Some(err) = self.read_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.slots.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        if let Some(err) = self.write_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.slots.lock().unwrap().insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Some(err) = self.write_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.slots.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// RecordedTransport
// ============================================================================

/// Failure configuration for the recorded transport
#[derive(Clone)]
pub enum TransportBehavior {
    /// Always succeed with given status code
    AlwaysSucceed(u16),
    /// Fail N times, then succeed
    FailThenSucceed { fail_count: usize, error: DeliveryError },
    /// Always fail with given error
    AlwaysFail(DeliveryError),
    /// Custom response based on the delivered body
    Custom(Arc<dyn Fn(&Value) -> Result<DeliveryResponse, DeliveryError> + Send + Sync>),
}

/// Recorded order transport for testing
///
/// Records every delivered body, answers according to its behaviour and
/// tracks how many calls were in flight at once.
#[derive(Clone)]
pub struct RecordedTransport {
    requests: Arc<Mutex<Vec<Value>>>,
    behavior: Arc<Mutex<TransportBehavior>>,
    call_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl RecordedTransport {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            behavior: Arc::new(Mutex::new(TransportBehavior::AlwaysSucceed(200))),
            call_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Always succeed with 200 OK
    pub fn success() -> Self {
        Self::new()
    }

    /// Fail N times, then succeed
    pub fn fail_then_succeed(fail_count: usize, error: DeliveryError) -> Self {
        let client = Self::new();
        client.set_behavior(TransportBehavior::FailThenSucceed { fail_count, error });
        client
    }

    /// Always fail with given error
    pub fn always_fail(error: DeliveryError) -> Self {
        let client = Self::new();
        client.set_behavior(TransportBehavior::AlwaysFail(error));
        client
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the behavior for subsequent calls
    pub fn set_behavior(&self, behavior: TransportBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Get all recorded bodies
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Get number of calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, body: &Value, current_count: usize) -> Result<DeliveryResponse, DeliveryError> {
        let behavior = self.behavior.lock().unwrap().clone();
        let ok = |status| DeliveryResponse {
            status: Some(status),
            duration_ms: 10,
        };
        match behavior {
            TransportBehavior::AlwaysSucceed(status) => Ok(ok(status)),
            TransportBehavior::FailThenSucceed { fail_count, error } => {
                if current_count <= fail_count {
                    Err(error)
                } else {
                    Ok(ok(200))
                }
            }
            TransportBehavior::AlwaysFail(error) => Err(error),
            TransportBehavior::Custom(func) => func(body),
        }
    }
}

impl Default for RecordedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderTransport for RecordedTransport {
    async fn deliver(&self, entry: &Value) -> Result<DeliveryResponse, DeliveryError> {
        self.requests.lock().unwrap().push(entry.clone());
        let current_count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.respond(entry, current_count)
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

/// Analytics sink that keeps every event it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TrackingEvent>>>,
    failure: Option<AnalyticsError>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events but reports `error` for each of them
    pub fn failing(error: AnalyticsError) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            failure: Some(error),
        }
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().iter().map(|e| e.name().to_string()).collect()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, event: &TrackingEvent) -> Result<(), AnalyticsError> {
        self.events.lock().unwrap().push(event.clone());
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
