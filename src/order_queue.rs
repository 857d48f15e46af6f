//! Order queue facade
//!
//! Wires the persisted queue state, the delivery worker, connectivity and
//! analytics together and exposes what the presentation layer needs.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::analytics::{Tracker, TrackingEvent};
use crate::config::RelayConfig;
use crate::connectivity::Connectivity;
use crate::delivery_worker::{spawn_worker, DeliveryWorker, WorkerConfig, WorkerHandle};
use crate::order::{OrderEntry, OrderPayload};
use crate::order_form::{OrderForm, ValidationErrors};
use crate::production::{ConversionsApiSink, HttpOrderTransport, PixelLogSink, TelegramNotifier};
use crate::queue_state::{QueueAction, QueueState};
use crate::store::{SafeStore, SqliteStore};
use crate::traits::{AnalyticsSink, Clock, OrderTransport, SystemClock};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("No order endpoint configured (set ORDER_RELAY_ENDPOINT)")]
    MissingEndpoint,
    #[error("Transport setup failed: {0}")]
    Transport(#[from] crate::traits::DeliveryError),
}

/// Which status banner the page shows, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Banner {
    Offline,
    PermanentErrors,
    Syncing,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_length: usize,
    pub has_permanent_errors: bool,
    pub is_online: bool,
}

impl QueueStatus {
    pub fn banner(&self) -> Banner {
        if !self.is_online {
            Banner::Offline
        } else if self.has_permanent_errors {
            Banner::PermanentErrors
        } else if self.queue_length > 0 {
            Banner::Syncing
        } else {
            Banner::Idle
        }
    }
}

/// Everything an `OrderQueue` is assembled from
pub struct QueueDeps {
    pub store: SafeStore,
    pub primary: Arc<dyn OrderTransport>,
    pub secondary: Option<Arc<dyn OrderTransport>>,
    pub clock: Arc<dyn Clock>,
    pub tracker: Tracker,
    pub online: bool,
}

pub struct OrderQueue {
    state: Arc<QueueState>,
    worker: Arc<DeliveryWorker>,
    connectivity: Arc<Connectivity>,
    tracker: Tracker,
    handle: Mutex<Option<WorkerHandle>>,
}

impl OrderQueue {
    /// Load the persisted queue and build the worker. The background loop
    /// is not started until `start()`.
    pub fn new(config: &RelayConfig, deps: QueueDeps) -> Self {
        let state = Arc::new(QueueState::load(deps.store, &config.storage_key));
        let connectivity = Arc::new(Connectivity::new(deps.online));
        let mut worker = DeliveryWorker::new(
            state.clone(),
            deps.primary,
            deps.clock,
            connectivity.clone(),
            WorkerConfig::from(config),
        );
        if let Some(secondary) = deps.secondary {
            worker = worker.with_secondary(secondary);
        }

        Self {
            state,
            worker: Arc::new(worker),
            connectivity,
            tracker: deps.tracker,
            handle: Mutex::new(None),
        }
    }

    /// Build with production implementations
    pub fn new_production(config: &RelayConfig) -> Result<Self, SetupError> {
        tracing::info!("Initializing order queue");

        let store = match SqliteStore::open(&config.database_path) {
            Ok(db) => {
                tracing::info!(path = %config.database_path.display(), "Opened order store");
                SafeStore::new(Arc::new(db))
            }
            Err(e) => {
                tracing::warn!(
                    path = %config.database_path.display(),
                    error = %e,
                    "Could not open order store, orders are kept in memory only"
                );
                SafeStore::ephemeral()
            }
        };

        let url = config.primary_endpoint.as_deref().ok_or(SetupError::MissingEndpoint)?;
        let primary: Arc<dyn OrderTransport> = Arc::new(HttpOrderTransport::new(url, config.ack_mode)?);
        tracing::info!(url, ack_mode = ?config.ack_mode, "Order endpoint configured");

        let secondary: Option<Arc<dyn OrderTransport>> = match config.telegram {
            Some(ref telegram) => {
                tracing::info!("Telegram notifications enabled");
                Some(Arc::new(TelegramNotifier::new(telegram.clone())?))
            }
            None => None,
        };

        let mut sinks: Vec<Arc<dyn AnalyticsSink>> = vec![Arc::new(PixelLogSink)];
        if let Some(ref conversions) = config.conversions {
            match ConversionsApiSink::new(conversions.clone()) {
                Ok(sink) => sinks.push(Arc::new(sink)),
                Err(e) => tracing::warn!(error = %e, "Conversion reporting disabled"),
            }
        }

        Ok(Self::new(
            config,
            QueueDeps {
                store,
                primary,
                secondary,
                clock: Arc::new(SystemClock),
                tracker: Tracker::new(sinks),
                online: true,
            },
        ))
    }

    /// Start the background delivery loop on the current runtime. Idempotent.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_none() {
            *handle = Some(spawn_worker(self.worker.clone()));
        }
    }

    /// Stop the background loop and wait for it. Queue state stays readable.
    pub async fn shutdown(&self) {
        let handle = self.handle.lock().unwrap().take();
        match handle {
            Some(handle) => handle.shutdown().await,
            None => self.worker.stop(),
        }
    }

    /// Validate the form, enqueue the order and request an immediate delivery run
    pub fn submit(&self, form: &OrderForm, user_agent: &str) -> Result<OrderEntry, SubmitError> {
        self.tracker
            .track(TrackingEvent::initiate_checkout().with_user_agent(user_agent));

        let payload = form.to_payload(user_agent).map_err(|errors| {
            tracing::info!(fields = ?errors.fields.keys().collect::<Vec<_>>(), "Order form rejected");
            errors
        })?;

        let entry = self.enqueue(payload);
        self.tracker.track(TrackingEvent::purchase(&entry.payload));
        Ok(entry)
    }

    /// Enqueue an already-built payload
    pub fn enqueue(&self, payload: OrderPayload) -> OrderEntry {
        let entry = OrderEntry::new(payload);
        self.state.dispatch(QueueAction::Add(entry.clone()));
        tracing::info!(
            order_id = %entry.id,
            event_id = %entry.payload.event_id,
            online = self.is_online(),
            "Order queued"
        );
        self.worker.trigger();
        entry
    }

    pub fn queue_length(&self) -> usize {
        self.state.pending_count()
    }

    pub fn has_permanent_errors(&self) -> bool {
        self.state.has_permanent_errors()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Forward the host's connectivity signal. Coming back online wakes the
    /// background loop.
    pub fn set_online(&self, online: bool) {
        if self.connectivity.set_online(online) && online {
            self.worker.trigger();
        }
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queue_length: self.queue_length(),
            has_permanent_errors: self.has_permanent_errors(),
            is_online: self.is_online(),
        }
    }

    /// Entries that hit the retry ceiling, kept for support follow-up
    pub fn failed_entries(&self) -> Vec<OrderEntry> {
        self.state.failed()
    }

    /// Drop every permanently failed entry. Returns how many were removed.
    pub fn clear_failed(&self) -> usize {
        let failed = self.state.failed();
        for entry in &failed {
            self.state.dispatch(QueueAction::Remove(entry.id.clone()));
        }
        if !failed.is_empty() {
            tracing::info!(count = failed.len(), "Cleared permanently failed orders");
        }
        failed.len()
    }

    pub fn state(&self) -> &Arc<QueueState> {
        &self.state
    }

    pub fn worker(&self) -> &Arc<DeliveryWorker> {
        &self.worker
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}
