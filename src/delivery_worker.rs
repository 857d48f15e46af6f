//! Background delivery worker for queued orders
//!
//! A run picks up to `batch_size` pending entries (oldest first), attempts
//! each one concurrently and records the outcome through the queue reducer:
//! success removes the entry, failure bumps `attempts` and either leaves it
//! pending for a backoff of `2^attempts` seconds or marks it permanently failed
//! once `max_retries` is reached.
//!
//! Runs are started by a fixed ticker, by explicit triggers (new order,
//! connectivity restored) and by a short follow-up when a run leaves pending
//! entries behind. At most one run is in flight at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RelayConfig;
use crate::connectivity::Connectivity;
use crate::order::{EntryStatus, EntryUpdate, OrderEntry};
use crate::queue_state::{QueueAction, QueueState};
use crate::traits::{Clock, DeliveryError, DeliveryResponse, OrderTransport};

/// Worker tunables derived from `RelayConfig`
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_retries: u32,
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    pub sync_interval: Duration,
    pub burst_delay: Duration,
}

impl From<&RelayConfig> for WorkerConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            batch_size: config.batch_size,
            fetch_timeout: config.fetch_timeout,
            sync_interval: config.sync_interval,
            burst_delay: config.burst_delay,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Minimum wait after an attempt before the entry may be retried: `2^attempts` seconds
pub fn backoff_millis(attempts: u32) -> i64 {
    2i64.checked_pow(attempts)
        .and_then(|factor| factor.checked_mul(1000))
        .unwrap_or(i64::MAX)
}

/// Whether the backoff window since the last attempt has elapsed
pub fn is_due(entry: &OrderEntry, now_millis: i64) -> bool {
    now_millis.saturating_sub(entry.last_attempt) >= backoff_millis(entry.attempts)
}

/// What happened to one entry during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// Attempt failed; entry stays pending with this attempt count
    Retrying { attempts: u32 },
    /// Attempt failed and hit the retry ceiling
    FailedPermanent { attempts: u32 },
    /// Still inside its backoff window, left untouched
    Skipped,
}

/// Tally of one completed run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub delivered: usize,
    pub retrying: usize,
    pub skipped: usize,
    pub permanently_failed: Vec<String>,
    /// Pending entries left in the queue after the run
    pub remaining_pending: usize,
}

impl BatchResult {
    pub fn attempted(&self) -> usize {
        self.delivered + self.retrying + self.permanently_failed.len()
    }
}

/// Why `run_once` did or did not run a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Offline,
    /// Another run is in flight
    Busy,
    Stopped,
    /// Nothing pending
    Idle,
    Completed(BatchResult),
}

/// Clears the in-flight flag when the run ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DeliveryWorker {
    state: Arc<QueueState>,
    primary: Arc<dyn OrderTransport>,
    secondary: Option<Arc<dyn OrderTransport>>,
    clock: Arc<dyn Clock>,
    connectivity: Arc<Connectivity>,
    config: WorkerConfig,
    in_flight: AtomicBool,
    stopped: AtomicBool,
    wakeup: Notify,
}

impl DeliveryWorker {
    pub fn new(
        state: Arc<QueueState>,
        primary: Arc<dyn OrderTransport>,
        clock: Arc<dyn Clock>,
        connectivity: Arc<Connectivity>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            state,
            primary,
            secondary: None,
            clock,
            connectivity,
            config,
            in_flight: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            wakeup: Notify::new(),
        }
    }

    /// Add a best-effort secondary destination (notification channel)
    pub fn with_secondary(mut self, secondary: Arc<dyn OrderTransport>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Ask the background loop for a run as soon as possible
    pub fn trigger(&self) {
        self.wakeup.notify_one();
    }

    /// Stop accepting runs and wake the background loop so it can exit
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wakeup.notify_one();
    }

    /// Run one delivery batch.
    ///
    /// No-op while offline, stopped, or while another run is in flight.
    pub async fn run_once(&self) -> RunOutcome {
        if self.is_stopped() {
            return RunOutcome::Stopped;
        }
        if !self.connectivity.is_online() {
            return RunOutcome::Offline;
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Delivery run already in flight, skipping");
            return RunOutcome::Busy;
        };

        let batch: Vec<OrderEntry> = self
            .state
            .pending()
            .into_iter()
            .take(self.config.batch_size)
            .collect();
        if batch.is_empty() {
            return RunOutcome::Idle;
        }

        let outcomes = join_all(batch.iter().map(|entry| self.attempt(entry))).await;

        let mut result = BatchResult::default();
        for (entry, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                AttemptOutcome::Delivered => result.delivered += 1,
                AttemptOutcome::Retrying { .. } => result.retrying += 1,
                AttemptOutcome::FailedPermanent { .. } => result.permanently_failed.push(entry.id.clone()),
                AttemptOutcome::Skipped => result.skipped += 1,
            }
        }
        result.remaining_pending = self.state.pending_count();

        if result.attempted() > 0 {
            tracing::info!(
                delivered = result.delivered,
                retrying = result.retrying,
                failed_permanent = result.permanently_failed.len(),
                remaining = result.remaining_pending,
                "Delivery batch finished"
            );
        }
        RunOutcome::Completed(result)
    }

    async fn attempt(&self, entry: &OrderEntry) -> AttemptOutcome {
        let now = self.clock.now_millis();
        if !is_due(entry, now) {
            tracing::debug!(
                order_id = %entry.id,
                attempts = entry.attempts,
                wait_ms = backoff_millis(entry.attempts).saturating_sub(now.saturating_sub(entry.last_attempt)),
                "Order still in backoff"
            );
            return AttemptOutcome::Skipped;
        }

        match self.deliver(entry).await {
            Ok(()) => {
                tracing::info!(order_id = %entry.id, attempts = entry.attempts, "Order delivered");
                self.state.dispatch(QueueAction::Remove(entry.id.clone()));
                AttemptOutcome::Delivered
            }
            Err(e) => {
                let attempts = entry.attempts.saturating_add(1);
                let permanent = attempts >= self.config.max_retries;
                let status = if permanent {
                    EntryStatus::FailedPermanent
                } else {
                    EntryStatus::Pending
                };
                self.state.dispatch(QueueAction::UpdateStatus {
                    id: entry.id.clone(),
                    updates: EntryUpdate::failed_attempt(attempts, self.clock.now_millis(), status, e.to_string()),
                });

                if permanent {
                    tracing::error!(
                        order_id = %entry.id,
                        attempts,
                        error = %e,
                        "Order delivery failed permanently"
                    );
                    AttemptOutcome::FailedPermanent { attempts }
                } else {
                    tracing::warn!(
                        order_id = %entry.id,
                        attempts,
                        max = self.config.max_retries,
                        retry_in_ms = backoff_millis(attempts),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Order delivery failed"
                    );
                    AttemptOutcome::Retrying { attempts }
                }
            }
        }
    }

    /// Send to every configured destination concurrently, each bounded by
    /// its own `fetch_timeout`.
    ///
    /// Succeeds if any destination succeeds; the error reported otherwise is
    /// the primary's.
    async fn deliver(&self, entry: &OrderEntry) -> Result<(), DeliveryError> {
        let body = serde_json::to_value(entry).map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let mut calls = vec![self.deliver_bounded(self.primary.as_ref(), &body)];
        if let Some(ref secondary) = self.secondary {
            calls.push(self.deliver_bounded(secondary.as_ref(), &body));
        }

        let mut results = join_all(calls).await.into_iter();
        let primary = results.next().unwrap_or(Err(DeliveryError::Network("no destination".into())));
        let secondary_ok = results.fold(false, |ok, r| match r {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(order_id = %entry.id, error = %e, "Secondary notification failed");
                ok
            }
        });

        match primary {
            Ok(_) => Ok(()),
            Err(_) if secondary_ok => {
                tracing::warn!(order_id = %entry.id, "Primary endpoint failed, secondary channel accepted order");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn deliver_bounded(
        &self,
        transport: &dyn OrderTransport,
        body: &serde_json::Value,
    ) -> Result<DeliveryResponse, DeliveryError> {
        tokio::time::timeout(self.config.fetch_timeout, transport.deliver(body))
            .await
            .unwrap_or(Err(DeliveryError::Timeout))
    }
}

/// Handle to the background loop. Dropping it leaves the loop running.
pub struct WorkerHandle {
    worker: Arc<DeliveryWorker>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn worker(&self) -> &Arc<DeliveryWorker> {
        &self.worker
    }

    /// Stop the loop and wait for it to exit. A run already in flight finishes first.
    pub async fn shutdown(self) {
        self.worker.stop();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Delivery worker task ended abnormally");
        }
        tracing::info!("Delivery worker stopped");
    }
}

/// Spawn the background delivery loop on the current tokio runtime.
///
/// The loop runs a batch on every ticker interval, on `trigger()`, when
/// connectivity comes back, and `burst_delay` after a run that left entries
/// pending.
pub fn spawn_worker(worker: Arc<DeliveryWorker>) -> WorkerHandle {
    let loop_worker = worker.clone();
    let task = tokio::spawn(async move {
        let worker = loop_worker;
        tracing::info!(
            interval_ms = worker.config.sync_interval.as_millis() as u64,
            batch_size = worker.config.batch_size,
            "Delivery worker started"
        );
        let mut interval = tokio::time::interval(worker.config.sync_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut online_rx = worker.connectivity.subscribe();
        let mut online_open = true;
        let mut follow_up: Option<Instant> = None;

        loop {
            let follow_up_at = follow_up.unwrap_or_else(|| Instant::now() + worker.config.sync_interval);
            tokio::select! {
                _ = interval.tick() => {}
                _ = worker.wakeup.notified() => {}
                changed = online_rx.changed(), if online_open => {
                    if changed.is_err() {
                        online_open = false;
                        continue;
                    }
                    if !*online_rx.borrow_and_update() {
                        continue;
                    }
                }
                _ = tokio::time::sleep_until(follow_up_at), if follow_up.is_some() => {
                    follow_up = None;
                }
            }

            if worker.is_stopped() {
                break;
            }

            if let RunOutcome::Completed(result) = worker.run_once().await {
                if result.remaining_pending > 0 && follow_up.is_none() {
                    follow_up = Some(Instant::now() + worker.config.burst_delay);
                }
            }
        }
    });

    WorkerHandle { worker, task }
}
