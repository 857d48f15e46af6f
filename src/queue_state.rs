//! Canonical in-memory queue state
//!
//! All mutations go through `reduce`, a pure function over the current entry
//! list. `QueueState` owns the list, applies actions under a lock and mirrors
//! every resulting snapshot into the `SafeStore` slot.

use std::sync::Mutex;

use crate::order::{EntryStatus, EntryUpdate, OrderEntry};
use crate::store::SafeStore;

/// The four transitions the queue accepts
#[derive(Debug, Clone, PartialEq)]
pub enum QueueAction {
    /// Replace the whole list (startup load)
    Init(Vec<OrderEntry>),
    /// Append a new entry; ignored if an entry with the same id exists
    Add(OrderEntry),
    /// Merge a partial update into the entry with this id; no-op if absent
    UpdateStatus { id: String, updates: EntryUpdate },
    /// Delete the entry with this id
    Remove(String),
}

/// Compute the next list. Never mutates `state`.
pub fn reduce(state: &[OrderEntry], action: &QueueAction) -> Vec<OrderEntry> {
    match action {
        QueueAction::Init(entries) => entries.clone(),
        QueueAction::Add(entry) if state.iter().any(|e| e.id == entry.id) => state.to_vec(),
        QueueAction::Add(entry) => {
            let mut next = state.to_vec();
            next.push(entry.clone());
            next
        }
        QueueAction::UpdateStatus { id, updates } => state
            .iter()
            .map(|e| if &e.id == id { e.merged(updates) } else { e.clone() })
            .collect(),
        QueueAction::Remove(id) => state.iter().filter(|e| &e.id != id).cloned().collect(),
    }
}

struct Inner {
    entries: Vec<OrderEntry>,
    /// False until an action other than the initial load has run
    touched: bool,
}

pub struct QueueState {
    inner: Mutex<Inner>,
    store: SafeStore,
    storage_key: String,
}

impl QueueState {
    /// Build the state from whatever was last persisted under `storage_key`.
    /// Missing or undecodable data yields an empty queue.
    pub fn load(store: SafeStore, storage_key: &str) -> Self {
        let loaded = match store.get(storage_key) {
            Some(value) => match serde_json::from_value::<Vec<OrderEntry>>(value) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "Discarding undecodable persisted queue");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let state = Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                touched: false,
            }),
            store,
            storage_key: storage_key.to_string(),
        };
        state.dispatch(QueueAction::Init(loaded));

        let snapshot = state.snapshot();
        tracing::info!(
            entries = snapshot.len(),
            pending = snapshot.iter().filter(|e| e.is_pending()).count(),
            "Order queue loaded"
        );
        state
    }

    /// Apply an action and persist the resulting list.
    ///
    /// An empty list produced by the initial load is not written, so an
    /// unreadable store is not overwritten with `[]` before anything happened.
    pub fn dispatch(&self, action: QueueAction) {
        let is_init = matches!(action, QueueAction::Init(_));
        let mut inner = self.inner.lock().unwrap();
        let next = reduce(&inner.entries, &action);
        inner.entries = next;
        if !is_init {
            inner.touched = true;
        }

        if inner.entries.is_empty() && !inner.touched {
            return;
        }
        match serde_json::to_value(&inner.entries) {
            Ok(value) => self.store.set(&self.storage_key, value),
            Err(e) => tracing::error!(error = %e, "Failed to serialize queue snapshot"),
        }
    }

    pub fn snapshot(&self) -> Vec<OrderEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<OrderEntry> {
        self.inner.lock().unwrap().entries.iter().find(|e| e.id == id).cloned()
    }

    /// Pending entries in insertion order
    pub fn pending(&self) -> Vec<OrderEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.is_pending())
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn failed(&self) -> Vec<OrderEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::FailedPermanent)
            .cloned()
            .collect()
    }

    pub fn has_permanent_errors(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e.status == EntryStatus::FailedPermanent)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemoryStore;
    use crate::order::sample_payload;
    use std::sync::Arc;

    const KEY: &str = "test_queue_v1";

    fn entry(name: &str) -> OrderEntry {
        OrderEntry::new(sample_payload(name))
    }

    #[test]
    fn test_reduce_add_appends() {
        let a = entry("A");
        let b = entry("B");

        let state = reduce(&[], &QueueAction::Add(a.clone()));
        let state = reduce(&state, &QueueAction::Add(b.clone()));

        assert_eq!(state, vec![a, b]);
    }

    #[test]
    fn test_reduce_add_with_existing_id_is_ignored() {
        let a = entry("A");
        let mut retried = a.clone();
        retried.attempts = 3;

        let state = reduce(&[a.clone()], &QueueAction::Add(retried));

        assert_eq!(state, vec![a]);
    }

    #[test]
    fn test_duplicate_add_keeps_single_entry() {
        let store = SafeStore::new(Arc::new(MemoryStore::new()));
        let state = QueueState::load(store, KEY);
        let a = entry("A");

        state.dispatch(QueueAction::Add(a.clone()));
        state.dispatch(QueueAction::Add(a.clone()));
        state.dispatch(QueueAction::Remove(a.id.clone()));

        assert!(state.is_empty());
        assert!(state.get(&a.id).is_none());
    }

    #[test]
    fn test_reduce_does_not_mutate_input() {
        let a = entry("A");
        let before = vec![a.clone()];
        let copy = before.clone();

        let _ = reduce(&before, &QueueAction::Remove(a.id.clone()));
        let _ = reduce(
            &before,
            &QueueAction::UpdateStatus {
                id: a.id.clone(),
                updates: EntryUpdate {
                    attempts: Some(3),
                    ..Default::default()
                },
            },
        );

        assert_eq!(before, copy);
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let a = entry("A");
        let state = vec![a.clone(), entry("B")];
        let action = QueueAction::UpdateStatus {
            id: a.id.clone(),
            updates: EntryUpdate::failed_attempt(1, 500, EntryStatus::Pending, "boom"),
        };

        assert_eq!(reduce(&state, &action), reduce(&state, &action));
    }

    #[test]
    fn test_reduce_update_unknown_id_is_noop() {
        let state = vec![entry("A")];
        let next = reduce(
            &state,
            &QueueAction::UpdateStatus {
                id: "missing".into(),
                updates: EntryUpdate {
                    status: Some(EntryStatus::FailedPermanent),
                    ..Default::default()
                },
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn test_reduce_remove_only_matching() {
        let a = entry("A");
        let b = entry("B");
        let next = reduce(&[a.clone(), b.clone()], &QueueAction::Remove(a.id.clone()));
        assert_eq!(next, vec![b]);
    }

    #[test]
    fn test_reduce_init_replaces() {
        let a = entry("A");
        let b = entry("B");
        let next = reduce(&[a], &QueueAction::Init(vec![b.clone()]));
        assert_eq!(next, vec![b]);
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let backend = Arc::new(MemoryStore::new());
        let state = QueueState::load(SafeStore::new(backend.clone()), KEY);
        let a = entry("A");

        state.dispatch(QueueAction::Add(a.clone()));
        let stored: Vec<OrderEntry> = serde_json::from_value(backend.raw(KEY).unwrap()).unwrap();
        assert_eq!(stored, vec![a.clone()]);

        state.dispatch(QueueAction::Remove(a.id.clone()));
        assert_eq!(backend.raw(KEY), Some(serde_json::json!([])));
    }

    #[test]
    fn test_empty_initial_load_is_not_written() {
        let backend = Arc::new(MemoryStore::new());
        let _state = QueueState::load(SafeStore::new(backend.clone()), KEY);

        assert_eq!(backend.raw(KEY), None);
        assert_eq!(backend.write_count(), 0);
    }

    #[test]
    fn test_round_trip_through_store() {
        let backend = Arc::new(MemoryStore::new());
        let first = QueueState::load(SafeStore::new(backend.clone()), KEY);
        let a = entry("A");
        let b = entry("B");
        first.dispatch(QueueAction::Add(a.clone()));
        first.dispatch(QueueAction::Add(b.clone()));
        first.dispatch(QueueAction::UpdateStatus {
            id: b.id.clone(),
            updates: EntryUpdate::failed_attempt(5, 42, EntryStatus::FailedPermanent, "HTTP error: 500"),
        });

        let second = QueueState::load(SafeStore::new(backend), KEY);

        assert_eq!(second.snapshot(), first.snapshot());
        assert_eq!(second.pending_count(), 1);
        assert!(second.has_permanent_errors());
        assert_eq!(second.get(&b.id).unwrap().attempts, 5);
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend.seed(KEY, serde_json::json!({"not": "a list"}));

        let state = QueueState::load(SafeStore::new(backend.clone()), KEY);

        assert!(state.is_empty());
        // the corrupt value is left alone until the first real mutation
        assert_eq!(backend.raw(KEY), Some(serde_json::json!({"not": "a list"})));
    }

    #[test]
    fn test_pending_keeps_insertion_order() {
        let state = QueueState::load(SafeStore::ephemeral(), KEY);
        let a = entry("A");
        let b = entry("B");
        let c = entry("C");
        for e in [&a, &b, &c] {
            state.dispatch(QueueAction::Add(e.clone()));
        }
        state.dispatch(QueueAction::UpdateStatus {
            id: b.id.clone(),
            updates: EntryUpdate {
                status: Some(EntryStatus::FailedPermanent),
                ..Default::default()
            },
        });

        let ids: Vec<_> = state.pending().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(state.failed().len(), 1);
    }
}
