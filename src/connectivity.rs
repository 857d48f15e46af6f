//! Online/offline flag shared between the host and the delivery worker

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Mirrors the host's connectivity signal.
///
/// Cheap to read from the worker on every run; changes are broadcast through a
/// `watch` channel so the worker can react to coming back online.
pub struct Connectivity {
    online: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            online: AtomicBool::new(online),
            tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a connectivity change. Returns true if the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }
        if online {
            tracing::info!("Connection restored, resuming order sync");
        } else {
            tracing::warn!("Connection lost, orders are held locally");
        }
        self.tx.send_replace(online);
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_reports_changes_only() {
        let conn = Connectivity::new(true);

        assert!(!conn.set_online(true));
        assert!(conn.set_online(false));
        assert!(!conn.is_online());
        assert!(conn.set_online(true));
        assert!(conn.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let conn = Connectivity::new(false);
        let mut rx = conn.subscribe();

        conn.set_online(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
