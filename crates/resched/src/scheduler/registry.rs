//! Registry of live periodic retry registrations
//!
//! Maps task identity to the cancellation handle of its timer loop. The map
//! enforces the core invariant: at most one live registration per identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Cancellation handle for one periodic retry loop
pub(crate) struct Registration {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Registration {
    pub fn new(cancel_tx: watch::Sender<bool>, handle: JoinHandle<()>) -> Self {
        Self { cancel_tx, handle }
    }

    /// Signal the loop to stop firing
    ///
    /// Never interrupts an execution already in flight; the loop observes the
    /// signal at its next scheduling point. Delivery failure (the loop already
    /// ended) is logged and otherwise ignored.
    pub fn cancel(&self, identity: &str) {
        if self.cancel_tx.send(true).is_err() {
            error!(task_id = %identity, "retry registration refused cancellation");
        }
    }

    /// Forcibly stop the loop task; used only during scheduler shutdown
    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Identity-keyed map of live registrations
///
/// Written by submission-path tasks (registering) and timer loops
/// (deregistering themselves); per-key operations are atomic through the
/// map's entry API.
#[derive(Default)]
pub(crate) struct RetryRegistry {
    entries: DashMap<String, Registration>,
}

impl RetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration built by `make` if the identity has none
    ///
    /// Returns false without invoking `make` when a registration already
    /// exists; the duplicate attempt is logged at error level.
    pub fn register_with(
        &self,
        identity: &str,
        make: impl FnOnce() -> Registration,
    ) -> bool {
        match self.entries.entry(identity.to_string()) {
            Entry::Occupied(_) => {
                error!(task_id = %identity, "retry registration failed: task already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(make());
                true
            }
        }
    }

    /// Cancel and remove a registration; idempotent
    pub fn remove(&self, identity: &str) -> bool {
        match self.entries.remove(identity) {
            Some((_, registration)) => {
                registration.cancel(identity);
                true
            }
            None => {
                debug!(task_id = %identity, "deregistration skipped: no live registration");
                false
            }
        }
    }

    /// Remove every registration, returning the handles for teardown
    pub fn drain(&self) -> Vec<(String, Registration)> {
        let identities: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        identities
            .into_iter()
            .filter_map(|identity| self.entries.remove(&identity))
            .collect()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_registration() -> (Registration, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(async {});
        (Registration::new(cancel_tx, handle), cancel_rx)
    }

    #[tokio::test]
    async fn test_second_registration_rejected() {
        let registry = RetryRegistry::new();

        let mut built = 0;
        assert!(registry.register_with("task-a", || {
            built += 1;
            dummy_registration().0
        }));
        assert!(!registry.register_with("task-a", || {
            built += 1;
            dummy_registration().0
        }));

        // The losing attempt never constructed a registration.
        assert_eq!(built, 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = RetryRegistry::new();
        let (registration, cancel_rx) = dummy_registration();
        registry.register_with("task-a", || registration);

        assert!(registry.remove("task-a"));
        assert!(*cancel_rx.borrow());
        assert!(!registry.remove("task-a"));
        assert!(!registry.contains("task-a"));
    }

    #[tokio::test]
    async fn test_reregistration_after_removal() {
        let registry = RetryRegistry::new();
        registry.register_with("task-a", || dummy_registration().0);
        registry.remove("task-a");

        assert!(registry.register_with("task-a", || dummy_registration().0));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = RetryRegistry::new();
        registry.register_with("task-a", || dummy_registration().0);
        registry.register_with("task-b", || dummy_registration().0);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len(), 0);
    }
}
