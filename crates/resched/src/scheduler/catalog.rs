//! Catalog of named retryable operations
//!
//! An explicit mapping from task identity to operation, populated at startup.
//! Lets an external trigger (an HTTP endpoint, a cron hook) re-run a known
//! task by name through the normal submission path.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use super::task::{boxed_operation, TaskOperation};

/// Registry of operations addressable by task identity
///
/// # Example
///
/// ```
/// use resched::TaskCatalog;
///
/// let mut catalog = TaskCatalog::new();
/// catalog.register("orders.sync", || async {
///     // push pending orders downstream...
///     Ok(true)
/// });
///
/// assert!(catalog.contains("orders.sync"));
/// ```
#[derive(Default)]
pub struct TaskCatalog {
    operations: HashMap<String, TaskOperation>,
}

impl TaskCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under an identity, replacing any previous one
    pub fn register<F, Fut>(&mut self, identity: impl Into<String>, operation: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.operations
            .insert(identity.into(), boxed_operation(operation));
    }

    /// Look up an operation by identity
    pub(crate) fn get(&self, identity: &str) -> Option<TaskOperation> {
        self.operations.get(identity).cloned()
    }

    /// Whether an identity is registered
    pub fn contains(&self, identity: &str) -> bool {
        self.operations.contains_key(identity)
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Registered identities
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for TaskCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCatalog")
            .field("identities", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = TaskCatalog::new();
        assert!(catalog.is_empty());

        catalog.register("task-a", || async { Ok(true) });
        catalog.register("task-b", || async { Ok(false) });

        assert!(catalog.contains("task-a"));
        assert!(!catalog.contains("unknown"));
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("task-a").is_some());
        assert!(catalog.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_registered_operation_runs() {
        let mut catalog = TaskCatalog::new();
        catalog.register("task-a", || async { Ok(true) });

        let operation = catalog.get("task-a").unwrap();
        assert!(operation().await.unwrap());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut catalog = TaskCatalog::new();
        catalog.register("task-a", || async { Ok(true) });
        catalog.register("task-a", || async { Ok(false) });
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_identities() {
        let mut catalog = TaskCatalog::new();
        catalog.register("task-a", || async { Ok(true) });

        let identities: Vec<_> = catalog.identities().collect();
        assert_eq!(identities, vec!["task-a"]);
    }
}
