//! Guaranteed cleanup for sweep execution.
//!
//! A sweep that fails partway must still disarm the controller and restore
//! its default routing - leaving it armed or mid-program corrupts the next
//! collection. Cleanup is therefore expressed as a registry of actions that
//! the sweep runner executes unconditionally after the sweep body, success
//! or failure, rather than as an error handler that a forgotten branch can
//! skip.
//!
//! Actions run in reverse registration order (LIFO), mirroring resource
//! acquisition order. Each action reports its own result; failures are
//! collected rather than short-circuiting, so a failed disarm does not stop
//! the routing reset behind it.

use crate::error::{AppResult, BeamlineError};
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

/// Type alias for async cleanup actions.
pub type AsyncCleanupFn =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = AppResult<()>> + Send>> + Send>;

/// Registry of cleanup actions for one sweep.
///
/// # Example
///
/// ```rust,ignore
/// let mut cleanup = CleanupRegistry::new();
/// cleanup.register("disarm", Box::new(move || {
///     let commands = commands.clone();
///     Box::pin(async move { send_disarm(&commands).await })
/// }));
///
/// let body_result = sweep_body().await;
/// let failures = cleanup.run_all().await; // always runs
/// ```
pub struct CleanupRegistry {
    actions: Vec<(String, AsyncCleanupFn)>,
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register a cleanup action. Actions run in reverse registration order.
    pub fn register(&mut self, name: impl Into<String>, action: AsyncCleanupFn) {
        self.actions.push((name.into(), action));
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action (LIFO), consuming the registry.
    ///
    /// Returns the failures in execution order; an empty vector means all
    /// cleanup succeeded.
    pub async fn run_all(mut self) -> Vec<(String, BeamlineError)> {
        let mut failures = Vec::new();
        while let Some((name, action)) = self.actions.pop() {
            info!(action = %name, "running cleanup");
            if let Err(error) = action().await {
                warn!(action = %name, %error, "cleanup action failed");
                failures.push((name, error));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_actions_run_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CleanupRegistry::new();

        for name in ["first", "second", "third"] {
            let order = order.clone();
            registry.register(
                name,
                Box::new(move || {
                    Box::pin(async move {
                        order.lock().unwrap().push(name);
                        Ok(())
                    })
                }),
            );
        }

        let failures = registry.run_all().await;
        assert!(failures.is_empty());
        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_remaining_actions() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = CleanupRegistry::new();

        let c = counter.clone();
        registry.register(
            "last",
            Box::new(move || {
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );
        registry.register(
            "failing",
            Box::new(|| {
                Box::pin(async {
                    Err(BeamlineError::hardware_io("PC:ARM", "write rejected"))
                })
            }),
        );

        let failures = registry.run_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "failing");
        // The action registered before the failing one still ran
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = CleanupRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
