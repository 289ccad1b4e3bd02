//! Retryable unit of work

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// A retryable operation
///
/// Returns `Ok(true)` on success and `Ok(false)` on failure; `Err` is treated
/// as failure (logged, still retried). Operations must be idempotent: the
/// scheduler guarantees at-least-once execution, not exactly-once.
pub type TaskOperation = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Box a closure into a [`TaskOperation`]
pub(crate) fn boxed_operation<F, Fut>(operation: F) -> TaskOperation
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    let operation: TaskOperation = Arc::new(move || Box::pin(operation()));
    operation
}

/// Verdict of a retry firing, decided before the operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickDecision {
    /// Budget and deadline allow another execution
    Execute,
    /// Attempt budget spent
    AttemptsExhausted,
    /// Deadline passed
    DeadlineExceeded,
}

/// A failed task registered for periodic re-execution
///
/// Created only on first execution failure. The attempt counter is owned here
/// and mutated solely by the registration's timer loop, so it needs no
/// synchronization.
pub(crate) struct RetryTask {
    pub identity: String,
    pub operation: TaskOperation,
    attempts: u32,
    max_retry_times: u32,
    deadline: Instant,
}

impl RetryTask {
    pub fn new(
        identity: String,
        operation: TaskOperation,
        max_retry_times: u32,
        deadline: Instant,
    ) -> Self {
        Self {
            identity,
            operation,
            attempts: 0,
            max_retry_times,
            deadline,
        }
    }

    /// Account for a firing and decide whether it may execute
    ///
    /// The attempt counter is incremented before any check. The budget check
    /// runs strictly before the deadline check, so when both have tripped the
    /// exhaustion verdict wins.
    pub fn begin_tick(&mut self) -> TickDecision {
        self.attempts += 1;
        if self.attempts > self.max_retry_times {
            TickDecision::AttemptsExhausted
        } else if Instant::now() > self.deadline {
            TickDecision::DeadlineExceeded
        } else {
            TickDecision::Execute
        }
    }

    /// Firings accounted so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
