//! Scheduler error types

/// Errors surfaced synchronously by the scheduler API
///
/// Task failures never appear here: a failing operation drives the retry
/// state machine instead of propagating to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Rejected pool reconfiguration
    #[error("invalid pool configuration: {0}")]
    InvalidPoolConfig(String),

    /// No operation registered in the catalog under this identity
    #[error("no task registered for identity: {0}")]
    UnknownTask(String),

    /// Scheduler already running
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// Scheduler not running
    #[error("scheduler is not running")]
    NotRunning,

    /// Shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}
