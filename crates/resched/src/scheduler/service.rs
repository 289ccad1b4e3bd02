//! The retry scheduler service
//!
//! Orchestrates submission, tier routing, failure registration, and the
//! periodic retry loops. One constructed instance per process (or per test);
//! clone the handle to share it.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::catalog::TaskCatalog;
use super::registry::{Registration, RetryRegistry};
use super::task::{boxed_operation, RetryTask, TaskOperation, TickDecision};
use crate::classifier::{LatencyClassifier, Tier};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::worker::{Job, PoolStatus, PoolUpdate, WorkerPool};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Running,
    Stopped,
}

struct SchedulerInner {
    config: SchedulerConfig,
    catalog: TaskCatalog,
    classifier: LatencyClassifier,
    quick_pool: WorkerPool,
    standard_pool: WorkerPool,
    registry: RetryRegistry,
    state: RwLock<SchedulerState>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

/// Retry scheduler
///
/// Accepts idempotent, boolean-returning operations, executes them on a
/// latency-matched worker pool, and re-queues failures onto a fixed-delay
/// retry timeline until success, budget exhaustion, or deadline expiry.
///
/// # Example
///
/// ```ignore
/// use resched::{RetryScheduler, SchedulerConfig};
///
/// let scheduler = RetryScheduler::new(SchedulerConfig::default());
/// scheduler.start()?;
///
/// scheduler.submit("orders.sync", || async {
///     // returns Ok(true) on success, Ok(false) to request a retry
///     Ok(push_pending_orders().await?)
/// }).await;
///
/// // ... later
/// scheduler.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

impl RetryScheduler {
    /// Create a scheduler with an empty task catalog
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_catalog(config, TaskCatalog::new())
    }

    /// Create a scheduler with a pre-populated task catalog
    pub fn with_catalog(config: SchedulerConfig, catalog: TaskCatalog) -> Self {
        let quick_pool = WorkerPool::new(Tier::Quick, &config.quick_pool);
        let standard_pool = WorkerPool::new(Tier::Standard, &config.standard_pool);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                catalog,
                classifier: LatencyClassifier::new(),
                quick_pool,
                standard_pool,
                registry: RetryRegistry::new(),
                state: RwLock::new(SchedulerState::Stopped),
                started_at: RwLock::new(None),
            }),
        }
    }

    /// Validate configuration and spawn the worker pools
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.inner.config.validate()?;
        {
            let mut state = self.inner.state.write();
            if *state == SchedulerState::Running {
                return Err(SchedulerError::AlreadyRunning);
            }
            *state = SchedulerState::Running;
        }

        self.inner.quick_pool.start()?;
        self.inner.standard_pool.start()?;
        *self.inner.started_at.write() = Some(Utc::now());

        info!(
            max_retry_times = self.inner.config.max_retry_times,
            retry_interval_ms = self.inner.config.retry_interval.as_millis() as u64,
            max_retry_interval_ms = self.inner.config.max_retry_interval.as_millis() as u64,
            "retry scheduler started"
        );
        Ok(())
    }

    /// Shut down gracefully: cancel retry registrations, drain the pools
    ///
    /// In-flight executions finish; pending retries are dropped (they are not
    /// persisted anywhere).
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.inner.state.write();
            if *state == SchedulerState::Stopped {
                return Ok(());
            }
            *state = SchedulerState::Stopped;
        }

        info!("shutting down retry scheduler");
        let registrations = self.inner.registry.drain();
        for (identity, registration) in &registrations {
            registration.cancel(identity);
        }

        let timeout = self.inner.config.shutdown_timeout;
        let quick = self.inner.quick_pool.shutdown(timeout).await;
        let standard = self.inner.standard_pool.shutdown(timeout).await;

        // Timer loops blocked in a dispatch that will never complete (their
        // pool is gone) are torn down here; this cannot interrupt operation
        // executions, which ran on the now-drained pools.
        for (_, registration) in &registrations {
            registration.abort();
        }

        quick?;
        standard?;
        info!("retry scheduler stopped");
        Ok(())
    }

    /// Whether the scheduler is running
    pub fn is_running(&self) -> bool {
        *self.inner.state.read() == SchedulerState::Running
    }

    /// When the scheduler was last started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.started_at.read()
    }

    /// Submit an operation for asynchronous execution
    ///
    /// Fire-and-forget: the result never propagates to the caller. On failure
    /// (`Ok(false)` or `Err`) the operation is registered for periodic retry
    /// under `identity`. The call itself waits only when the target pool is
    /// saturated: backpressure instead of loss.
    pub async fn submit<F, Fut>(&self, identity: impl Into<String>, operation: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.submit_operation(identity.into(), boxed_operation(operation))
            .await;
    }

    /// Submit a catalog task by identity
    pub async fn trigger(&self, identity: &str) -> Result<(), SchedulerError> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        let operation = self
            .inner
            .catalog
            .get(identity)
            .ok_or_else(|| SchedulerError::UnknownTask(identity.to_string()))?;
        self.submit_operation(identity.to_string(), operation).await;
        Ok(())
    }

    /// The tier the next submission of this identity would be routed to
    pub fn planned_tier(&self, identity: &str) -> Tier {
        self.inner.classifier.classify(identity)
    }

    /// Whether an identity currently has a live retry registration
    pub fn has_live_registration(&self, identity: &str) -> bool {
        self.inner.registry.contains(identity)
    }

    /// Number of live retry registrations
    pub fn live_registrations(&self) -> usize {
        self.inner.registry.len()
    }

    /// Snapshot of one pool's live parameters and occupancy
    pub fn pool_status(&self, tier: Tier) -> PoolStatus {
        self.inner.pool(tier).status()
    }

    /// Snapshots of all pools, in tier order
    pub fn all_pool_statuses(&self) -> Vec<PoolStatus> {
        Tier::ALL
            .iter()
            .map(|tier| self.inner.pool(*tier).status())
            .collect()
    }

    /// Apply a partial reconfiguration to one pool
    ///
    /// Only present fields are applied. Returns the post-update status of all
    /// pools. Invalid updates are rejected without applying anything.
    pub fn update_pool(
        &self,
        tier: Tier,
        update: &PoolUpdate,
    ) -> Result<Vec<PoolStatus>, SchedulerError> {
        self.inner.pool(tier).resize(update)?;

        let statuses = self.all_pool_statuses();
        let report = statuses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        info!(pool = %tier, "pool updated, all pool info:\n{report}");
        Ok(statuses)
    }

    async fn submit_operation(&self, identity: String, operation: TaskOperation) {
        if !self.is_running() {
            warn!(task_id = %identity, "submission ignored: scheduler not running");
            return;
        }

        let tier = self.inner.classifier.classify(&identity);
        debug!(task_id = %identity, pool = %tier, "dispatching task");

        let inner = Arc::clone(&self.inner);
        let job: Job = Box::pin(async move {
            inner.run_initial(identity, operation).await;
        });
        self.inner.pool(tier).execute(job).await;
    }
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("state", &*self.inner.state.read())
            .field("live_registrations", &self.inner.registry.len())
            .finish()
    }
}

impl SchedulerInner {
    fn pool(&self, tier: Tier) -> &WorkerPool {
        match tier {
            Tier::Quick => &self.quick_pool,
            Tier::Standard => &self.standard_pool,
        }
    }

    /// First execution of a submission, on a pool worker
    async fn run_initial(self: Arc<Self>, identity: String, operation: TaskOperation) {
        info!(task_id = %identity, "task start");
        let started = Instant::now();
        let outcome = operation().await;
        self.classifier
            .record(&identity, started.elapsed().as_secs());

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                info!(task_id = %identity, "task failed, scheduling retry");
                Arc::clone(&self).register_retry(identity.clone(), operation);
            }
            Err(error) => {
                error!(task_id = %identity, error = %error, "task failed with error, scheduling retry");
                Arc::clone(&self).register_retry(identity.clone(), operation);
            }
        }
        info!(task_id = %identity, "task finish");
    }

    /// Register a failed task for periodic retry; duplicate registrations
    /// for an identity already retrying are rejected inside the registry
    fn register_retry(self: Arc<Self>, identity: String, operation: TaskOperation) {
        // Deadline derives from the configuration in force right now; later
        // reconfiguration never moves it.
        let deadline = Instant::now() + self.config.max_retry_interval;
        let task = RetryTask::new(
            identity.clone(),
            operation,
            self.config.max_retry_times,
            deadline,
        );

        let registered = self.registry.register_with(&identity, || {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let handle = tokio::spawn(Arc::clone(&self).retry_loop(task, cancel_rx));
            Registration::new(cancel_tx, handle)
        });
        if registered {
            info!(task_id = %identity, "registered for periodic retry");
        }
    }

    /// One registration's timer loop: fixed-delay firings until a terminal
    /// transition
    ///
    /// The delay restarts only after a firing fully completes, so a slow
    /// retry self-throttles instead of stacking executions.
    async fn retry_loop(
        self: Arc<Self>,
        mut task: RetryTask,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval) => {}
                _ = cancel_rx.changed() => {
                    debug!(task_id = %task.identity, "retry registration cancelled");
                    return;
                }
            }

            match task.begin_tick() {
                TickDecision::AttemptsExhausted => {
                    error!(
                        task_id = %task.identity,
                        attempts = task.attempts(),
                        "retry budget exhausted, abandoning task"
                    );
                    self.registry.remove(&task.identity);
                    return;
                }
                TickDecision::DeadlineExceeded => {
                    error!(task_id = %task.identity, "retry deadline exceeded, abandoning task");
                    self.registry.remove(&task.identity);
                    return;
                }
                TickDecision::Execute => {
                    info!(task_id = %task.identity, attempt = task.attempts(), "task retry");
                    if Arc::clone(&self).dispatch_retry(&task).await {
                        info!(task_id = %task.identity, "task recovered, retiring registration");
                        self.registry.remove(&task.identity);
                        return;
                    }
                }
            }

            // A cancellation that landed during the execution forecloses the
            // next firing but never the one in flight.
            if *cancel_rx.borrow() {
                debug!(task_id = %task.identity, "retry registration cancelled");
                return;
            }
        }
    }

    /// Re-execute a task through its latency-matched pool; true on success
    async fn dispatch_retry(self: Arc<Self>, task: &RetryTask) -> bool {
        let tier = self.classifier.classify(&task.identity);
        let (result_tx, result_rx) = oneshot::channel();

        let inner = Arc::clone(&self);
        let identity = task.identity.clone();
        let operation = task.operation.clone();
        let job: Job = Box::pin(async move {
            let started = Instant::now();
            let outcome = operation().await;
            inner
                .classifier
                .record(&identity, started.elapsed().as_secs());

            let succeeded = match outcome {
                Ok(result) => result,
                Err(error) => {
                    error!(task_id = %identity, error = %error, "task retry failed with error");
                    false
                }
            };
            let _ = result_tx.send(succeeded);
        });

        self.pool(tier).execute(job).await;
        match result_rx.await {
            Ok(succeeded) => succeeded,
            Err(_) => {
                warn!(task_id = %task.identity, "retry execution dropped before completing");
                false
            }
        }
    }
}
