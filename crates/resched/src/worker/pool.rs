//! Worker pool for task execution
//!
//! A set of tokio worker tasks draining a [`BoundedResizableQueue`]. Pool
//! parameters (core/maximum worker count, keep-alive, queue capacity) are
//! individually reconfigurable while workers are running.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::queue::{BoundedResizableQueue, QueueFull};
use super::saturation::BlockingSaturationPolicy;
use crate::classifier::Tier;
use crate::config::{option_duration_millis, PoolConfig};
use crate::error::SchedulerError;

/// Type-erased unit of work executed by a pool worker
pub type Job = BoxFuture<'static, ()>;

/// Pool lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Workers are draining the queue
    Running,
    /// Shutdown signaled, workers finishing in-flight jobs
    Draining,
    /// No workers alive
    Stopped,
}

/// Read-only snapshot of a pool's live parameters and occupancy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStatus {
    /// Pool tier
    pub tier: Tier,
    /// Resident worker count
    pub core_pool_size: usize,
    /// Worker count ceiling
    pub maximum_pool_size: usize,
    /// Surplus worker idle timeout, whole seconds
    pub keep_alive_secs: u64,
    /// Queue capacity ceiling
    pub queue_capacity: usize,
    /// Current queue occupancy
    pub queue_size: usize,
    /// Workers currently alive
    pub live_workers: usize,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: core_pool_size={}, maximum_pool_size={}, keep_alive={}s, \
             queue_capacity={}, queue_size={}",
            self.tier,
            self.core_pool_size,
            self.maximum_pool_size,
            self.keep_alive_secs,
            self.queue_capacity,
            self.queue_size
        )
    }
}

/// Partial pool reconfiguration
///
/// Only fields that are present are applied; absent fields leave the current
/// value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolUpdate {
    /// New resident worker count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_pool_size: Option<usize>,

    /// New worker count ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_pool_size: Option<usize>,

    /// New surplus worker idle timeout
    #[serde(default, with = "option_duration_millis")]
    pub keep_alive: Option<Duration>,

    /// New queue capacity ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

impl PoolUpdate {
    /// Create an empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resident worker count
    pub fn with_core_pool_size(mut self, size: usize) -> Self {
        self.core_pool_size = Some(size);
        self
    }

    /// Set the worker count ceiling
    pub fn with_maximum_pool_size(mut self, size: usize) -> Self {
        self.maximum_pool_size = Some(size);
        self
    }

    /// Set the surplus worker idle timeout
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Set the queue capacity ceiling
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }
}

/// Parameters and state shared with worker tasks
struct PoolShared {
    tier: Tier,
    queue: BoundedResizableQueue<Job>,
    core_pool_size: AtomicUsize,
    maximum_pool_size: AtomicUsize,
    keep_alive_millis: AtomicU64,
    live_workers: AtomicUsize,
    next_worker_id: AtomicUsize,
}

impl PoolShared {
    fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_millis.load(Ordering::Relaxed))
    }

    /// Reserve the right for an idle worker to exit
    ///
    /// Succeeds only while the live count exceeds the core size, so resident
    /// workers never retire on idle.
    fn try_retire(&self) -> bool {
        let core = self.core_pool_size.load(Ordering::Relaxed);
        let mut live = self.live_workers.load(Ordering::SeqCst);
        while live > core {
            match self.live_workers.compare_exchange(
                live,
                live - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(current) => live = current,
            }
        }
        false
    }
}

/// Worker pool executing type-erased jobs
///
/// Worker-count semantics follow the classic pool contract: `core_pool_size`
/// resident workers drain the queue; when a submission finds the queue full,
/// a surplus worker may be added up to `maximum_pool_size`; a surplus worker
/// that stays idle for `keep_alive` exits. When the queue refuses a job even
/// after growing, the [`BlockingSaturationPolicy`] stalls the submitter until
/// a slot frees; jobs are never dropped.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    saturation: BlockingSaturationPolicy,
    state: RwLock<PoolState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerPool {
    /// Create a pool for a tier; no workers run until [`start`](Self::start)
    pub fn new(tier: Tier, config: &PoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shared: Arc::new(PoolShared {
                tier,
                queue: BoundedResizableQueue::new(config.queue_capacity),
                core_pool_size: AtomicUsize::new(config.core_pool_size),
                maximum_pool_size: AtomicUsize::new(config.maximum_pool_size),
                keep_alive_millis: AtomicU64::new(config.keep_alive.as_millis() as u64),
                live_workers: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(0),
            }),
            saturation: BlockingSaturationPolicy,
            state: RwLock::new(PoolState::Stopped),
            workers: Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Pool tier
    pub fn tier(&self) -> Tier {
        self.shared.tier
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    /// Spawn the resident workers
    pub fn start(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.write();
            if *state == PoolState::Running {
                return Err(SchedulerError::AlreadyRunning);
            }
            *state = PoolState::Running;
        }

        let core = self.shared.core_pool_size.load(Ordering::Relaxed);
        info!(pool = %self.shared.tier, workers = core, "starting worker pool");
        for _ in 0..core {
            self.spawn_worker();
        }
        Ok(())
    }

    /// Enqueue a job for asynchronous execution
    ///
    /// Returns once the job is queued. Waits only when the queue is at
    /// capacity and cannot grow the worker set any further.
    pub async fn execute(&self, job: Job) {
        match self.shared.queue.try_push(job) {
            Ok(()) => {}
            Err(QueueFull(job)) => {
                self.try_spawn_surplus_worker();
                self.saturation
                    .admit(self.shared.tier, &self.shared.queue, job)
                    .await;
            }
        }
    }

    /// Apply a partial reconfiguration
    ///
    /// Each applied parameter is a single atomic assignment; readers never
    /// observe a torn value. A raised core size spawns workers immediately;
    /// a lowered one lets surplus workers retire through the keep-alive path.
    pub fn resize(&self, update: &PoolUpdate) -> Result<(), SchedulerError> {
        let candidate = PoolConfig {
            core_pool_size: update
                .core_pool_size
                .unwrap_or_else(|| self.shared.core_pool_size.load(Ordering::Relaxed)),
            maximum_pool_size: update
                .maximum_pool_size
                .unwrap_or_else(|| self.shared.maximum_pool_size.load(Ordering::Relaxed)),
            keep_alive: update.keep_alive.unwrap_or_else(|| self.shared.keep_alive()),
            queue_capacity: update
                .queue_capacity
                .unwrap_or_else(|| self.shared.queue.capacity()),
        };
        candidate.validate()?;

        self.shared
            .core_pool_size
            .store(candidate.core_pool_size, Ordering::Relaxed);
        self.shared
            .maximum_pool_size
            .store(candidate.maximum_pool_size, Ordering::Relaxed);
        self.shared
            .keep_alive_millis
            .store(candidate.keep_alive.as_millis() as u64, Ordering::Relaxed);
        self.shared.queue.set_capacity(candidate.queue_capacity);

        if *self.state.read() == PoolState::Running {
            while self.shared.live_workers.load(Ordering::SeqCst) < candidate.core_pool_size {
                self.spawn_worker();
            }
        }

        info!(pool = %self.shared.tier, status = %self.status(), "pool reconfigured");
        Ok(())
    }

    /// Read-only snapshot of live parameters and occupancy
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            tier: self.shared.tier,
            core_pool_size: self.shared.core_pool_size.load(Ordering::Relaxed),
            maximum_pool_size: self.shared.maximum_pool_size.load(Ordering::Relaxed),
            keep_alive_secs: self.shared.keep_alive().as_secs(),
            queue_capacity: self.shared.queue.capacity(),
            queue_size: self.shared.queue.len(),
            live_workers: self.shared.live_workers.load(Ordering::SeqCst),
        }
    }

    /// Signal shutdown and wait for workers to finish in-flight jobs
    ///
    /// Queued jobs that no worker has picked up are discarded.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.write();
            if *state == PoolState::Stopped {
                return Ok(());
            }
            *state = PoolState::Draining;
        }

        info!(pool = %self.shared.tier, "draining worker pool");
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let live = self.shared.live_workers.load(Ordering::SeqCst);
            if live == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(pool = %self.shared.tier, remaining = live, "shutdown timeout reached");
                return Err(SchedulerError::ShutdownTimeout);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let discarded = self.shared.queue.clear();
        if discarded > 0 {
            debug!(pool = %self.shared.tier, discarded, "discarded queued jobs on shutdown");
        }
        self.workers.lock().clear();
        *self.state.write() = PoolState::Stopped;
        info!(pool = %self.shared.tier, "worker pool stopped");
        Ok(())
    }

    fn spawn_worker(&self) {
        let worker = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        self.shared.live_workers.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(worker_loop(shared, shutdown_rx, worker));

        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.is_finished());
        workers.push(handle);
    }

    /// Grow beyond the core size in response to a full queue
    fn try_spawn_surplus_worker(&self) {
        if *self.state.read() != PoolState::Running {
            return;
        }
        let max = self.shared.maximum_pool_size.load(Ordering::Relaxed);
        let mut live = self.shared.live_workers.load(Ordering::SeqCst);
        while live < max {
            match self.shared.live_workers.compare_exchange(
                live,
                live + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let worker = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
                    debug!(pool = %self.shared.tier, worker, "adding surplus worker");
                    let shared = Arc::clone(&self.shared);
                    let shutdown_rx = self.shutdown_rx.clone();
                    let handle = tokio::spawn(worker_loop(shared, shutdown_rx, worker));
                    let mut workers = self.workers.lock();
                    workers.retain(|handle| !handle.is_finished());
                    workers.push(handle);
                    return;
                }
                Err(current) => live = current,
            }
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("tier", &self.shared.tier)
            .field("state", &*self.state.read())
            .field("status", &self.status())
            .finish()
    }
}

/// Body of a worker task
///
/// Workers pop and run jobs until shutdown. A worker that sits idle past the
/// keep-alive window exits if the pool is above its core size.
async fn worker_loop(shared: Arc<PoolShared>, mut shutdown_rx: watch::Receiver<bool>, worker: usize) {
    debug!(pool = %shared.tier, worker, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        // Any idle worker may time out and retire while the pool is above its
        // core size; at or below it, workers wait for work without a timeout.
        let may_retire = shared.live_workers.load(Ordering::SeqCst)
            > shared.core_pool_size.load(Ordering::Relaxed);
        let job = tokio::select! {
            job = shared.queue.pop(), if !may_retire => Some(job),
            polled = tokio::time::timeout(shared.keep_alive(), shared.queue.pop()), if may_retire => {
                polled.ok()
            }
            _ = shutdown_rx.changed() => break,
        };
        match job {
            Some(job) => job.await,
            None => {
                if shared.try_retire() {
                    debug!(pool = %shared.tier, worker, "idle surplus worker retiring");
                    return;
                }
            }
        }
    }
    shared.live_workers.fetch_sub(1, Ordering::SeqCst);
    debug!(pool = %shared.tier, worker, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn small_pool(core: usize, max: usize, queue_capacity: usize) -> WorkerPool {
        let config = PoolConfig::new(core, max)
            .with_keep_alive(Duration::from_millis(50))
            .with_queue_capacity(queue_capacity);
        WorkerPool::new(Tier::Quick, &config)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_executes_jobs() {
        let pool = small_pool(2, 2, 10);
        pool.start().unwrap();

        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let completed = Arc::clone(&completed);
            pool.execute(Box::pin(async move {
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        }

        wait_until(|| completed.load(Ordering::SeqCst) == 5).await;
        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let pool = small_pool(1, 1, 1);
        pool.start().unwrap();
        assert!(matches!(
            pool.start(),
            Err(SchedulerError::AlreadyRunning)
        ));
        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_queue_grows_surplus_worker() {
        let pool = small_pool(1, 2, 1);
        pool.start().unwrap();

        // Hold the single core worker on a gate so the queue backs up.
        let gate = Arc::new(tokio::sync::Notify::new());
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let gate = Arc::clone(&gate);
            let completed = Arc::clone(&completed);
            pool.execute(Box::pin(async move {
                gate.notified().await;
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        }
        wait_until(|| pool.status().queue_size == 0).await;

        // Fills the queue slot, then overflows it: a surplus worker appears.
        for _ in 0..2 {
            let completed = Arc::clone(&completed);
            pool.execute(Box::pin(async move {
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        }

        wait_until(|| pool.status().live_workers == 2).await;
        wait_until(|| completed.load(Ordering::SeqCst) == 2).await;

        gate.notify_one();
        wait_until(|| completed.load(Ordering::SeqCst) == 3).await;

        // After the keep-alive window the surplus worker retires.
        wait_until(|| pool.status().live_workers == 1).await;

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resize_applies_only_present_fields() {
        let pool = small_pool(1, 4, 10);
        pool.start().unwrap();

        pool.resize(&PoolUpdate::new().with_core_pool_size(2))
            .unwrap();

        let status = pool.status();
        assert_eq!(status.core_pool_size, 2);
        assert_eq!(status.maximum_pool_size, 4);
        assert_eq!(status.queue_capacity, 10);
        wait_until(|| pool.status().live_workers == 2).await;

        pool.resize(&PoolUpdate::new().with_queue_capacity(3)).unwrap();
        let status = pool.status();
        assert_eq!(status.core_pool_size, 2);
        assert_eq!(status.queue_capacity, 3);

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_resize_rejects_invalid() {
        let pool = small_pool(2, 4, 10);
        assert!(matches!(
            pool.resize(&PoolUpdate::new().with_maximum_pool_size(1)),
            Err(SchedulerError::InvalidPoolConfig(_))
        ));
        assert!(matches!(
            pool.resize(&PoolUpdate::new().with_queue_capacity(0)),
            Err(SchedulerError::InvalidPoolConfig(_))
        ));
        // Nothing was applied.
        let status = pool.status();
        assert_eq!(status.maximum_pool_size, 4);
        assert_eq!(status.queue_capacity, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_stops_workers() {
        let pool = small_pool(2, 4, 10);
        pool.start().unwrap();
        wait_until(|| pool.status().live_workers == 2).await;

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(pool.status().live_workers, 0);

        // A second shutdown is a no-op.
        pool.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[test]
    fn test_status_display_format() {
        let status = PoolStatus {
            tier: Tier::Standard,
            core_pool_size: 2,
            maximum_pool_size: 5,
            keep_alive_secs: 30,
            queue_capacity: 500,
            queue_size: 7,
            live_workers: 2,
        };
        assert_eq!(
            status.to_string(),
            "standard: core_pool_size=2, maximum_pool_size=5, keep_alive=30s, \
             queue_capacity=500, queue_size=7"
        );
    }

    #[test]
    fn test_pool_update_serde_partial() {
        let update: PoolUpdate =
            serde_json::from_str(r#"{"core_pool_size": 3, "keep_alive": 5000}"#).unwrap();
        assert_eq!(update.core_pool_size, Some(3));
        assert_eq!(update.keep_alive, Some(Duration::from_secs(5)));
        assert_eq!(update.maximum_pool_size, None);
        assert_eq!(update.queue_capacity, None);
    }
}
