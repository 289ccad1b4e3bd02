//! # resched
//!
//! An in-process retry scheduler for idempotent, boolean-returning work.
//!
//! ## Features
//!
//! - **Fire-and-forget submission**: failures never propagate to the caller;
//!   they drive a periodic retry state machine instead
//! - **Fixed-delay retries**: bounded by an attempt budget and a per-task
//!   deadline computed at first failure
//! - **Latency-tiered dispatch**: each task is routed to a "quick" or
//!   "standard" worker pool based on its last observed execution time
//! - **Backpressure, not loss**: a saturated pool blocks the submitter until
//!   a queue slot frees; nothing is dropped
//! - **Live reconfiguration**: pool worker counts, keep-alive, and queue
//!   capacity are adjustable at runtime, partially and atomically per field
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RetryScheduler                        │
//! │  (submission, retry registry, per-registration timer loops) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LatencyClassifier                      │
//! │     (last observed duration per identity picks a tier)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │   WorkerPool ("quick")   │   │   WorkerPool ("standard")    │
//! │  BoundedResizableQueue   │   │    BoundedResizableQueue     │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use resched::prelude::*;
//!
//! let scheduler = RetryScheduler::new(SchedulerConfig::default());
//! scheduler.start()?;
//!
//! scheduler.submit("orders.sync", || async {
//!     // Ok(true) = done; Ok(false) or Err = retry later
//!     Ok(push_pending_orders().await?)
//! }).await;
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::classifier::{LatencyClassifier, Tier};
    pub use crate::config::{PoolConfig, SchedulerConfig};
    pub use crate::error::SchedulerError;
    pub use crate::scheduler::{RetryScheduler, TaskCatalog, TaskOperation};
    pub use crate::worker::{PoolStatus, PoolUpdate};
}

// Re-export key types at crate root
pub use classifier::{LatencyClassifier, Tier};
pub use config::{PoolConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use scheduler::{RetryScheduler, TaskCatalog, TaskOperation};
pub use worker::{
    BlockingSaturationPolicy, BoundedResizableQueue, PoolState, PoolStatus, PoolUpdate, QueueFull,
    WorkerPool,
};
