//! Worker pools and their backing queues
//!
//! This module provides:
//! - [`WorkerPool`] - A resizable set of worker tasks draining a bounded queue
//! - [`BoundedResizableQueue`] - FIFO queue with a runtime-adjustable ceiling
//! - [`BlockingSaturationPolicy`] - Backpressure admission for full queues
//!
//! # Architecture
//!
//! ```text
//! execute(job) ──► try_push ──► ┌────────────────────────────┐
//!        │                      │   BoundedResizableQueue    │
//!        │ full                 │  (ceiling mutable at runtime)
//!        ▼                      └──────────────┬─────────────┘
//! BlockingSaturationPolicy                     │ pop
//!  (waits for a slot,                          ▼
//!   may add a surplus worker)   [worker 1] [worker 2] ... [worker N]
//!                               core workers resident; surplus workers
//!                               retire after keep_alive idle time
//! ```

mod pool;
mod queue;
mod saturation;

pub use pool::{Job, PoolState, PoolStatus, PoolUpdate, WorkerPool};
pub use queue::{BoundedResizableQueue, QueueFull};
pub use saturation::BlockingSaturationPolicy;
