//! Scheduler and pool configuration
//!
//! Loaded once at startup; the scheduler never re-reads it. Live pool tuning
//! goes through [`crate::RetryScheduler::update_pool`] instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Per-tier worker pool configuration
///
/// Invariants (checked by [`PoolConfig::validate`]):
/// - `core_pool_size >= 1`
/// - `core_pool_size <= maximum_pool_size`
/// - `queue_capacity >= 1`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Resident worker count
    pub core_pool_size: usize,

    /// Upper bound on workers, including surplus workers added under load
    pub maximum_pool_size: usize,

    /// Idle time after which a surplus worker exits
    #[serde(with = "duration_millis")]
    pub keep_alive: Duration,

    /// Capacity ceiling of the pool's backing queue
    pub queue_capacity: usize,
}

impl PoolConfig {
    /// Create a pool configuration
    pub fn new(core_pool_size: usize, maximum_pool_size: usize) -> Self {
        Self {
            core_pool_size,
            maximum_pool_size,
            ..Default::default()
        }
    }

    /// Set the keep-alive time for surplus workers
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the queue capacity ceiling
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate the configuration invariants
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.core_pool_size == 0 {
            return Err(SchedulerError::InvalidPoolConfig(
                "core_pool_size must be at least 1".into(),
            ));
        }
        if self.core_pool_size > self.maximum_pool_size {
            return Err(SchedulerError::InvalidPoolConfig(format!(
                "core_pool_size {} exceeds maximum_pool_size {}",
                self.core_pool_size, self.maximum_pool_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(SchedulerError::InvalidPoolConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 2,
            maximum_pool_size: 4,
            keep_alive: Duration::from_secs(30),
            queue_capacity: 500,
        }
    }
}

/// Process-wide scheduler configuration
///
/// # Example
///
/// ```
/// use resched::SchedulerConfig;
/// use std::time::Duration;
///
/// let config = SchedulerConfig::default()
///     .with_max_retry_times(5)
///     .with_retry_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of retry firings before a task is abandoned
    pub max_retry_times: u32,

    /// Fixed delay between retry firings
    #[serde(with = "duration_millis")]
    pub retry_interval: Duration,

    /// Retry window; a task's deadline is first-failure time plus this
    #[serde(with = "duration_millis")]
    pub max_retry_interval: Duration,

    /// Pool handling tasks with short observed latency
    pub quick_pool: PoolConfig,

    /// Pool handling long tasks and tasks with no latency history
    pub standard_pool: PoolConfig,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retry_times: 3,
            retry_interval: Duration::from_secs(60),
            max_retry_interval: Duration::from_secs(600),
            quick_pool: PoolConfig::new(2, 4),
            standard_pool: PoolConfig::new(2, 5),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry attempt budget
    pub fn with_max_retry_times(mut self, max_retry_times: u32) -> Self {
        self.max_retry_times = max_retry_times;
        self
    }

    /// Set the fixed delay between retry firings
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the retry window used to compute task deadlines
    pub fn with_max_retry_interval(mut self, interval: Duration) -> Self {
        self.max_retry_interval = interval;
        self
    }

    /// Set the quick pool configuration
    pub fn with_quick_pool(mut self, pool: PoolConfig) -> Self {
        self.quick_pool = pool;
        self
    }

    /// Set the standard pool configuration
    pub fn with_standard_pool(mut self, pool: PoolConfig) -> Self {
        self.standard_pool = pool;
        self
    }

    /// Set the graceful shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration invariants
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.quick_pool.validate()?;
        self.standard_pool.validate()?;
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
