//! Latency-based tier classification
//!
//! Routes each submission to a worker pool sized for its latency class, based
//! on the task's most recent observed execution time.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Execution-time boundary between the quick and standard tiers, in seconds
pub const QUICK_TASK_MAX_SECS: u64 = 10;

/// Duration assumed for a task with no recorded history, in seconds
///
/// Deliberately above [`QUICK_TASK_MAX_SECS`] so first runs land on the
/// standard pool: a task is assumed long until proven short.
const DEFAULT_DURATION_SECS: u64 = 100;

/// Worker pool tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Small pool with a low latency target
    Quick,
    /// Larger pool tolerating long tasks
    Standard,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quick => write!(f, "quick"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

impl Tier {
    /// Both tiers, in display order
    pub const ALL: [Tier; 2] = [Tier::Quick, Tier::Standard];
}

/// Last-observed execution duration per task identity
///
/// `record` overwrites rather than averages, so classification reacts to a
/// task's most recent behavior immediately, regressions included.
#[derive(Debug, Default)]
pub struct LatencyClassifier {
    durations: DashMap<String, u64>,
}

impl LatencyClassifier {
    /// Create an empty classifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the tier for an identity from its last recorded duration
    pub fn classify(&self, identity: &str) -> Tier {
        let secs = self
            .durations
            .get(identity)
            .map(|entry| *entry.value())
            .unwrap_or(DEFAULT_DURATION_SECS);
        if secs <= QUICK_TASK_MAX_SECS {
            Tier::Quick
        } else {
            Tier::Standard
        }
    }

    /// Record the elapsed wall-clock seconds of an execution attempt
    ///
    /// Called after every attempt, successful or not.
    pub fn record(&self, identity: &str, duration_secs: u64) {
        self.durations.insert(identity.to_string(), duration_secs);
    }

    /// Last recorded duration for an identity, if any
    pub fn last_duration_secs(&self, identity: &str) -> Option<u64> {
        self.durations.get(identity).map(|entry| *entry.value())
    }
}
