//! Admission control for saturated pools
//!
//! Submissions originate from internal triggers (first executions and retry
//! firings), where silently dropping work is worse than slowing the producer.
//! So saturation is not an error: the submitter waits for a slot instead.

use tracing::debug;

use super::queue::BoundedResizableQueue;
use crate::classifier::Tier;

/// Blocking admission policy
///
/// When a pool's queue refuses a job, `admit` performs a waiting insert into
/// that same queue, converting saturation into backpressure on the submitting
/// task. The wait is unbounded; callers that need an upper bound can wrap
/// [`admit`](BlockingSaturationPolicy::admit) in `tokio::time::timeout`.
#[derive(Debug, Default)]
pub struct BlockingSaturationPolicy;

impl BlockingSaturationPolicy {
    /// Wait until the queue accepts the item
    pub async fn admit<T>(&self, tier: Tier, queue: &BoundedResizableQueue<T>, item: T) {
        debug!(pool = %tier, "pool saturated, blocking submission until a slot frees");
        queue.push(item).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_admit_waits_for_slot() {
        let queue = Arc::new(BoundedResizableQueue::new(1));
        queue.push(1u32).await;

        let admission = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                BlockingSaturationPolicy
                    .admit(Tier::Quick, &queue, 2)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!admission.is_finished());

        assert_eq!(queue.pop().await, 1);
        admission.await.unwrap();
        assert_eq!(queue.pop().await, 2);
    }
}
