//! Bounded FIFO queue with a runtime-adjustable capacity ceiling
//!
//! Backing store for worker pools. The ceiling applies prospectively: shrinking
//! it never evicts queued items, it only gates subsequent enqueues.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Error returned by [`BoundedResizableQueue::try_push`] when the queue is at
/// capacity. Carries the rejected item back to the caller.
pub struct QueueFull<T>(pub T);

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is at capacity")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Bounded FIFO queue whose capacity ceiling can change while producers and
/// consumers are active
///
/// A single mutex guards both the items and the ceiling, so a capacity change
/// is atomic with respect to concurrent `push`/`pop`. Waiting is done through
/// [`Notify`] so blocked producers (queue full) and consumers (queue empty)
/// park without spinning.
pub struct BoundedResizableQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Notify,
    not_empty: Notify,
}

impl<T> BoundedResizableQueue<T> {
    /// Create a queue with the given capacity ceiling (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                capacity: capacity.max(1),
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Enqueue an item, waiting while the queue is at capacity
    pub async fn push(&self, item: T) {
        let notified = self.not_full.notified();
        tokio::pin!(notified);
        loop {
            // Register interest before checking, so a `pop` that frees a slot
            // between the check and the await still wakes us.
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if inner.items.len() < inner.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return;
                }
            }
            notified.as_mut().await;
            notified.set(self.not_full.notified());
        }
    }

    /// Enqueue an item if a slot is free, returning it in [`QueueFull`]
    /// otherwise
    pub fn try_push(&self, item: T) -> Result<(), QueueFull<T>> {
        let mut inner = self.inner.lock();
        if inner.items.len() >= inner.capacity {
            return Err(QueueFull(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest item, waiting while the queue is empty
    pub async fn pop(&self) -> T {
        let notified = self.not_empty.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return item;
                }
            }
            notified.as_mut().await;
            notified.set(self.not_empty.notified());
        }
    }

    /// Change the capacity ceiling (minimum 1)
    ///
    /// Already-queued items are never dropped; the new ceiling gates
    /// subsequent `push` calls only.
    pub fn set_capacity(&self, capacity: usize) {
        {
            let mut inner = self.inner.lock();
            inner.capacity = capacity.max(1);
        }
        // Wake every waiting producer; each re-checks against the new ceiling.
        self.not_full.notify_waiters();
    }

    /// Drop every queued item, returning how many were discarded
    ///
    /// Frees waiting producers to re-check occupancy.
    pub fn clear(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            let discarded = inner.items.len();
            inner.items.clear();
            discarded
        };
        self.not_full.notify_waiters();
        discarded
    }

    /// Current capacity ceiling
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl<T> fmt::Debug for BoundedResizableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BoundedResizableQueue")
            .field("len", &inner.items.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = BoundedResizableQueue::new(10);
        queue.push(1).await;
        queue.push(2).await;
        queue.push(3).await;

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().await, 1);
        assert_eq!(queue.pop().await, 2);
        assert_eq!(queue.pop().await, 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_try_push_full_returns_item() {
        let queue = BoundedResizableQueue::new(2);
        queue.try_push("a").unwrap();
        queue.try_push("b").unwrap();

        let rejected = queue.try_push("c").unwrap_err();
        assert_eq!(rejected.0, "c");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_push_blocks_until_pop() {
        let queue = Arc::new(BoundedResizableQueue::new(1));
        queue.push(1).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };

        // The producer cannot finish while the queue is full.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.pop().await, 1);
        producer.await.unwrap();
        assert_eq!(queue.pop().await, 2);
    }

    #[tokio::test]
    async fn test_pop_blocks_until_push() {
        let queue = Arc::new(BoundedResizableQueue::new(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.push(42).await;
        assert_eq!(consumer.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_shrink_keeps_existing_items() {
        let queue = BoundedResizableQueue::new(10);
        for i in 0..5 {
            queue.push(i).await;
        }

        queue.set_capacity(2);
        assert_eq!(queue.capacity(), 2);
        // The 5 queued items survive the shrink.
        assert_eq!(queue.len(), 5);
        // But no new item fits until occupancy drops below the new ceiling.
        assert!(queue.try_push(99).is_err());

        for i in 0..4 {
            assert_eq!(queue.pop().await, i);
        }
        assert_eq!(queue.len(), 1);
        queue.try_push(99).unwrap();
        assert!(queue.try_push(100).is_err());
    }

    #[tokio::test]
    async fn test_grow_unblocks_waiting_producer() {
        let queue = Arc::new(BoundedResizableQueue::new(1));
        queue.push(1).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        queue.set_capacity(2);
        producer.await.unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_discards_items_and_frees_producers() {
        let queue = Arc::new(BoundedResizableQueue::new(2));
        queue.push(1).await;
        queue.push(2).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(3).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.clear(), 2);
        producer.await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().await, 3);
    }

    #[tokio::test]
    async fn test_capacity_floor_is_one() {
        let queue: BoundedResizableQueue<u32> = BoundedResizableQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.set_capacity(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_and_consumers() {
        let queue = Arc::new(BoundedResizableQueue::new(4));
        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    queue.push(p * 100 + i).await;
                }
            }));
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut seen = 0usize;
                while seen < 100 {
                    queue.pop().await;
                    seen += 1;
                }
                seen
            })
        };

        for producer in producers {
            producer.await.unwrap();
        }
        assert_eq!(consumer.await.unwrap(), 100);
        assert!(queue.is_empty());
    }
}
