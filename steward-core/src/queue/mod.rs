//! De-duplicating, delay-capable work queue.
//!
//! The queue coalesces repeated enqueues of one key into a single pending
//! unit of work and guarantees at most one in-flight worker per key: a key
//! added while it is being processed is marked dirty and re-queued when the
//! worker calls [`done`](WorkQueue::done), never run twice concurrently.

mod ratelimit;

pub use ratelimit::{RateLimiter, RateLimiterConfig};

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A de-duplicating work queue with delayed and rate-limited enqueue.
///
/// Cloning yields another handle to the same queue.
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    /// Wakes workers blocked in `get`.
    notify: Notify,
    shutting_down: AtomicBool,
    limiter: RateLimiter<T>,
}

struct Inner<T> {
    /// Pending items in FIFO order.
    queue: VecDeque<T>,
    /// Items needing processing: everything queued, plus items re-added
    /// while being processed.
    dirty: HashSet<T>,
    /// Items currently held by a worker.
    processing: HashSet<T>,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create a queue whose rate-limited adds follow `limiter_config`.
    pub fn new(limiter_config: RateLimiterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                }),
                notify: Notify::new(),
                shutting_down: AtomicBool::new(false),
                limiter: RateLimiter::new(limiter_config),
            }),
        }
    }

    /// Enqueue an item.
    ///
    /// No-op if the item is already pending. If the item is currently being
    /// processed it is marked dirty and will be re-queued by `done`, so every
    /// add during processing yields exactly one later re-run.
    pub fn add(&self, item: T) {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            tracing::trace!(?item, "queue shutting down, dropping add");
            return;
        }
        {
            let mut inner = self.shared.inner.lock();
            if inner.dirty.contains(&item) {
                return;
            }
            inner.dirty.insert(item.clone());
            if inner.processing.contains(&item) {
                tracing::trace!(?item, "item in flight, marked dirty");
                return;
            }
            inner.queue.push_back(item);
        }
        self.shared.notify.notify_one();
    }

    /// Schedule an enqueue after `delay`.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        tracing::trace!(?item, ?delay, "scheduling delayed add");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Enqueue after the item's exponential-backoff delay, recording one
    /// failure for it.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.shared.limiter.next_delay(&item);
        self.add_after(item, delay);
    }

    /// Reset the backoff state for an item after a successful run.
    pub fn forget(&self, item: &T) {
        self.shared.limiter.forget(item);
    }

    /// Consecutive failures recorded for an item.
    pub fn retries(&self, item: &T) -> u32 {
        self.shared.limiter.retries(item)
    }

    /// Wait for the next item, marking it as processing.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut inner = self.shared.inner.lock();
                if let Some(item) = inner.queue.pop_front() {
                    inner.dirty.remove(&item);
                    inner.processing.insert(item.clone());
                    tracing::trace!(?item, "dequeued item");
                    return Some(item);
                }
                if self.shared.shutting_down.load(Ordering::SeqCst) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark an item's processing finished.
    ///
    /// If the item went dirty while it was in flight, it is put straight back
    /// onto the queue.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut inner = self.shared.inner.lock();
            inner.processing.remove(item);
            if inner.dirty.contains(item) {
                inner.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            tracing::trace!(?item, "dirty item re-queued after processing");
            self.shared.notify.notify_one();
        }
    }

    /// Stop accepting work and wake all blocked `get` calls.
    ///
    /// Already-queued items are still handed out so workers can drain them;
    /// in-flight work is left to finish.
    pub fn shut_down(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Whether `shut_down` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Whether the queue has no pending items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items currently held by workers.
    pub fn processing_count(&self) -> usize {
        self.shared.inner.lock().processing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<&'static str> {
        WorkQueue::new(RateLimiterConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            jitter: 0.0,
        })
    }

    #[tokio::test]
    async fn adds_coalesce() {
        let queue = queue();
        queue.add("alpha");
        queue.add("alpha");
        queue.add("alpha");
        assert_eq!(queue.len(), 1);

        let item = queue.get().await.unwrap();
        assert_eq!(item, "alpha");
        queue.done(&item);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn add_during_processing_requeues_once() {
        let queue = queue();
        queue.add("alpha");
        let item = queue.get().await.unwrap();

        // re-adds while in flight collapse into one dirty mark
        queue.add("alpha");
        queue.add("alpha");
        assert_eq!(queue.len(), 0);

        queue.done(&item);
        assert_eq!(queue.len(), 1);
        let again = queue.get().await.unwrap();
        queue.done(&again);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn get_blocks_until_add() {
        let queue = queue();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.add("alpha");
        let item = waiter.await.unwrap();
        assert_eq!(item, Some("alpha"));
    }

    #[tokio::test]
    async fn add_after_delays_delivery() {
        let queue = queue();
        queue.add_after("alpha", Duration::from_millis(30));
        assert!(queue.is_empty());

        let item = queue.get().await.unwrap();
        assert_eq!(item, "alpha");
    }

    #[tokio::test]
    async fn rate_limited_adds_back_off_and_reset() {
        let queue = queue();
        queue.add_rate_limited("alpha");
        assert_eq!(queue.retries(&"alpha"), 1);
        queue.add_rate_limited("alpha");
        assert_eq!(queue.retries(&"alpha"), 2);

        queue.forget(&"alpha");
        assert_eq!(queue.retries(&"alpha"), 0);
    }

    #[tokio::test]
    async fn shutdown_drains_blocked_getters() {
        let queue = queue();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
        // adds after shutdown are dropped
        queue.add("alpha");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn shutdown_still_hands_out_queued_items() {
        let queue = queue();
        queue.add("alpha");
        queue.shut_down();

        assert_eq!(queue.get().await, Some("alpha"));
        queue.done(&"alpha");
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn concurrent_getters_each_receive_distinct_items() {
        let queue = queue();
        let a = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        let b = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.add("alpha");
        queue.add("beta");

        let mut seen = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        seen.sort_unstable();
        assert_eq!(seen, vec!["alpha", "beta"]);
    }
}
