//! Deduplicating, rate-limited work queue.
//!
//! The queue tracks three sets of keys:
//! - `queue`: keys waiting to be handed out, in FIFO order
//! - `dirty`: keys that need processing (everything in `queue`, plus keys
//!   re-added while they were being processed)
//! - `processing`: keys currently held by a worker
//!
//! A key in `processing` is never handed out again until `done` is called for
//! it, which gives every key at most one in-flight sync across all workers.

use crate::ratelimiter::{ItemExponentialRateLimiter, RateLimiter};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    shutting_down: bool,
}

/// Work queue of keys needing reconciliation.
pub struct WorkQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    limiter: Box<dyn RateLimiter<T>>,
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + fmt::Debug + 'static,
{
    /// Creates a queue using the given rate limiter for `add_rate_limited`.
    pub fn new(name: impl Into<String>, limiter: impl RateLimiter<T> + 'static) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter: Box::new(limiter),
        }
    }

    /// Creates a queue with the default exponential per-item rate limiter.
    pub fn with_default_limiter(name: impl Into<String>) -> Self {
        Self::new(name, ItemExponentialRateLimiter::default())
    }

    /// Queue name, used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `item` as needing processing.
    ///
    /// No-op if the item is already waiting. If the item is currently being
    /// processed it is re-queued once `done` is called for it.
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down {
            trace!(queue = %self.name, ?item, "dropping add after shutdown");
            return;
        }
        if !state.dirty.insert(item.clone()) {
            return;
        }
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Adds `item` after `delay` has elapsed.
    ///
    /// The pending timer does not keep the queue alive; if the queue is gone
    /// or shut down when the timer fires the item is dropped.
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = queue.upgrade() {
                queue.add(item);
            }
        });
    }

    /// Adds `item` after the delay chosen by the rate limiter.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.limiter.when(&item);
        trace!(queue = %self.name, ?item, ?delay, "rate limited requeue");
        self.add_after(item, delay);
    }

    /// Clears the rate limiter history of `item`.
    pub fn forget(&self, item: &T) {
        self.limiter.forget(item);
    }

    /// Number of rate-limited requeues of `item` since it was last forgotten.
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.limiter.num_requeues(item)
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue has been shut down and drained. The
    /// returned item stays in the processing set until `done` is called.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting the state so a concurrent add or
            // shutdown cannot slip between the check and the wait.
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks `item` as no longer being processed.
    ///
    /// If the item was added again while it was processed, it is queued now.
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stops accepting new items. Blocked `get` calls return `None` once the
    /// remaining items are drained.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Whether `shut_down` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
