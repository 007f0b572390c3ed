//! Per-item rate limiting for the work queue.

use crate::backoff::delay_for_failures;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default delay after the first failure of a key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default ceiling for the delay of a permanently failing key.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Decides how long an item waits before it is re-queued after a failure.
pub trait RateLimiter<T>: Send + Sync {
    /// Records a failure for `item` and returns how long it should wait.
    fn when(&self, item: &T) -> Duration;

    /// Clears the failure history of `item`.
    fn forget(&self, item: &T);

    /// Number of failures recorded for `item` since it was last forgotten.
    fn num_requeues(&self, item: &T) -> u32;
}

/// Exponential per-item backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ItemExponentialRateLimiter<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T> ItemExponentialRateLimiter<T> {
    /// Creates a limiter with the given base delay and ceiling.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Default for ItemExponentialRateLimiter<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl<T> RateLimiter<T> for ItemExponentialRateLimiter<T>
where
    T: Eq + Hash + Clone + Send,
{
    fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(item.clone()).or_insert(0);
        let previous = *count;
        *count = count.saturating_add(1);
        delay_for_failures(previous, self.base, self.max)
    }

    fn forget(&self, item: &T) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}
