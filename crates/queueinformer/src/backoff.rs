//! # Exponential Backoff
//!
//! Delay before retrying a failed sync. Each consecutive failure doubles the
//! delay, starting at a base value and capped at a maximum so that a
//! permanently failing key keeps retrying at the ceiling instead of giving up.
//!
//! Sequence with a 5ms base and 1000s cap: 5ms, 10ms, 20ms, 40ms, ... 1000s (max).

use std::time::Duration;

/// Calculate the backoff for a given number of previous failures
///
/// Returns `base * 2^failures`, capped at `max`. Overflow saturates to `max`.
///
/// # Arguments
///
/// * `failures` - Number of failures before this one (0-indexed)
/// * `base` - Delay for the first failure
/// * `max` - Ceiling for the delay
#[must_use]
pub fn delay_for_failures(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures >= u32::BITS {
        return max;
    }
    base.checked_mul(1u32 << failures)
        .map_or(max, |delay| delay.min(max))
}
