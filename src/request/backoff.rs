//! Retry policy and backoff delay calculation
//!
//! Provides the exponential backoff math used between retry attempts and the
//! non-blocking delay primitive used for both backoff and rate-limit waits.

use std::time::Duration;

/// Default number of retries after the initial attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for any single backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default multiplier applied per retry attempt
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Retry configuration for a single request
///
/// The total number of attempts is `max_retries + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied for each subsequent retry
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Computes the backoff delay for a zero-indexed retry attempt
///
/// Returns `min(base_delay * backoff_factor^attempt, max_delay)`. The first
/// retry uses `attempt = 0`. Intermediate overflow saturates to `max_delay`
/// and the result is never negative.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base_ms = policy.base_delay.as_millis() as f64;
    let max_ms = policy.max_delay.as_millis() as f64;

    let raw_ms = base_ms * policy.backoff_factor.powi(exponent);
    // f64::min ignores NaN, so a NaN product also lands on max_ms
    let capped_ms = raw_ms.min(max_ms).max(0.0);

    Duration::from_millis(capped_ms.round() as u64)
}

/// Suspends the current task for `duration` without blocking the runtime
///
/// A zero duration returns immediately without yielding.
pub async fn delay_for(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tracing::trace!(delay_ms = duration.as_millis() as u64, "sleeping");
    tokio::time::sleep(duration).await;
}
