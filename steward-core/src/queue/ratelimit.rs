//! Per-item exponential backoff.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Configuration for the per-item rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Delay for the first retry.
    pub base_delay: Duration,
    /// Ceiling on the computed delay; a stuck item backs off to this and
    /// keeps trying.
    pub max_delay: Duration,
    /// Extra random fraction added to each delay (0.1 = up to 10% more), to
    /// spread retries of items that failed together.
    pub jitter: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            jitter: 0.1,
        }
    }
}

/// Exponential backoff keyed by consecutive-failure count per item.
///
/// Each call to [`next_delay`](RateLimiter::next_delay) records one failure
/// and returns `base * 2^failures`, capped at the configured maximum.
/// [`forget`](RateLimiter::forget) resets an item after success.
pub struct RateLimiter<T> {
    config: RateLimiterConfig,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T: Hash + Eq + Clone> RateLimiter<T> {
    /// Create a rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `item` and return the delay before its next
    /// attempt.
    pub fn next_delay(&self, item: &T) -> Duration {
        let exponent = {
            let mut failures = self.failures.lock();
            let count = failures.entry(item.clone()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };

        let base = self.config.base_delay.as_secs_f64();
        let capped = (base * 2f64.powi(exponent.min(62) as i32))
            .min(self.config.max_delay.as_secs_f64());
        let jittered = if self.config.jitter > 0.0 {
            capped * (1.0 + rand::random::<f64>() * self.config.jitter)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.min(self.config.max_delay.as_secs_f64()))
    }

    /// Reset the failure count for `item`.
    pub fn forget(&self, item: &T) {
        self.failures.lock().remove(item);
    }

    /// Consecutive failures recorded for `item`.
    pub fn retries(&self, item: &T) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}
