//! Engine configuration.

use crate::queue::RateLimiterConfig;
use std::time::Duration;

/// Configuration for a controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of workers pulling keys from the queue. Each key is processed
    /// by at most one worker at a time regardless of this number.
    pub workers: usize,
    /// Backoff policy for failing keys.
    pub rate_limiter: RateLimiterConfig,
    /// Delay before relisting after a failed list or a lost watch feed.
    pub relist_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            rate_limiter: RateLimiterConfig::default(),
            relist_backoff: Duration::from_secs(1),
        }
    }
}

impl ControllerConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `STEWARD_WORKERS`: Number of reconcile workers
    /// - `STEWARD_BASE_DELAY_MS`: First retry delay in milliseconds
    /// - `STEWARD_MAX_DELAY_SECS`: Retry delay ceiling in seconds
    /// - `STEWARD_RELIST_BACKOFF_SECS`: Delay before relisting a lost watch
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let workers = std::env::var("STEWARD_WORKERS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|workers| *workers > 0)
            .unwrap_or(defaults.workers);

        let base_delay = std::env::var("STEWARD_BASE_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.rate_limiter.base_delay);

        let max_delay = std::env::var("STEWARD_MAX_DELAY_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.rate_limiter.max_delay);

        let relist_backoff = std::env::var("STEWARD_RELIST_BACKOFF_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.relist_backoff);

        Self {
            workers,
            rate_limiter: RateLimiterConfig {
                base_delay,
                max_delay,
                ..defaults.rate_limiter
            },
            relist_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ControllerConfig::default();
        assert!(config.workers >= 1);
        assert!(config.rate_limiter.base_delay < config.rate_limiter.max_delay);
    }
}
