//! Shared call-rate limiting for the Crossref API.
//!
//! Uses the governor crate. A quota of `max_calls` per `window` is expressed
//! as a single-token bucket refilled every `window / max_calls`, so calls are
//! spaced evenly and no window ever admits more than `max_calls`.
//! Every clone of a [`RateLimiter`] draws from the same bucket, so handing
//! one handle to several clients gives them a single process-wide budget.

use crate::error::{CrossrefError, Result};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::sync::Arc;
use std::time::Duration;

/// Default number of calls allowed per window
pub const DEFAULT_MAX_CALLS: u32 = 15;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum number of calls per window
    pub max_calls: u32,
    /// Length of the window
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    /// `max_calls` per second
    pub fn per_second(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }
}

/// Shared evenly-spacing rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Result<Self> {
        if config.max_calls == 0 {
            return Err(CrossrefError::Config("rate limit must allow at least one call".into()));
        }
        let period = config.window / config.max_calls;
        let quota = Quota::with_period(period)
            .ok_or_else(|| CrossrefError::Config(format!("invalid rate limit window {:?}", config.window)))?;

        Ok(Self {
            limiter: Arc::new(Governor::direct(quota)),
        })
    }

    /// Suspend until a call may be made. Never fails.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to take a permit without waiting
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_config_default() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_calls, 15);
        assert_eq!(config.window, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_calls_rejected() {
        let result = RateLimiter::new(&RateLimiterConfig::per_second(0));
        assert!(matches!(result, Err(CrossrefError::Config(_))));
    }

    #[test]
    fn test_no_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(3, Duration::from_secs(60))).unwrap();
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_clones_share_budget() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(2, Duration::from_secs(60))).unwrap();
        let other = limiter.clone();
        assert!(limiter.try_acquire());
        assert!(!other.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_wait_spaces_calls() {
        let limiter =
            RateLimiter::new(&RateLimiterConfig::new(2, Duration::from_millis(200))).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        // Second and third calls each wait one period (200ms / 2)
        assert!(start.elapsed() >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_default_admits_at_most_max_calls_per_window() {
        let config = RateLimiterConfig::default();
        let limiter = RateLimiter::new(&config).unwrap();
        let start = Instant::now();
        let mut admitted = 0;
        loop {
            limiter.wait().await;
            if start.elapsed() >= config.window {
                break;
            }
            admitted += 1;
        }
        assert!(admitted <= DEFAULT_MAX_CALLS, "admitted {} calls in one window", admitted);
    }
}
