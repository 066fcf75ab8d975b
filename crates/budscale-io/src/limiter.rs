//! Per-caller sliding-window request limiting for the analysis endpoint.
//!
//! Each caller key keeps the instants of its accepted requests. A request
//! is accepted while fewer than `max_requests` of those fall inside the
//! trailing window; a refused request is not recorded, so a caller that
//! keeps retrying does not push its own window forward.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use web_time::Instant;

use crate::config::{ConfigError, RateLimitConfig};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// [`Clock`] reading the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A request refused because its caller used up the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit reached; next request accepted in {retry_after:?}")]
pub struct RateLimited {
    /// Time until the oldest recorded request leaves the window.
    pub retry_after: Duration,
}

/// Sliding-window limiter keyed by caller.
#[derive(Debug)]
pub struct RateLimiter<K, C = SystemClock> {
    config: RateLimitConfig,
    clock: C,
    seen: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash> RateLimiter<K, SystemClock> {
    /// Limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`RateLimitConfig::validate`].
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K: Eq + Hash, C: Clock> RateLimiter<K, C> {
    /// Limiter reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`RateLimitConfig::validate`].
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            seen: Mutex::new(HashMap::new()),
        })
    }

    /// The configured limit.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record a request from `key` if the window has room for it.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] if `key` already made `max_requests`
    /// requests within the window. Nothing is recorded in that case.
    pub fn check(&self, key: K) -> Result<(), RateLimited> {
        let now = self.clock.now();
        let window = self.config.window();
        let mut seen = self.seen.lock();
        let stamps = seen.entry(key).or_default();

        while stamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            stamps.pop_front();
        }

        let max = usize::try_from(self.config.max_requests).unwrap_or(usize::MAX);
        if stamps.len() >= max {
            let oldest = stamps.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
            warn!(recent = stamps.len(), ?retry_after, "caller rate limited");
            return Err(RateLimited { retry_after });
        }

        stamps.push_back(now);
        debug!(recent = stamps.len(), "request admitted");
        Ok(())
    }

    /// Drop callers with no request inside the window.
    ///
    /// Returns how many callers were forgotten.
    pub fn forget_idle(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window();
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) < window)
        });
        before - seen.len()
    }
}

/// [`Clock`] that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock(Mutex<Instant>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Instant::now()))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn limiter() -> (RateLimiter<&'static str, Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RateLimitConfig::default(), Arc::clone(&clock)).unwrap();
        (limiter, clock)
    }

    #[test]
    fn eleventh_request_in_window_is_refused() {
        let (limiter, clock) = limiter();
        for _ in 0..10 {
            limiter.check("10.0.0.1").unwrap();
            clock.advance(Duration::from_secs(1));
        }
        // First request was 10 s ago; it leaves the window in 50 s.
        assert_eq!(
            limiter.check("10.0.0.1"),
            Err(RateLimited {
                retry_after: Duration::from_secs(50)
            })
        );
    }

    #[test]
    fn window_slides() {
        let (limiter, clock) = limiter();
        for _ in 0..10 {
            limiter.check("10.0.0.1").unwrap();
        }
        clock.advance(Duration::from_millis(59_999));
        assert!(limiter.check("10.0.0.1").is_err());

        // Exactly one window after the burst, all ten have expired.
        clock.advance(Duration::from_millis(1));
        for _ in 0..10 {
            limiter.check("10.0.0.1").unwrap();
        }
        assert!(limiter.check("10.0.0.1").is_err());
    }

    #[test]
    fn window_frees_one_slot_per_expired_request() {
        let (limiter, clock) = limiter();
        limiter.check("a").unwrap();
        clock.advance(Duration::from_secs(30));
        for _ in 0..9 {
            limiter.check("a").unwrap();
        }
        assert!(limiter.check("a").is_err());

        clock.advance(Duration::from_secs(30));
        limiter.check("a").unwrap();
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn refused_requests_are_not_recorded() {
        let (limiter, clock) = limiter();
        for _ in 0..10 {
            limiter.check("a").unwrap();
        }
        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            assert!(limiter.check("a").is_err());
        }
        clock.advance(Duration::from_secs(10));
        limiter.check("a").unwrap();
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..10 {
            limiter.check("10.0.0.1").unwrap();
        }
        assert!(limiter.check("10.0.0.1").is_err());
        for _ in 0..10 {
            limiter.check("10.0.0.2").unwrap();
        }
        assert!(limiter.check("10.0.0.2").is_err());
    }

    #[test]
    fn forget_idle_drops_only_expired_callers() {
        let (limiter, clock) = limiter();
        limiter.check("old").unwrap();
        clock.advance(Duration::from_secs(45));
        limiter.check("recent").unwrap();
        clock.advance(Duration::from_secs(15));

        assert_eq!(limiter.forget_idle(), 1);
        assert_eq!(limiter.forget_idle(), 0);
        assert_eq!(limiter.seen.lock().len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RateLimitConfig {
            max_requests: 0,
            ..RateLimitConfig::default()
        };
        assert!(matches!(
            RateLimiter::<u32>::new(config),
            Err(ConfigError::ZeroRequests)
        ));
    }
}
