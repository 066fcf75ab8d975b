//! Client and endpoint configuration.
//!
//! Every struct deserializes with per-field defaults, so a partial JSON
//! object such as `{"backoff": {"max_attempts": 5}}` is a complete
//! configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors from [`ClientConfig::validate`] and [`RateLimitConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The endpoint URL is empty.
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    /// `max_attempts` is zero, so no request would ever be sent.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// `base_delay_ms` is zero.
    #[error("base_delay_ms must be at least 1")]
    ZeroBaseDelay,

    /// `request_timeout_ms` is set to zero.
    #[error("request_timeout_ms must be at least 1 when set")]
    ZeroTimeout,

    /// `max_requests` is zero, so every request would be refused.
    #[error("max_requests must be at least 1")]
    ZeroRequests,

    /// `window_ms` is zero.
    #[error("window_ms must be at least 1")]
    ZeroWindow,
}

/// Exponential backoff policy for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,

    /// Wait before the second attempt, in milliseconds. Doubles for each
    /// attempt after that.
    pub base_delay_ms: u64,
}

impl BackoffConfig {
    /// Default total attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Default base delay in milliseconds.
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

    /// Wait after the failed attempt numbered `attempt` (0-based):
    /// `2^attempt * base_delay_ms`.
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: Self::DEFAULT_BASE_DELAY_MS,
        }
    }
}

/// Per-caller request limit enforced by the analysis endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests accepted from one caller within any window.
    pub max_requests: u32,

    /// Sliding window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitConfig {
    /// Default requests per window.
    pub const DEFAULT_MAX_REQUESTS: u32 = 10;
    /// Default window in milliseconds.
    pub const DEFAULT_WINDOW_MS: u64 = 60_000;

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Check the limit before building a limiter from it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroRequests);
        }
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: Self::DEFAULT_MAX_REQUESTS,
            window_ms: Self::DEFAULT_WINDOW_MS,
        }
    }
}

/// Settings for the analysis service client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL the analysis request is POSTed to.
    pub endpoint: String,

    /// Retry policy.
    pub backoff: BackoffConfig,

    /// Upper bound on a single attempt, in milliseconds.
    ///
    /// `None` leaves individual attempts unbounded.
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Default analysis endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:3000/api/analyze";

    /// Check the configuration before building a client from it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.backoff.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.backoff.base_delay_ms == 0 {
            return Err(ConfigError::ZeroBaseDelay);
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Per-attempt timeout, if one is configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::DEFAULT_ENDPOINT.to_owned(),
            backoff: BackoffConfig::default(),
            request_timeout_ms: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_base() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn delay_saturates() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn default_is_valid() {
        assert_eq!(ClientConfig::default().validate(), Ok(()));
        assert_eq!(ClientConfig::default().request_timeout(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"backoff": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(config.backoff.max_attempts, 5);
        assert_eq!(config.backoff.base_delay_ms, BackoffConfig::DEFAULT_BASE_DELAY_MS);
        assert_eq!(config.endpoint, ClientConfig::DEFAULT_ENDPOINT);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = |f: fn(&mut ClientConfig)| {
            let mut config = ClientConfig::default();
            f(&mut config);
            config.validate()
        };
        assert_eq!(bad(|c| c.endpoint = "  ".into()), Err(ConfigError::EmptyEndpoint));
        assert_eq!(bad(|c| c.backoff.max_attempts = 0), Err(ConfigError::ZeroAttempts));
        assert_eq!(bad(|c| c.backoff.base_delay_ms = 0), Err(ConfigError::ZeroBaseDelay));
        assert_eq!(bad(|c| c.request_timeout_ms = Some(0)), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn rate_limit_defaults_and_validation() {
        let config: RateLimitConfig = serde_json::from_str(r#"{"window_ms": 1000}"#).unwrap();
        assert_eq!(config.max_requests, RateLimitConfig::DEFAULT_MAX_REQUESTS);
        assert_eq!(config.window(), Duration::from_secs(1));
        assert_eq!(RateLimitConfig::default().validate(), Ok(()));

        let zero = RateLimitConfig {
            max_requests: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroRequests));
        let instant = RateLimitConfig {
            window_ms: 0,
            ..RateLimitConfig::default()
        };
        assert_eq!(instant.validate(), Err(ConfigError::ZeroWindow));
    }
}
