//! Bounded exponential backoff for a rate-limited remote call.
//!
//! Only HTTP 429 and transport failures are retried. Every other
//! response, success or not, is handed straight back to the caller.
//!
//! The policy is split in two: [`RetryState`] is a small synchronous
//! state machine that decides what to do after each attempt, and
//! [`BackoffClient::call`] drives it, sleeping through a [`Sleeper`] so
//! tests can observe the waits without real time passing.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::BackoffConfig;

/// The status code that triggers a retry.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// A response that carries an HTTP-style status code.
pub trait HasStatus {
    /// The status code.
    fn status(&self) -> u16;
}

/// Asynchronous wait between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Terminal failure of [`BackoffClient::call`].
#[derive(Debug, thiserror::Error)]
pub enum BackoffError<E> {
    /// Every attempt was rate limited.
    #[error("rate limited on all {attempts} attempts")]
    RetryExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// The last attempt failed in transport; its error is passed through.
    #[error(transparent)]
    Request(E),
}

/// Returns `true` if an attempt that produced `status` should be retried.
///
/// `attempt` is 0-based; a retry is possible only while another attempt
/// fits within `max_attempts`.
#[must_use]
pub const fn should_retry(status: u16, attempt: u32, max_attempts: u32) -> bool {
    status == STATUS_TOO_MANY_REQUESTS && attempt.saturating_add(1) < max_attempts
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the response to the caller.
    Return,
    /// Wait, then make another attempt.
    RetryAfter(Duration),
    /// No attempts remain.
    GiveUp,
}

/// Progress through one bounded sequence of attempts.
#[derive(Debug)]
pub struct RetryState<E> {
    config: BackoffConfig,
    attempt: u32,
    last_error: Option<E>,
}

impl<E> RetryState<E> {
    /// Start before the first attempt.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
        }
    }

    /// 0-based number of the current attempt.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Error from the most recent failed attempt, if it failed in transport.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Record a response with `status` for the current attempt.
    pub fn on_status(&mut self, status: u16) -> Decision {
        self.last_error = None;
        if status != STATUS_TOO_MANY_REQUESTS {
            return Decision::Return;
        }
        self.next_step()
    }

    /// Record a transport failure for the current attempt.
    pub fn on_error(&mut self, error: E) -> Decision {
        self.last_error = Some(error);
        self.next_step()
    }

    /// Move on to the next attempt after a wait.
    pub const fn advance(&mut self) {
        self.attempt += 1;
    }

    /// The error to report once [`Decision::GiveUp`] was returned.
    #[must_use]
    pub fn into_error(self) -> BackoffError<E> {
        match self.last_error {
            Some(error) => BackoffError::Request(error),
            None => BackoffError::RetryExhausted {
                attempts: self.attempt.saturating_add(1),
            },
        }
    }

    fn next_step(&self) -> Decision {
        if should_retry(
            STATUS_TOO_MANY_REQUESTS,
            self.attempt,
            self.config.max_attempts,
        ) {
            Decision::RetryAfter(self.config.delay_for(self.attempt))
        } else {
            Decision::GiveUp
        }
    }
}

/// Runs a request under a [`BackoffConfig`].
#[derive(Debug, Clone)]
pub struct BackoffClient<S = TokioSleeper> {
    config: BackoffConfig,
    sleeper: S,
}

impl BackoffClient<TokioSleeper> {
    /// Client that sleeps on the tokio timer.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self::with_sleeper(config, TokioSleeper)
    }
}

impl<S: Sleeper> BackoffClient<S> {
    /// Client with a custom sleeper.
    #[must_use]
    pub const fn with_sleeper(config: BackoffConfig, sleeper: S) -> Self {
        Self { config, sleeper }
    }

    /// The retry policy.
    #[must_use]
    pub const fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// The sleeper used between attempts.
    #[must_use]
    pub const fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Call `request` until it yields a non-429 response or attempts run
    /// out. `request` receives the 0-based attempt number.
    ///
    /// A zero `max_attempts` is treated as one attempt.
    ///
    /// # Errors
    ///
    /// - [`BackoffError::RetryExhausted`] if the last attempt was rate
    ///   limited.
    /// - [`BackoffError::Request`] with the last transport error if the
    ///   last attempt failed in transport.
    pub async fn call<F, Fut, R, E>(&self, mut request: F) -> Result<R, BackoffError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        R: HasStatus,
        E: std::fmt::Display,
    {
        let config = BackoffConfig {
            max_attempts: self.config.max_attempts.max(1),
            ..self.config
        };
        let mut state = RetryState::new(config);

        loop {
            let attempt = state.attempt();
            let decision = match request(attempt).await {
                Ok(response) => {
                    let status = response.status();
                    match state.on_status(status) {
                        Decision::Return => {
                            debug!(attempt, status, "request completed");
                            return Ok(response);
                        }
                        other => {
                            warn!(attempt, status, "request rate limited");
                            other
                        }
                    }
                }
                Err(error) => {
                    warn!(attempt, %error, "request failed");
                    state.on_error(error)
                }
            };

            match decision {
                Decision::RetryAfter(delay) => {
                    debug!(attempt, delay_ms = delay.as_millis(), "backing off");
                    self.sleeper.sleep(delay).await;
                    state.advance();
                }
                Decision::GiveUp | Decision::Return => {
                    let attempts = attempt + 1;
                    error!(attempts, "giving up after final attempt");
                    return Err(state.into_error());
                }
            }
        }
    }
}
