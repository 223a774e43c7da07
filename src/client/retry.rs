//! Bounded retry with exponential backoff.
//!
//! Only transport errors ([`ApiError::Network`]) are retried. HTTP errors,
//! `401` included, are returned after the first attempt so the API client
//! can apply its own policy.
//!
//! # Backoff
//!
//! After a failed attempt with `remaining` attempts left (the failed one
//! included) the engine waits
//!
//! ```text
//! backoff_factor ^ (max_attempts + 1 - remaining) * base_delay
//! ```
//!
//! With the defaults (3 attempts, factor 2, 1 s) that is 2 s before the
//! second attempt and 4 s before the third.
//!
//! # Cancellation
//!
//! A fired [`CancellationToken`] aborts the attempt in flight, interrupts a
//! backoff sleep and suppresses any further attempt.

use crate::client::config::ClientConfig;
use crate::error::{ApiError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made when retries are enabled
    pub max_attempts: u32,
    /// Growth factor between consecutive delays
    pub backoff_factor: u32,
    /// Delay unit
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    /// Take retry parameters from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_factor: config.backoff_factor,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before the next attempt, given the attempts left including the
    /// one that just failed.
    pub fn delay_for(&self, remaining: u32) -> Duration {
        let exponent = (self.max_attempts + 1).saturating_sub(remaining);
        self.base_delay
            .saturating_mul(self.backoff_factor.saturating_pow(exponent))
    }
}

/// Run `attempt` up to `attempts` times.
///
/// `attempt` performs one network call and decodes its response.
pub async fn send_with_retry<T, F, Fut>(
    mut attempt: F,
    attempts: u32,
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    enable_logging: bool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = attempts.max(1);
    let mut attempt_no = 1;

    loop {
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::network("request cancelled")),
                result = attempt() => result,
            },
            None => attempt().await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let cancelled = cancel.is_some_and(CancellationToken::is_cancelled);
        if !err.is_retryable() || remaining <= 1 || cancelled {
            return Err(err);
        }

        let delay = policy.delay_for(remaining);
        if enable_logging {
            tracing::warn!(
                attempt = attempt_no,
                remaining = remaining - 1,
                ?delay,
                "request failed, retrying: {}",
                err
            );
        }

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(err),
                _ = sleep(delay) => {}
            },
            None => sleep(delay).await,
        }

        remaining -= 1;
        attempt_no += 1;
    }
}
