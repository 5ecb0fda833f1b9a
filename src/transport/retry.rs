//! Retry classification and exponential backoff
//!
//! [`RetryPolicy`] decides whether a finished attempt deserves another try.
//! [`RetryManager`] pairs the policy with the backoff schedule and attempt
//! budget from [`RetryConfig`].

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::TransportError;

/// Outcome of a single attempt, as seen by the retry policy
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// The request failed before a response was received
    Error(&'a TransportError),
    /// A response arrived with this status
    Response(StatusCode),
}

/// Stateless retry classification
///
/// Rules, first match wins:
/// 1. cancellation fired: never retry, return [`TransportError::Cancelled`]
/// 2. temporary network errors (timeout, reset, EOF, DNS, TLS) are retried
/// 3. any other transport error is terminal
/// 4. responses are retried only for 5xx
///
/// 429 is terminal. Pacing in the batch executor is what keeps request rates
/// under upstream limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    /// Decide whether to retry after `attempt`
    pub fn should_retry(
        &self,
        cancel: &CancellationToken,
        attempt: Attempt<'_>,
    ) -> Result<bool, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        match attempt {
            Attempt::Error(TransportError::Cancelled) => Err(TransportError::Cancelled),
            Attempt::Error(err) => Ok(err.is_temporary()),
            Attempt::Response(status) => Ok(status.is_server_error()),
        }
    }
}

/// Retry manager with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
    policy: RetryPolicy,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            policy: RetryPolicy,
        }
    }

    /// Create a RetryManager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Classify an attempt using the underlying [`RetryPolicy`]
    pub fn should_retry(
        &self,
        cancel: &CancellationToken,
        attempt: Attempt<'_>,
    ) -> Result<bool, TransportError> {
        self.policy.should_retry(cancel, attempt)
    }

    /// Total attempts allowed per request, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Calculate backoff duration before retry number `retry` (0-based)
    ///
    /// Uses exponential backoff: initial_backoff * multiplier^retry,
    /// capped at max_backoff with optional jitter
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);

        let delay = if self.config.jitter {
            // 50-100% of the calculated backoff
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_secs_f64(delay / 1000.0)
    }

    /// Backoff delays a request would observe if every attempt failed
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts().saturating_sub(1))
            .map(|retry| self.calculate_backoff(retry))
            .collect()
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
