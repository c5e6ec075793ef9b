//! Backoff policy for transient chat-completions failures.

use std::time::Duration;

use cirrus_types::ApiError;
use rand::Rng;

/// How often and how patiently a failed request is retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one. Zero disables retrying.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// A server-provided `Retry-After` wins over the computed backoff. Either
    /// way the result never exceeds `max_delay_ms`. Computed delays carry
    /// ±25% jitter so concurrent sessions do not retry in lockstep.
    pub fn delay_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(server_delay) = retry_after_ms {
            return Duration::from_millis(server_delay.min(self.max_delay_ms));
        }

        let base = self.initial_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = rand::rng().random_range(0.75..=1.25);
        Duration::from_millis(((capped * jitter) as u64).min(self.max_delay_ms))
    }
}

/// Whether a failed request is worth sending again.
pub fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Overloaded
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

/// The server's requested wait, if the error carries one.
pub fn server_delay(error: &ApiError) -> Option<u64> {
    match error {
        ApiError::RateLimited { retry_after_ms } => *retry_after_ms,
        _ => None,
    }
}
