//! Retry with exponential backoff for outbound source queries

use std::time::Duration;

use crate::http::{HttpError, http_config};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for HttpError {
    fn is_retryable(&self) -> bool {
        HttpError::is_retryable(self)
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy from the global [`HttpConfig`](crate::HttpConfig), 1s base delay.
    pub fn from_http_config() -> Self {
        Self {
            max_retries: http_config().max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Never retry.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_http_config()
    }
}

/// Exponential backoff: `base * 2^attempt` (2s, 4s, 8s, ... for a 1s base)
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Retry a fallible operation with exponential backoff.
///
/// Retryable errors are logged and retried up to `policy.max_retries` times.
/// Returns the first success, or the last error once retries are exhausted
/// or a non-retryable error occurs.
pub fn retry_with_backoff<T, E>(
    label: &str,
    policy: RetryPolicy,
    mut attempt_fn: impl FnMut() -> Result<T, E>,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(policy.base_delay, attempt);
                log::warn!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                    policy.max_retries
                );
                std::thread::sleep(delay);
            }
            Err(e) => {
                log::debug!("{label}: giving up after {} attempt(s): {e}", attempt + 1);
                return Err(e);
            }
        }
    }
}
