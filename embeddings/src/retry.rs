//! Retry policy and the `call_with_retry` combinator.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EmbeddingError, FailureKind, Result};

/// Bounded exponential backoff.
///
/// The delay after the n-th failed attempt is `base_delay * 2^(n-1)`,
/// clamped to `[min_delay, max_delay]`. Only failures whose
/// [`FailureKind`] is listed in `retry_on` are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay after the first failure before clamping.
    pub base_delay: Duration,

    /// Floor for every delay.
    pub min_delay: Duration,

    /// Ceiling for every delay.
    pub max_delay: Duration,

    /// Failure kinds worth retrying.
    pub retry_on: Vec<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            retry_on: vec![
                FailureKind::RateLimit,
                FailureKind::Timeout,
                FailureKind::Connection,
            ],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether failures of `kind` are retried.
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// Delay to wait after attempt `attempt` failed with `err`. A
    /// server-supplied `retry-after` raises the delay, up to `max_delay`.
    pub fn delay_after(&self, attempt: u32, err: &EmbeddingError) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match err.retry_after() {
            Some(hint) => delay.max(hint.min(self.max_delay)),
            None => delay,
        }
    }
}

/// Serializable mirror of [`RetryPolicy`]'s numeric knobs, for config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Minimum delay in milliseconds.
    pub min_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            min_delay_ms: policy.min_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ..Self::default()
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted. The last error is returned unchanged.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = err.kind();
                if attempt >= max_attempts || !policy.is_retryable(kind) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt, &err);
                warn!(
                    attempt,
                    max_attempts,
                    ?kind,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
