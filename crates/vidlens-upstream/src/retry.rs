//! Retry policy with exponential backoff and jitter.
//!
//! - Exponential backoff: `base * 2^attempt`, capped at `max_delay`
//! - Half fixed, half random jitter
//! - Honors Retry-After on rate limiting, up to `max_delay`

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info_span, warn, Instrument};

use crate::error::UpstreamResult;
use crate::metrics::record_retry;

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy for provider calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let max_attempts: u32 = std::env::var("UPSTREAM_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(3);

        let base_delay_ms: u64 = std::env::var("UPSTREAM_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2000);

        let max_delay_ms: u64 = std::env::var("UPSTREAM_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10_000);

        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms.max(base_delay_ms)),
        }
    }

    /// Backoff ceiling before jitter for retry number `attempt` (0-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after.min(self.max_delay);
        }

        let ceiling_ms = self.backoff_ceiling(attempt).as_millis() as u64;
        let half = ceiling_ms / 2;
        let jitter = if half > 0 {
            rand::rng().random_range(0..=half)
        } else {
            0
        };
        Duration::from_millis(ceiling_ms - half + jitter)
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute an async operation, retrying transient failures.
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> UpstreamResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let span = info_span!("upstream_attempt", operation = %operation, attempt = attempt + 1);

            match op().instrument(span).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for_attempt(attempt, e.retry_after);

                    warn!(
                        operation = %operation,
                        attempt = attempt + 1,
                        kind = %e.kind,
                        delay_ms = delay.as_millis() as u64,
                        "Upstream call failed, retrying: {}",
                        e.message
                    );

                    record_retry(operation, e.kind.as_str());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
