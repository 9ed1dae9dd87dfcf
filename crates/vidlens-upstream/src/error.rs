//! Upstream error types.

use std::time::Duration;

use thiserror::Error;
use vidlens_models::{ErrorKind, JobError};

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A classified failure from the inference provider or the media probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider hint for when to try again
    pub retry_after: Option<Duration>,
}

impl UpstreamError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unreachable, msg)
    }

    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::new(ErrorKind::RateLimited, msg).with_retry_after(retry_after)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, msg)
    }

    pub fn provider_fault(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderFault, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    /// Whether this outcome says something about provider health.
    ///
    /// A rejected input is the caller's fault and must not trip the breaker.
    pub fn counts_against_breaker(&self) -> bool {
        self.kind != ErrorKind::InvalidInput
    }

    /// Convert into the error recorded on a failed job.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.kind, self.message.clone())
            .with_retry_after(self.retry_after.map(|d| d.as_secs().max(1)))
    }

    /// Classify a transport-level reqwest error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("Request timed out: {}", err))
        } else if err.is_decode() {
            Self::provider_fault(format!("Malformed response body: {}", err))
        } else {
            Self::unreachable(format!("Request failed: {}", err))
        }
    }
}

impl From<UpstreamError> for JobError {
    fn from(err: UpstreamError) -> Self {
        err.to_job_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(UpstreamError::timeout("t").is_retryable());
        assert!(UpstreamError::rate_limited("r", None).is_retryable());
        assert!(UpstreamError::unreachable("u").is_retryable());
        assert!(UpstreamError::provider_fault("p").is_retryable());
        assert!(!UpstreamError::invalid_input("i").is_retryable());
    }

    #[test]
    fn test_invalid_input_is_neutral_for_breaker() {
        assert!(!UpstreamError::invalid_input("bad").counts_against_breaker());
        assert!(UpstreamError::timeout("slow").counts_against_breaker());
    }

    #[test]
    fn test_job_error_keeps_kind_and_hint() {
        let err = UpstreamError::rate_limited("slow down", Some(Duration::from_secs(30)));
        let job_error: JobError = err.into();
        assert_eq!(job_error.kind, ErrorKind::RateLimited);
        assert_eq!(job_error.retry_after_secs, Some(30));
        assert_eq!(job_error.message, "slow down");
    }
}
