//! Error classification shared across crates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::job::JobStatus;

/// Classified failure kind recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider could not be reached, or the circuit breaker is open
    Unreachable,
    /// Provider rejected the call for exceeding its rate limit
    RateLimited,
    /// The video reference or options were rejected
    InvalidInput,
    /// Provider returned an error or an unusable response
    ProviderFault,
    /// Provider did not answer in time
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ProviderFault => "provider_fault",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// Whether a failure of this kind is worth retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ErrorKind::InvalidInput)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error recorded on a job in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Classified kind
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Seconds until a resubmission is likely to succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }
}

/// Submission-time validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Malformed video URL: {0}")]
    Malformed(String),

    #[error("URL must use http or https, got '{0}'")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Format '{format}' is not supported. Accepted formats: {supported}")]
    UnsupportedFormat { format: String, supported: String },

    #[error("Invalid language tag '{0}', expected a tag like 'en-US'")]
    InvalidLanguage(String),

    #[error("Custom prompt must not be empty")]
    EmptyPrompt,
}

/// Rejected state machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_input_is_permanent() {
        assert!(!ErrorKind::InvalidInput.is_transient());
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(ErrorKind::ProviderFault.is_transient());
        assert!(ErrorKind::Unreachable.is_transient());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
    }
}
