//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use vidlens_queue::{QueueError, StoreError};

use crate::gateway::GatewayError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Job store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Task queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Status and stable `code` string sent to clients.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Internal(_) | Self::Store(_) | Self::Queue(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Input(e) => Self::InvalidInput(e.to_string()),
            GatewayError::NotFound(id) => Self::NotFound(format!("Job {} not found", id)),
            e @ (GatewayError::AlreadyTerminal { .. } | GatewayError::Contended(_)) => {
                Self::Conflict(e.to_string())
            }
            GatewayError::Store(e) => Self::Store(e),
            GatewayError::Queue(e) => Self::Queue(e),
            GatewayError::Transition(e) => Self::Internal(e.to_string()),
        }
    }
}

/// Unparsable or mistyped request bodies.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    detail: String,
}

fn hide_internal_details() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|env| env.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        let detail = if status.is_server_error() {
            error!(error = %self, "Request failed");
            if hide_internal_details() {
                "Internal server error".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { code, detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::{InputError, JobStatus};

    #[test]
    fn test_gateway_errors_classify() {
        let cases = [
            (GatewayError::Input(InputError::MissingHost), StatusCode::BAD_REQUEST, "invalid_input"),
            (GatewayError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (
                GatewayError::AlreadyTerminal {
                    job_id: "x".into(),
                    status: JobStatus::Completed,
                },
                StatusCode::CONFLICT,
                "conflict",
            ),
            (GatewayError::Contended("x".into()), StatusCode::CONFLICT, "conflict"),
        ];

        for (err, status, code) in cases {
            assert_eq!(ApiError::from(err).classify(), (status, code));
        }
    }

    #[test]
    fn test_internal_errors_are_500() {
        let err = ApiError::Internal("boom".into());
        assert_eq!(err.classify().0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.classify().1, "internal_error");
    }
}
