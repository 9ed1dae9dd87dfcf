//! Failures of the job store and the task stream.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("cannot reach the broker: {0}")]
    ConnectionFailed(String),

    #[error("task was not appended: {0}")]
    EnqueueFailed(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("task payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed(reason.into())
    }

    pub fn enqueue_failed(reason: impl Into<String>) -> Self {
        Self::EnqueueFailed(reason.into())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no job {0}")]
    NotFound(String),

    /// The write carried a version that is not newer than the stored one.
    #[error("stale write to job {job_id}: stored version {stored}, attempted {attempted}")]
    VersionConflict {
        job_id: String,
        stored: u64,
        attempted: u64,
    },

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("job record: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
