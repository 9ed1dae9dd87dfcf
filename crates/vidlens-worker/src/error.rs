//! Worker error types.
//!
//! Provider and input failures are not errors at this level: the processor
//! records them on the job. What remains are infrastructure failures that
//! leave the task unacknowledged for redelivery.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    Store(#[from] vidlens_queue::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vidlens_queue::QueueError),

    #[error("Invalid job state: {0}")]
    Transition(#[from] vidlens_models::TransitionError),
}
