//! At-least-once task queue.

mod memory;
mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vidlens_models::JobId;

use crate::error::QueueResult;

pub use memory::MemoryTaskQueue;
pub use redis_queue::RedisTaskQueue;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vidlens:tasks".to_string(),
            consumer_group: "vidlens:workers".to_string(),
            dlq_stream_name: "vidlens:dlq".to_string(),
            max_retries: 3,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vidlens:tasks".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vidlens:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vidlens:dlq".to_string()),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Message asking a worker to analyze a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeVideoTask {
    pub job_id: JobId,
    pub enqueued_at: DateTime<Utc>,
}

impl AnalyzeVideoTask {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            enqueued_at: Utc::now(),
        }
    }
}

/// A task handed to a consumer, identified by its queue message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub task: AnalyzeVideoTask,
}

/// Task queue with at-least-once delivery.
///
/// A delivered message stays pending until it is acknowledged. Pending
/// messages idle for longer than `min_idle` can be claimed by another
/// consumer, which is how work left behind by a crashed worker resumes.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Create backing structures if needed.
    async fn init(&self) -> QueueResult<()>;

    /// Append a task. Returns the message id.
    async fn enqueue(&self, task: &AnalyzeVideoTask) -> QueueResult<String>;

    /// Read up to `count` new messages, waiting at most `block`.
    async fn consume(
        &self,
        consumer_name: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Take over pending messages idle for at least `min_idle`.
    async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge and drop a message.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Move a message to the dead letter queue and acknowledge it.
    async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Bump and return the retry count for a message.
    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32>;

    /// Retries allowed before a message is dead-lettered.
    fn max_retries(&self) -> u32;

    /// Messages in the queue, pending ones included.
    async fn len(&self) -> QueueResult<u64>;

    /// Check the backend is reachable.
    async fn ping(&self) -> QueueResult<()>;
}
