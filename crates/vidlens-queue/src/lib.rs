//! Job store and task queue.
//!
//! This crate provides:
//! - [`JobStore`]: version-checked job records with TTL (Redis hashes or memory)
//! - [`TaskQueue`]: at-least-once task delivery (Redis Streams or memory)
//! - Dead letter handling for tasks that keep failing

pub mod error;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult, StoreError, StoreResult};
pub use queue::{
    AnalyzeVideoTask, Delivery, MemoryTaskQueue, QueueConfig, RedisTaskQueue, TaskQueue,
};
pub use store::{JobStore, MemoryJobStore, RedisJobStore, StoreConfig};
