//! Job store: the single source of truth for job state.
//!
//! Writes are full-record overwrites guarded by the record's `version`: a
//! write whose version is not newer than the stored one is rejected with
//! [`StoreError::VersionConflict`]. Every write refreshes the record's TTL,
//! `active_ttl` while the job is in flight and `terminal_ttl` once it is done.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use vidlens_models::{Job, JobId};

use crate::error::StoreResult;

pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key written by the store
    pub key_prefix: String,
    /// TTL for pending and processing records, refreshed on every write
    pub active_ttl: Duration,
    /// TTL for completed, failed and cancelled records
    pub terminal_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vidlens".to_string(),
            active_ttl: Duration::from_secs(24 * 3600),
            terminal_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("JOB_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            active_ttl: std::env::var("JOB_ACTIVE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.active_ttl),
            terminal_ttl: std::env::var("JOB_RESULT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.terminal_ttl),
        }
    }

    /// TTL applied when writing `job`.
    pub fn ttl_for(&self, job: &Job) -> Duration {
        if job.is_terminal() {
            self.terminal_ttl
        } else {
            self.active_ttl
        }
    }

    /// Copy of `job` with `expires_at` stamped for a write happening now.
    pub fn stamp(&self, job: &Job) -> Job {
        let mut stored = job.clone();
        stored.expires_at = chrono::Duration::from_std(self.ttl_for(job))
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        stored
    }
}

/// Persistent job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Write the full record. Returns the stored copy with `expires_at` set.
    async fn put(&self, job: &Job) -> StoreResult<Job>;

    /// Fetch a record, or `NotFound`.
    async fn get(&self, id: &JobId) -> StoreResult<Job>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, id: &JobId) -> StoreResult<()>;

    /// Snapshot of all live records, in no particular order.
    async fn list(&self) -> StoreResult<Vec<Job>>;

    /// Check the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}
