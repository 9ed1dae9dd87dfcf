//! In-process job store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use vidlens_models::{Job, JobId};

use super::{JobStore, StoreConfig};
use crate::error::{StoreError, StoreResult};

struct Entry {
    job: Job,
    deadline: Instant,
}

/// Job store backed by a `HashMap`. Expired entries are purged lazily.
pub struct MemoryJobStore {
    entries: RwLock<HashMap<JobId, Entry>>,
    config: StoreConfig,
}

impl MemoryJobStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.deadline > now)
            .count()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, job: &Job) -> StoreResult<Job> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        if let Some(existing) = entries.get(&job.id) {
            if existing.deadline > now && job.version <= existing.job.version {
                return Err(StoreError::VersionConflict {
                    job_id: job.id.to_string(),
                    stored: existing.job.version,
                    attempted: job.version,
                });
            }
        }

        let stored = self.config.stamp(job);
        entries.insert(
            job.id.clone(),
            Entry {
                job: stored.clone(),
                deadline: now + self.config.ttl_for(job),
            },
        );
        Ok(stored)
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some(entry) if entry.deadline > now => return Ok(entry.job.clone()),
                None => return Err(StoreError::not_found(id.as_str())),
                Some(_) => {}
            }
        }

        // Expired: purge it
        let mut entries = self.entries.write().await;
        if entries.get(id).is_some_and(|e| e.deadline <= now) {
            entries.remove(id);
        }
        Err(StoreError::not_found(id.as_str()))
    }

    async fn delete(&self, id: &JobId) -> StoreResult<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| e.deadline > now);
        Ok(entries.values().map(|e| e.job.clone()).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vidlens_models::{AnalysisOptions, JobStatus};

    fn store() -> MemoryJobStore {
        MemoryJobStore::new(StoreConfig {
            active_ttl: Duration::from_secs(60),
            terminal_ttl: Duration::from_secs(600),
            ..Default::default()
        })
    }

    fn job() -> Job {
        Job::new("http://host/a.mp4", AnalysisOptions::default(), None)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = store();
        let job = job();
        let stored = store.put(&job).await.unwrap();
        assert!(stored.expires_at.is_some());

        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let store = store();
        let err = store.get(&JobId::from("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stale_version_rejected() {
        let store = store();
        let mut job = job();
        store.put(&job).await.unwrap();

        let stale = job.clone();
        job.start().unwrap();
        store.put(&job).await.unwrap();

        let err = store.put(&stale).await.unwrap_err();
        assert!(err.is_version_conflict());
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Processing);

        // Same version twice is also rejected
        assert!(store.put(&job).await.unwrap_err().is_version_conflict());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_record_expires() {
        let store = store();
        let job = job();
        store.put(&job).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get(&job.id).await.unwrap_err().is_not_found());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_refreshes_ttl() {
        let store = store();
        let mut job = job();
        store.put(&job).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        job.start().unwrap();
        store.put(&job).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get(&job.id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_record_keeps_longer_ttl() {
        let store = store();
        let mut job = job();
        job.cancel().unwrap();
        store.put(&job).await.unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = store();
        let a = job();
        let b = job();
        store.put(&a).await.unwrap();
        store.put(&b).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.delete(&a.id).await.unwrap();
        store.delete(&a.id).await.unwrap();
        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }
}
