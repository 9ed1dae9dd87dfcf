//! Job gateway: the only entry point that creates or cancels jobs.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use vidlens_models::{
    validate_reference, AnalysisOptions, InputError, Job, JobId, JobStatus, TransitionError,
};
use vidlens_queue::{AnalyzeVideoTask, JobStore, QueueError, StoreError, TaskQueue};

use crate::metrics::{record_job_cancelled, record_job_submitted};

/// Attempts at cancelling before giving up on a contended record.
const CANCEL_ATTEMPTS: usize = 3;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {job_id} is already {status}")]
    AlreadyTerminal { job_id: String, status: JobStatus },

    #[error("Job {0} is being updated concurrently, try again")]
    Contended(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid job state: {0}")]
    Transition(#[from] TransitionError),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GatewayError::NotFound(id),
            other => GatewayError::Store(other),
        }
    }
}

/// Accepts submissions and answers status queries.
#[derive(Clone)]
pub struct JobGateway {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
}

impl JobGateway {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Create a pending job and enqueue it.
    ///
    /// The reference is checked syntactically only; reachability is the
    /// processor's concern. If enqueueing fails the record is removed again.
    pub async fn submit(
        &self,
        reference: &str,
        options: AnalysisOptions,
        custom_prompt: Option<String>,
    ) -> GatewayResult<Job> {
        let url = validate_reference(reference)?;
        options.validate()?;

        let custom_prompt = match custom_prompt {
            Some(prompt) if prompt.trim().is_empty() => return Err(InputError::EmptyPrompt.into()),
            other => other,
        };

        let job = Job::new(url.as_str(), options, custom_prompt);
        let stored = self.store.put(&job).await?;

        if let Err(e) = self.queue.enqueue(&AnalyzeVideoTask::new(stored.id.clone())).await {
            warn!(job_id = %stored.id, "Enqueue failed, removing job record: {}", e);
            if let Err(delete_err) = self.store.delete(&stored.id).await {
                warn!(job_id = %stored.id, "Failed to remove orphaned job: {}", delete_err);
            }
            return Err(e.into());
        }

        record_job_submitted(stored.options.analysis_depth.as_str());
        info!(
            job_id = %stored.id,
            depth = stored.options.analysis_depth.as_str(),
            custom_prompt = stored.custom_prompt.is_some(),
            "Job submitted"
        );

        Ok(stored)
    }

    pub async fn get_status(&self, id: &JobId) -> GatewayResult<Job> {
        Ok(self.store.get(id).await?)
    }

    /// Cancel a pending or processing job.
    ///
    /// A processing job keeps running upstream; its result is discarded.
    pub async fn cancel(&self, id: &JobId) -> GatewayResult<Job> {
        for _ in 0..CANCEL_ATTEMPTS {
            let mut job = self.store.get(id).await?;
            if job.is_terminal() {
                return Err(GatewayError::AlreadyTerminal {
                    job_id: id.to_string(),
                    status: job.status,
                });
            }

            let previous = job.status;
            job.cancel()?;

            match self.store.put(&job).await {
                Ok(stored) => {
                    record_job_cancelled(previous.as_str());
                    info!(job_id = %id, from = %previous, "Job cancelled");
                    return Ok(stored);
                }
                // The worker moved it on; look again
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(GatewayError::Contended(id.to_string()))
    }

    /// Jobs newest first, at most `limit` of them.
    pub async fn list_jobs(&self, limit: Option<usize>) -> GatewayResult<Vec<Job>> {
        let mut jobs = self.store.list().await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use vidlens_queue::{Delivery, MemoryJobStore, MemoryTaskQueue, QueueResult};

    fn gateway() -> (JobGateway, Arc<MemoryJobStore>, Arc<MemoryTaskQueue>) {
        let store = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(MemoryTaskQueue::default());
        (JobGateway::new(store.clone(), queue.clone()), store, queue)
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job_and_task() {
        let (gateway, store, queue) = gateway();

        let job = gateway
            .submit("http://host/a.mp4", AnalysisOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.expires_at.is_some());
        assert_eq!(store.get(&job.id).await.unwrap(), job);

        let delivered = queue.consume("w", Duration::ZERO, 10).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].task.job_id, job.id);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input() {
        let (gateway, store, _) = gateway();

        let err = gateway
            .submit("ftp://host/a.mp4", AnalysisOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Input(InputError::UnsupportedScheme(_))));

        let err = gateway
            .submit("http://host/a.gif", AnalysisOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Input(InputError::UnsupportedFormat { .. })));

        let options = AnalysisOptions {
            language: "english".into(),
            ..Default::default()
        };
        let err = gateway.submit("http://host/a.mp4", options, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Input(InputError::InvalidLanguage(_))));

        let err = gateway
            .submit("http://host/a.mp4", AnalysisOptions::default(), Some("  ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Input(InputError::EmptyPrompt)));

        assert_eq!(store.len().await, 0);
    }

    /// Queue that refuses every task.
    struct DownQueue;

    #[async_trait]
    impl TaskQueue for DownQueue {
        async fn init(&self) -> QueueResult<()> {
            Ok(())
        }
        async fn enqueue(&self, _task: &AnalyzeVideoTask) -> QueueResult<String> {
            Err(QueueError::enqueue_failed("broker down"))
        }
        async fn consume(&self, _: &str, _: Duration, _: usize) -> QueueResult<Vec<Delivery>> {
            Ok(Vec::new())
        }
        async fn claim_pending(&self, _: &str, _: Duration, _: usize) -> QueueResult<Vec<Delivery>> {
            Ok(Vec::new())
        }
        async fn ack(&self, _: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn dlq(&self, _: &Delivery, _: &str) -> QueueResult<()> {
            Ok(())
        }
        async fn increment_retry(&self, _: &str) -> QueueResult<u32> {
            Ok(1)
        }
        fn max_retries(&self) -> u32 {
            3
        }
        async fn len(&self) -> QueueResult<u64> {
            Ok(0)
        }
        async fn ping(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_enqueue_failure_removes_record() {
        let store = Arc::new(MemoryJobStore::default());
        let gateway = JobGateway::new(store.clone(), Arc::new(DownQueue));

        let err = gateway
            .submit("http://host/a.mp4", AnalysisOptions::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Queue(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (gateway, _, _) = gateway();
        let missing = JobId::from("nope");

        assert!(matches!(
            gateway.get_status(&missing).await,
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            gateway.cancel(&missing).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_terminal_conflict() {
        let (gateway, _, _) = gateway();
        let job = gateway
            .submit("https://host/b.webm", AnalysisOptions::default(), None)
            .await
            .unwrap();

        let cancelled = gateway.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        let err = gateway.cancel(&job.id).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AlreadyTerminal {
                status: JobStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_processing_job() {
        let (gateway, store, _) = gateway();
        let job = gateway
            .submit("http://host/a.mov", AnalysisOptions::default(), None)
            .await
            .unwrap();

        let mut claimed = store.get(&job.id).await.unwrap();
        claimed.start().unwrap();
        store.put(&claimed).await.unwrap();

        let cancelled = gateway.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.result.is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first_with_limit() {
        let (gateway, _, _) = gateway();
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let job = gateway
                .submit(&format!("http://host/{}.mp4", name), AnalysisOptions::default(), None)
                .await
                .unwrap();
            ids.push(job.id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let all = gateway.list_jobs(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, ids[2]);
        assert_eq!(all[2].id, ids[0]);

        let limited = gateway.list_jobs(Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, ids[2]);
    }
}
