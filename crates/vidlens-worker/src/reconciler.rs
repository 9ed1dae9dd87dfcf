//! Background reconciler for stalled jobs.
//!
//! A job whose worker died mid-call stays in `Processing` until its task is
//! claimed again. If that never happens (the task was dead-lettered, or the
//! queue lost it), this loop fails the job so clients stop polling.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use vidlens_models::{ErrorKind, JobError};
use vidlens_queue::JobStore;

use crate::metrics::record_stalled;

/// Message recorded on jobs failed by the reconciler.
pub const STALLED_MESSAGE: &str =
    "Processing timed out. The worker may have crashed. Please try again.";

/// Stall reconciler service.
pub struct StallReconciler {
    store: Arc<dyn JobStore>,
    stall_timeout: Duration,
    interval: Duration,
}

impl StallReconciler {
    pub fn new(store: Arc<dyn JobStore>, stall_timeout: Duration, interval: Duration) -> Self {
        Self {
            store,
            stall_timeout,
            interval,
        }
    }

    /// Run until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting stall reconciler (interval: {:?}, timeout: {:?})",
            self.interval, self.stall_timeout
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!("Stall reconciliation error: {}", e);
                    }
                }
            }
        }

        info!("Stall reconciler stopped");
    }

    /// Fail every job stuck in `Processing` past the timeout.
    ///
    /// Returns how many jobs were failed.
    pub async fn check_once(&self) -> anyhow::Result<usize> {
        let threshold = chrono::Duration::from_std(self.stall_timeout)?;
        let now = Utc::now();

        let mut recovered = 0;
        for mut job in self.store.list().await? {
            if !job.is_stalled(threshold, now) {
                continue;
            }

            warn!(
                job_id = %job.id,
                started_at = ?job.started_at,
                attempts = job.attempts,
                "Detected stalled job"
            );

            job.fail(JobError::new(ErrorKind::Timeout, STALLED_MESSAGE))?;
            match self.store.put(&job).await {
                Ok(_) => {
                    recovered += 1;
                    record_stalled();
                }
                // A worker finished or reclaimed it first
                Err(e) if e.is_version_conflict() => {
                    info!(job_id = %job.id, "Stalled job changed concurrently, skipping");
                }
                Err(e) => error!(job_id = %job.id, "Failed to fail stalled job: {}", e),
            }
        }

        if recovered > 0 {
            info!("Stall reconciliation complete: {} jobs failed", recovered);
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::{AnalysisOptions, Job, JobStatus};
    use vidlens_queue::MemoryJobStore;

    fn reconciler(store: Arc<MemoryJobStore>) -> StallReconciler {
        StallReconciler::new(store, Duration::from_secs(900), Duration::from_secs(60))
    }

    async fn processing_job(store: &MemoryJobStore, started_minutes_ago: i64) -> Job {
        let mut job = Job::new("http://host/v.mp4", AnalysisOptions::default(), None);
        job.start().unwrap();
        job.started_at = Some(Utc::now() - chrono::Duration::minutes(started_minutes_ago));
        store.put(&job).await.unwrap()
    }

    #[tokio::test]
    async fn test_fails_jobs_past_timeout() {
        let store = Arc::new(MemoryJobStore::default());
        let stalled = processing_job(&store, 20).await;
        let fresh = processing_job(&store, 1).await;
        let pending = store
            .put(&Job::new("http://host/p.mp4", AnalysisOptions::default(), None))
            .await
            .unwrap();

        let recovered = reconciler(store.clone()).check_once().await.unwrap();
        assert_eq!(recovered, 1);

        let failed = store.get(&stalled.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        let error = failed.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.message, STALLED_MESSAGE);

        assert_eq!(store.get(&fresh.id).await.unwrap().status, JobStatus::Processing);
        assert_eq!(store.get(&pending.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let store = Arc::new(MemoryJobStore::default());
        processing_job(&store, 30).await;

        let reconciler = reconciler(store);
        assert_eq!(reconciler.check_once().await.unwrap(), 1);
        assert_eq!(reconciler.check_once().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryJobStore::default());
        let stalled = processing_job(&store, 30).await;
        let (tx, rx) = watch::channel(false);

        let reconciler = reconciler(store.clone());
        let handle = tokio::spawn(async move { reconciler.run(rx).await });

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get(&stalled.id).await.unwrap().status, JobStatus::Failed);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
