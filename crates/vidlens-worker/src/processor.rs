//! Per-job state machine.
//!
//! The processor is the only writer that moves a job out of `Pending` and
//! into `Completed` or `Failed`. All writes go through the version-checked
//! store, so a duplicate delivery or a concurrent cancel can never overwrite
//! a newer record.

use std::sync::Arc;

use tracing::Instrument;
use vidlens_models::{AnalysisResult, ErrorKind, Job, JobError, JobId, JobStatus};
use vidlens_queue::JobStore;
use vidlens_upstream::{MediaProbe, UpstreamClient};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics::{record_discarded, record_finished};

const OPERATION: &str = "analyze_video";

/// Message recorded when analysis fails in an unanticipated way.
pub const UNEXPECTED_FAILURE_MESSAGE: &str = "Unexpected error during video analysis";

/// Why the processor left a job alone or threw a result away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No record for the id (never existed or expired)
    NotFound,
    /// Cancelled before the processor claimed it
    Cancelled,
    /// Cancelled while the upstream call was running
    CancelledDuringProcessing,
    /// Already completed or failed, e.g. on duplicate delivery
    AlreadyTerminal,
    /// Another worker claimed the job in between
    ClaimedElsewhere,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::Cancelled => "cancelled",
            SkipReason::CancelledDuringProcessing => "cancelled_during_processing",
            SkipReason::AlreadyTerminal => "already_terminal",
            SkipReason::ClaimedElsewhere => "claimed_elsewhere",
        }
    }
}

/// Result of one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Failed(ErrorKind),
    Skipped(SkipReason),
}

/// Terminal write the processor wants to commit.
enum Verdict {
    Complete(AnalysisResult),
    Fail(JobError),
}

/// Drives a job from `Pending` to a terminal state.
#[derive(Clone)]
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    probe: Arc<dyn MediaProbe>,
    client: UpstreamClient,
}

impl JobProcessor {
    pub fn new(store: Arc<dyn JobStore>, probe: Arc<dyn MediaProbe>, client: UpstreamClient) -> Self {
        Self {
            store,
            probe,
            client,
        }
    }

    /// Process the job with id `job_id`.
    ///
    /// Provider and input failures are recorded on the job and reported as
    /// `Ok(ProcessOutcome::Failed)`. An `Err` means the store could not be
    /// reached and the task should be redelivered.
    pub async fn process(&self, job_id: &JobId) -> WorkerResult<ProcessOutcome> {
        let logger = JobLogger::new(job_id, OPERATION);
        let span = logger.create_span();
        self.run(job_id, &logger).instrument(span).await
    }

    async fn run(&self, job_id: &JobId, logger: &JobLogger) -> WorkerResult<ProcessOutcome> {
        // 1. Fetch and claim
        let mut job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => return Ok(self.skip(logger, SkipReason::NotFound)),
            Err(e) => return Err(e.into()),
        };

        if job.status == JobStatus::Cancelled {
            return Ok(self.skip(logger, SkipReason::Cancelled));
        }
        if job.is_terminal() {
            return Ok(self.skip(logger, SkipReason::AlreadyTerminal));
        }

        job.start()?;
        let claimed = match self.store.put(&job).await {
            Ok(stored) => stored,
            Err(e) if e.is_version_conflict() => {
                return Ok(self.skip(logger, SkipReason::ClaimedElsewhere))
            }
            Err(e) => return Err(e.into()),
        };
        logger.log_claimed(claimed.attempts);

        // 2. Probe the reference
        let metadata = match self.probe.probe(&claimed.input_reference).await {
            Ok(metadata) => {
                logger.log_probed(&metadata);
                metadata
            }
            Err(e) => {
                let error = JobError::new(ErrorKind::InvalidInput, e.message);
                return self.commit(&claimed, Verdict::Fail(error), logger).await;
            }
        };

        // 3. Call the provider
        let verdict = match self.analyze(&claimed).await {
            Ok(mut result) => {
                result.video_metadata = metadata;
                Verdict::Complete(result)
            }
            Err(error) => Verdict::Fail(error),
        };

        self.commit(&claimed, verdict, logger).await
    }

    /// Run the upstream call on its own task so a panic inside it still
    /// ends with a recorded failure.
    async fn analyze(&self, job: &Job) -> Result<AnalysisResult, JobError> {
        let client = self.client.clone();
        let reference = job.input_reference.clone();
        let options = job.options.clone();
        let custom_prompt = job.custom_prompt.clone();

        let handle = tokio::spawn(
            async move {
                client
                    .analyze(&reference, &options, custom_prompt.as_deref())
                    .await
            }
            .in_current_span(),
        );

        match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.to_job_error()),
            Err(join_error) => {
                tracing::error!("Analysis task aborted: {}", join_error);
                Err(JobError::new(ErrorKind::ProviderFault, UNEXPECTED_FAILURE_MESSAGE))
            }
        }
    }

    /// Write the terminal state, unless the job moved on while we worked.
    async fn commit(
        &self,
        claimed: &Job,
        verdict: Verdict,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let current = match self.store.get(&claimed.id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => return Ok(self.skip(logger, SkipReason::NotFound)),
            Err(e) => return Err(e.into()),
        };

        if let Some(reason) = Self::superseded(claimed, &current) {
            return Ok(self.skip(logger, reason));
        }

        let mut job = current;
        let outcome = match verdict {
            Verdict::Complete(result) => {
                let tokens = result.ai_provider.tokens_used;
                let elapsed = result.ai_provider.processing_time_ms;
                job.complete(result)?;
                logger.log_completed(tokens, elapsed);
                ProcessOutcome::Completed
            }
            Verdict::Fail(error) => {
                logger.log_failed(error.kind, &error.message);
                let kind = error.kind;
                job.fail(error)?;
                ProcessOutcome::Failed(kind)
            }
        };

        match self.store.put(&job).await {
            Ok(stored) => {
                let duration = stored.processing_time_seconds().unwrap_or_default();
                match &outcome {
                    ProcessOutcome::Completed => record_finished("completed", None, duration),
                    ProcessOutcome::Failed(kind) => {
                        record_finished("failed", Some(kind.as_str()), duration)
                    }
                    ProcessOutcome::Skipped(_) => {}
                }
                Ok(outcome)
            }
            Err(e) if e.is_version_conflict() => {
                // Lost the race: find out to whom
                let reason = match self.store.get(&claimed.id).await {
                    Ok(latest) => Self::superseded(claimed, &latest)
                        .unwrap_or(SkipReason::ClaimedElsewhere),
                    Err(e) if e.is_not_found() => SkipReason::NotFound,
                    Err(e) => return Err(e.into()),
                };
                Ok(self.skip(logger, reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `current` has moved past the record this run claimed.
    fn superseded(claimed: &Job, current: &Job) -> Option<SkipReason> {
        if current.status == JobStatus::Cancelled {
            Some(SkipReason::CancelledDuringProcessing)
        } else if current.is_terminal() {
            Some(SkipReason::AlreadyTerminal)
        } else if current.version != claimed.version {
            Some(SkipReason::ClaimedElsewhere)
        } else {
            None
        }
    }

    fn skip(&self, logger: &JobLogger, reason: SkipReason) -> ProcessOutcome {
        logger.log_discarded(reason.as_str());
        record_discarded(reason.as_str());
        ProcessOutcome::Skipped(reason)
    }

    /// Fail a job whose task is being dead-lettered. Best effort.
    pub async fn fail_abandoned(&self, job_id: &JobId, message: &str) -> WorkerResult<bool> {
        let mut job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if job.is_terminal() {
            return Ok(false);
        }

        job.fail(JobError::new(ErrorKind::ProviderFault, message))?;
        match self.store.put(&job).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_version_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
