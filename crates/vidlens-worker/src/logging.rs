//! Structured job logging.
//!
//! Every lifecycle line carries `job_id` and `operation` so a job can be
//! followed across the processor, the executor and the reconciler.

use tracing::{error, info, warn, Span};
use vidlens_models::{ErrorKind, JobId, VideoMetadata};

/// Logger bound to one job and operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    /// A worker claimed the job.
    pub fn log_claimed(&self, attempt: u32) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            attempt,
            "Job claimed"
        );
    }

    /// The reference answered the reachability probe.
    pub fn log_probed(&self, metadata: &VideoMetadata) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            format = %metadata.format,
            size_bytes = ?metadata.size_bytes,
            "Video reference reachable"
        );
    }

    pub fn log_completed(&self, tokens_used: u64, processing_time_ms: u64) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            tokens_used,
            processing_time_ms,
            "Job completed"
        );
    }

    pub fn log_failed(&self, kind: ErrorKind, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            kind = %kind,
            "Job failed: {}", message
        );
    }

    /// The job was left untouched, or a finished result was thrown away.
    pub fn log_discarded(&self, reason: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            reason,
            "Job outcome discarded"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering all work on this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_keeps_id() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "analyze_video");
        assert_eq!(logger.job_id(), job_id.as_str());
    }
}
