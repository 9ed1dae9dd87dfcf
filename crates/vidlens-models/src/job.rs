//! Job record and its lifecycle state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::error::{JobError, TransitionError};
use crate::options::AnalysisOptions;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Pending,
    /// A worker claimed the job
    Processing,
    /// Analysis finished and the result is stored
    Completed,
    /// Analysis failed; the error is stored
    Failed,
    /// Cancelled by the submitter before a result was committed
    Cancelled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Position in the lifecycle. Transitions never decrease the rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted video analysis job.
///
/// Every mutation goes through a transition method, which bumps `version`
/// so the store can reject stale writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// Locator of the video to analyze
    pub input_reference: String,

    /// Analysis options
    #[serde(default)]
    pub options: AnalysisOptions,

    /// Free-form prompt overriding the options-derived prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,

    /// Present only when `status == Completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,

    /// Present only when `status == Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When a worker last claimed the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of times a worker claimed the job
    #[serde(default)]
    pub attempts: u32,

    /// Write sequence, bumped by every transition
    #[serde(default)]
    pub version: u64,

    /// TTL horizon stamped by the store on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        input_reference: impl Into<String>,
        options: AnalysisOptions,
        custom_prompt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            input_reference: input_reference.into(),
            options,
            custom_prompt,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            attempts: 0,
            version: 1,
            expires_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Claim the job for processing.
    ///
    /// Allowed from `Pending`, and from `Processing` when a message is
    /// redelivered after a worker crash.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.ensure_from(&[JobStatus::Pending, JobStatus::Processing], JobStatus::Processing)?;
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.attempts += 1;
        self.touch(now);
        Ok(())
    }

    /// Store the result and mark the job completed.
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), TransitionError> {
        self.ensure_from(&[JobStatus::Processing], JobStatus::Completed)?;
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Store the error and mark the job failed.
    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.ensure_from(&[JobStatus::Pending, JobStatus::Processing], JobStatus::Failed)?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.result = None;
        self.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Mark the job cancelled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.ensure_from(&[JobStatus::Pending, JobStatus::Processing], JobStatus::Cancelled)?;
        let now = Utc::now();
        self.status = JobStatus::Cancelled;
        self.result = None;
        self.error = None;
        self.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Verify the result/error invariants for the current status.
    pub fn check_invariants(&self) -> Result<(), TransitionError> {
        let has_result = self.result.is_some();
        let has_error = self.error.is_some();
        let ok = match self.status {
            JobStatus::Completed => has_result && !has_error,
            JobStatus::Failed => has_error && !has_result,
            _ => !has_result && !has_error,
        };
        if ok {
            Ok(())
        } else {
            Err(TransitionError::Invariant(format!(
                "status={} result={} error={}",
                self.status, has_result, has_error
            )))
        }
    }

    /// Seconds between the last claim and the terminal transition.
    pub fn processing_time_seconds(&self) -> Option<f64> {
        let end = self.completed_at?;
        let start = self.started_at.unwrap_or(self.created_at);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Whether the job has been in `Processing` longer than `threshold`.
    pub fn is_stalled(&self, threshold: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self
                .started_at
                .map_or(false, |started| now - started > threshold)
    }

    fn ensure_from(&self, allowed: &[JobStatus], to: JobStatus) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}
