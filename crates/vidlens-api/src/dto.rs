//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use vidlens_models::{AnalysisOptions, AnalysisResult, Job, JobError, JobStatus};

/// Prefix all job routes live under.
pub const API_PREFIX: &str = "/api/v1";

/// Default and maximum page size for job listings.
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// POST /jobs body.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// http(s) URL of the video
    #[validate(length(min = 1, max = 2048))]
    pub video_url: String,
    #[serde(default)]
    pub options: AnalysisOptions,
    /// Replaces the prompt built from `options`
    #[serde(default)]
    #[validate(length(min = 1, max = 4000))]
    pub custom_prompt: Option<String>,
}

/// Hypermedia links for a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<String>,
}

impl Links {
    pub fn for_job(job: &Job) -> Self {
        let href = format!("{}/jobs/{}", API_PREFIX, job.id);
        Self {
            self_link: href.clone(),
            status: href.clone(),
            cancel: (!job.is_terminal()).then_some(href),
        }
    }
}

/// 202 response to a submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobSubmittedResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub estimated_time_seconds: u64,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl JobSubmittedResponse {
    pub fn new(job: &Job, estimated_time_seconds: u64) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            created_at: job.created_at,
            estimated_time_seconds,
            links: Links::for_job(job),
        }
    }
}

/// Client view of a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    /// Only while the job is still pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_seconds: Option<u64>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(rename = "_links")]
    pub links: Links,
}

impl JobView {
    pub fn new(job: Job, estimated_time_seconds: u64) -> Self {
        let links = Links::for_job(&job);
        let processing_time_seconds = match job.status {
            JobStatus::Completed | JobStatus::Failed => job.processing_time_seconds(),
            _ => None,
        };
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            processing_time_seconds,
            estimated_time_seconds: (job.status == JobStatus::Pending)
                .then_some(estimated_time_seconds),
            attempts: job.attempts,
            result: job.result,
            error: job.error,
            links,
        }
    }
}

/// GET /jobs query.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    /// Requested limit clamped to `1..=MAX_LIST_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// GET /jobs response.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<JobView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_drop_cancel_once_terminal() {
        let mut job = Job::new("http://host/a.mp4", AnalysisOptions::default(), None);
        let links = Links::for_job(&job);
        assert_eq!(links.self_link, format!("/api/v1/jobs/{}", job.id));
        assert!(links.cancel.is_some());

        job.cancel().unwrap();
        assert!(Links::for_job(&job).cancel.is_none());
    }

    #[test]
    fn test_view_serializes_links_and_estimate() {
        let job = Job::new("http://host/a.mp4", AnalysisOptions::default(), None);
        let json = serde_json::to_value(JobView::new(job, 180)).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["estimated_time_seconds"], 180);
        assert!(json["_links"]["self"].is_string());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_request_validation() {
        let ok: SubmitJobRequest =
            serde_json::from_str(r#"{"video_url": "http://host/a.mp4"}"#).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.options, AnalysisOptions::default());

        let empty: SubmitJobRequest = serde_json::from_str(r#"{"video_url": ""}"#).unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_list_limit_is_clamped() {
        assert_eq!(ListJobsQuery::default().effective_limit(), DEFAULT_LIST_LIMIT);
        assert_eq!(ListJobsQuery { limit: Some(0) }.effective_limit(), 1);
        assert_eq!(ListJobsQuery { limit: Some(5000) }.effective_limit(), MAX_LIST_LIMIT);
    }
}
