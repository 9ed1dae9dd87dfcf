//! Job handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::debug;
use validator::Validate;

use vidlens_models::JobId;

use crate::dto::{
    JobListResponse, JobSubmittedResponse, JobView, ListJobsQuery, SubmitJobRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /api/v1/jobs
///
/// Returns 202 immediately; poll the `status` link for the outcome.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobSubmittedResponse>)> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;

    let job = state
        .gateway
        .submit(&request.video_url, request.options, request.custom_prompt)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobSubmittedResponse::new(
            &job,
            state.config.estimated_processing_secs,
        )),
    ))
}

/// GET /api/v1/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.gateway.get_status(&job_id).await?;
    debug!(job_id = %job_id, status = %job.status, "Job status read");

    Ok(Json(JobView::new(job, state.config.estimated_processing_secs)))
}

/// DELETE /api/v1/jobs/:job_id
///
/// 204 on success, 409 if the job already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = parse_job_id(&job_id)?;
    state.gateway.cancel(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/jobs?limit=N
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let jobs = state
        .gateway
        .list_jobs(Some(query.effective_limit()))
        .await?;

    let estimate = state.config.estimated_processing_secs;
    let jobs: Vec<JobView> = jobs.into_iter().map(|j| JobView::new(j, estimate)).collect();

    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// Reject ids that could never have been issued, before touching the store.
fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    let valid = !raw.is_empty()
        && raw.len() <= 64
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(JobId::from(raw))
    } else {
        Err(ApiError::not_found(format!("Job {} not found", raw)))
    }
}
