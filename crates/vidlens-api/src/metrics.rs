//! Prometheus instrumentation of the HTTP surface and job submissions.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vidlens_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidlens_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vidlens_http_requests_in_flight";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vidlens_rate_limit_hits_total";

    pub const JOBS_SUBMITTED_TOTAL: &str = "vidlens_jobs_submitted_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vidlens_jobs_cancelled_total";
    pub const QUEUE_LENGTH: &str = "vidlens_queue_length";
}

/// Installs the global recorder; render the handle to expose it.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_job_submitted(depth: &str) {
    counter!(names::JOBS_SUBMITTED_TOTAL, "depth" => depth.to_owned()).increment(1);
}

/// Labelled with the status the job left.
pub fn record_job_cancelled(from_status: &str) {
    counter!(names::JOBS_CANCELLED_TOTAL, "from" => from_status.to_owned()).increment(1);
}

pub fn set_queue_length(depth: u64) {
    gauge!(names::QUEUE_LENGTH).set(depth as f64);
}

pub fn record_rate_limit_hit(path: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => route_label(path)).increment(1);
}

/// Replaces the segment after `/jobs/` and any other id-like segment with
/// `:id` to bound label cardinality.
fn route_label(path: &str) -> String {
    let is_id = |segment: &str| {
        uuid::Uuid::parse_str(segment).is_ok()
            || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
    };
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let collapse = (previous == "jobs" && !segment.is_empty()) || is_id(segment);
            previous = segment;
            if collapse {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

/// Counts and times every request by method, route and status.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().as_str().to_owned();
    let route = route_label(request.uri().path());
    let started = Instant::now();

    let response = {
        let _in_flight = InFlight::enter();
        next.run(request).await
    };

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_collapses_ids() {
        assert_eq!(
            route_label("/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/jobs/:id"
        );
        assert_eq!(route_label("/api/v1/jobs/42"), "/api/v1/jobs/:id");
        assert_eq!(route_label("/api/v1/jobs"), "/api/v1/jobs");
        assert_eq!(route_label("/api/v1/jobs/"), "/api/v1/jobs/");
    }

    #[test]
    fn test_route_label_collapses_arbitrary_job_ids() {
        assert_eq!(route_label("/api/v1/jobs/abc123"), "/api/v1/jobs/:id");
        assert_eq!(route_label("/api/v1/jobs/zz-not-a-uuid"), "/api/v1/jobs/:id");
        assert_eq!(route_label("/api/v1/health"), "/api/v1/health");
    }
}
