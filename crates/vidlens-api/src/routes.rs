//! Route table and layer stack.

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::dto::API_PREFIX;
use crate::handlers::{cancel_job, get_job, health, list_jobs, ready, submit_job};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, request_id, request_logging, security_headers, throttle, ClientThrottle,
};
use crate::state::AppState;

/// Everything lives under `/api/v1`. Only the job routes are throttled, and
/// `/metrics` is mounted only when a Prometheus handle is supplied.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let config = state.config.clone();
    let client_throttle = Arc::new(ClientThrottle::new(
        config.rate_limit_rps,
        config.rate_limit_burst,
    ));

    let mut v1 = Router::new()
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:job_id", get(get_job).delete(cancel_job))
        .route_layer(from_fn_with_state(client_throttle, throttle))
        .route("/health", get(health))
        .route("/ready", get(ready));

    if let Some(handle) = metrics_handle {
        v1 = v1.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    // Outermost layer last: CORS sees the request first
    Router::new()
        .nest(API_PREFIX, v1)
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers))
        .layer(from_fn(request_logging))
        .layer(from_fn(request_id))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}
