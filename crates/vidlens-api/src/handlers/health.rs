//! Liveness and readiness probes.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::set_queue_length;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Answers as long as the process serves HTTP.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct DependencyCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyCheck {
    fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Serialize)]
pub struct Dependencies {
    pub store: DependencyCheck,
    pub queue: DependencyCheck,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: Dependencies,
}

async fn timed<T, E: std::fmt::Display>(
    call: impl Future<Output = Result<T, E>>,
) -> (DependencyCheck, Option<T>) {
    let started = Instant::now();
    match call.await {
        Ok(value) => (
            DependencyCheck {
                status: "ok",
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Some(value),
        ),
        Err(e) => (
            DependencyCheck {
                status: "error",
                latency_ms: None,
                error: Some(e.to_string()),
            },
            None,
        ),
    }
}

/// 200 when both the job store and the task queue answer, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let (store, _) = timed(state.store.ping()).await;
    let (queue, depth) = timed(state.queue.len()).await;
    if let Some(depth) = depth {
        set_queue_length(depth);
    }

    let ready = store.passed() && queue.passed();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadinessResponse {
        status: if ready { "ready" } else { "degraded" },
        checks: Dependencies { store, queue },
    };
    (code, Json(body))
}
