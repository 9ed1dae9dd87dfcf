//! End-to-end job lifecycle over the HTTP surface with in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use vidlens_api::{create_router, ApiConfig, AppState};
use vidlens_models::JobId;
use vidlens_queue::{JobStore, MemoryJobStore, MemoryTaskQueue, TaskQueue};
use vidlens_upstream::{InferenceResponse, UpstreamError, UpstreamResult};
use vidlens_worker::testing::{processor_with, ProbeScript, ScriptedProvider};
use vidlens_worker::{JobExecutor, ProcessOutcome, SkipReason, WorkerConfig};

struct Harness {
    app: Router,
    store: Arc<MemoryJobStore>,
    queue: Arc<MemoryTaskQueue>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryJobStore::default());
    let queue = Arc::new(MemoryTaskQueue::default());
    let state = AppState::new(ApiConfig::default(), store.clone(), queue.clone());
    Harness {
        app: create_router(state, None),
        store,
        queue,
    }
}

fn analysis() -> UpstreamResult<InferenceResponse> {
    Ok(InferenceResponse {
        content: "# Video Analysis\n\n## Summary\nA chef cooks pasta.".into(),
        model: "test-model".into(),
        tokens_used: 321,
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn submit(app: &Router, url: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/jobs",
        Some(json!({ "video_url": url })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {}", body);
    body["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_submit_process_and_poll_to_completion() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/v1/jobs",
        Some(json!({
            "video_url": "http://host/a.mp4",
            "options": { "analysis_depth": "detailed", "detect_sentiment": true }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["estimated_time_seconds"], 180);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["_links"]["self"], format!("/api/v1/jobs/{}", job_id));

    let (_, pending) = send(&h.app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(pending["status"], "pending");

    let processor = processor_with(
        h.store.clone(),
        ProbeScript::Reachable,
        ScriptedProvider::new(vec![analysis()]),
    );
    let config = WorkerConfig {
        consume_block: Duration::from_millis(20),
        ..WorkerConfig::default()
    };
    let executor = Arc::new(JobExecutor::new(config, h.queue.clone(), processor));
    let runner = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run().await })
    };

    let mut view = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&h.app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
        if body["status"] == "completed" {
            view = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    executor.shutdown();
    runner.await.unwrap().unwrap();

    assert_eq!(view["status"], "completed", "job never completed");
    assert_eq!(view["result"]["ai_provider"]["tokens_used"], 321);
    assert_eq!(view["result"]["video_metadata"]["format"], "mp4");
    assert!(!view["result"]["analysis"]["markdown"].as_str().unwrap().is_empty());
    assert!(view.get("error").is_none());
    assert!(view["_links"].get("cancel").is_none());

    let job = h.store.get(&JobId::from(job_id.as_str())).await.unwrap();
    assert!(job.completed_at.unwrap() > job.created_at);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_reference_fails_with_invalid_input() {
    let h = harness();
    let job_id = submit(&h.app, "http://gone.example/missing.mp4").await;

    let processor = processor_with(
        h.store.clone(),
        ProbeScript::Unreachable,
        ScriptedProvider::new(vec![]),
    );
    let outcome = processor.process(&JobId::from(job_id.as_str())).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Failed(_)));

    let (status, body) = send(&h.app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["kind"], "invalid_input");
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_upstream_rate_limit_is_reported_on_the_job() {
    let h = harness();
    let job_id = submit(&h.app, "http://host/busy.mkv").await;

    let limited = || Err(UpstreamError::rate_limited("quota", Some(Duration::from_millis(5))));
    let processor = processor_with(
        h.store.clone(),
        ProbeScript::Reachable,
        ScriptedProvider::new(vec![limited(), limited(), limited()]),
    );
    processor.process(&JobId::from(job_id.as_str())).await.unwrap();

    let (_, body) = send(&h.app, Method::GET, &format!("/api/v1/jobs/{}", job_id), None).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["kind"], "rate_limited");
}

#[tokio::test]
async fn test_cancel_pending_job_prevents_processing() {
    let h = harness();
    let job_id = submit(&h.app, "https://host/talk.webm").await;
    let uri = format!("/api/v1/jobs/{}", job_id);

    let (status, _) = send(&h.app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let provider = ScriptedProvider::new(vec![analysis()]);
    let processor = processor_with(h.store.clone(), ProbeScript::Reachable, provider.clone());
    let outcome = processor.process(&JobId::from(job_id.as_str())).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Skipped(SkipReason::Cancelled));
    assert_eq!(provider.call_count(), 0);

    let (_, body) = send(&h.app, Method::GET, &uri, None).await;
    assert_eq!(body["status"], "cancelled");
    assert!(body.get("started_at").is_none());

    let (status, body) = send(&h.app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_unknown_job_returns_404() {
    let h = harness();
    let uri = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";

    let (status, body) = send(&h.app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(&h.app, Method::DELETE, uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_submissions_return_400() {
    let h = harness();

    for body in [
        json!({ "video_url": "ftp://host/a.mp4" }),
        json!({ "video_url": "http://host/a.txt" }),
        json!({ "video_url": "" }),
        json!({ "video_url": "http://host/a.mp4", "options": { "language": "pt_br" } }),
    ] {
        let (status, response) = send(&h.app, Method::POST, "/api/v1/jobs", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "response: {}", response);
        assert_eq!(response["code"], "invalid_input");
    }

    assert_eq!(h.store.len().await, 0);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let h = harness();

    for (content_type, raw) in [
        (Some("application/json"), "{not json"),
        (Some("application/json"), r#"{"video_url": 5}"#),
        (Some("application/json"), r#"{"options": {}}"#),
        (None, r#"{"video_url": "http://host/a.mp4"}"#),
    ] {
        let mut builder = Request::builder().method(Method::POST).uri("/api/v1/jobs");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = h
            .app
            .clone()
            .oneshot(builder.body(Body::from(raw)).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", raw);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "invalid_input");
        assert!(body["detail"].as_str().is_some_and(|d| !d.is_empty()));
    }

    assert_eq!(h.store.len().await, 0);
}

#[tokio::test]
async fn test_list_jobs_newest_first() {
    let h = harness();
    let first = submit(&h.app, "http://host/1.mp4").await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    let second = submit(&h.app, "http://host/2.mp4").await;

    let (status, body) = send(&h.app, Method::GET, "/api/v1/jobs?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["jobs"][0]["job_id"], second.as_str());
    assert_eq!(body["jobs"][1]["job_id"], first.as_str());

    let (_, body) = send(&h.app, Method::GET, "/api/v1/jobs?limit=1", None).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_health_and_ready() {
    let h = harness();

    let (status, body) = send(&h.app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&h.app, Method::GET, "/api/v1/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["store"]["status"], "ok");
    assert_eq!(body["checks"]["queue"]["status"], "ok");
}
