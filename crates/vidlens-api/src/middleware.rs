//! Request middleware: client throttling, request ids, access logs and headers.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::Json;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Buckets idle longer than this are forgotten.
const BUCKET_IDLE_TTL: Duration = Duration::from_secs(3600);
/// Upper bound on tracked clients.
const MAX_TRACKED_CLIENTS: usize = 10_000;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct TrackedBucket {
    bucket: Arc<Bucket>,
    last_seen: Instant,
}

/// One token bucket per client address.
pub struct ClientThrottle {
    quota: Quota,
    clients: Mutex<HashMap<IpAddr, TrackedBucket>>,
}

impl ClientThrottle {
    pub fn new(per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        Self {
            quota: Quota::per_second(rate).allow_burst(burst),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `client`; false when its bucket is empty.
    pub async fn admit(&self, client: IpAddr) -> bool {
        let bucket = {
            let mut clients = self.clients.lock().await;
            let now = Instant::now();
            if !clients.contains_key(&client) && clients.len() >= MAX_TRACKED_CLIENTS {
                Self::evict(&mut clients, now);
            }
            let entry = clients.entry(client).or_insert_with(|| TrackedBucket {
                bucket: Arc::new(RateLimiter::direct(self.quota)),
                last_seen: now,
            });
            entry.last_seen = now;
            Arc::clone(&entry.bucket)
        };
        bucket.check().is_ok()
    }

    fn evict(clients: &mut HashMap<IpAddr, TrackedBucket>, now: Instant) {
        clients.retain(|_, tracked| now.duration_since(tracked.last_seen) < BUCKET_IDLE_TTL);
        if clients.len() < MAX_TRACKED_CLIENTS {
            return;
        }

        let mut by_age: Vec<(IpAddr, Instant)> = clients
            .iter()
            .map(|(addr, tracked)| (*addr, tracked.last_seen))
            .collect();
        by_age.sort_unstable_by_key(|(_, seen)| *seen);
        let excess = clients.len() + 1 - MAX_TRACKED_CLIENTS;
        for (addr, _) in by_age.into_iter().take(excess) {
            clients.remove(&addr);
        }
        warn!(evicted = excess, "Client throttle table full");
    }
}

/// Rejects requests with 429 once the caller's bucket is drained.
pub async fn throttle(
    State(throttle): State<Arc<ClientThrottle>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(client) = client_addr(&request) else {
        return next.run(request).await;
    };

    if throttle.admit(client).await {
        return next.run(request).await;
    }

    warn!(client = %client, path = request.uri().path(), "Client throttled");
    metrics::record_rate_limit_hit(request.uri().path());
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "1")],
        Json(json!({
            "code": "rate_limited",
            "detail": "Too many requests, slow down and retry shortly.",
        })),
    )
        .into_response()
}

/// Caller address: leftmost `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_addr(request: &Request<Body>) -> Option<IpAddr> {
    let headers = request.headers();
    header_ip(headers, "x-forwarded-for", |v| v.split(',').next())
        .or_else(|| header_ip(headers, "x-real-ip", |v| Some(v)))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip())
        })
}

fn header_ip(
    headers: &HeaderMap,
    name: &str,
    pick: impl Fn(&str) -> Option<&str>,
) -> Option<IpAddr> {
    let raw = headers.get(name)?.to_str().ok()?;
    pick(raw)?.trim().parse().ok()
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    // Credentialed CORS needs explicit header and method lists
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    base.allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ORIGIN,
        ])
}

pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    const FIXED: [(&str, &str); 4] = [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("referrer-policy", "no-referrer"),
        ("cross-origin-resource-policy", "same-origin"),
    ];

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in FIXED {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Correlation id carried in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Reuses a sane inbound `X-Request-ID` or mints one, and echoes it back.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let echoed = HeaderValue::from_str(&id).ok();
    request.extensions_mut().insert(RequestId(id));

    let mut response = next.run(request).await;
    if let Some(value) = echoed {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// One access log line per request; probes are not logged.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let path = request.uri().path().to_owned();
    if path.ends_with("/health") || path.ends_with("/ready") {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|RequestId(id)| id.clone())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        %request_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_throttle_drains_burst_per_client() {
        let throttle = ClientThrottle::new(1, 2);
        let noisy: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(throttle.admit(noisy).await);
        assert!(throttle.admit(noisy).await);
        assert!(!throttle.admit(noisy).await);

        assert!(throttle.admit("10.0.0.2".parse().unwrap()).await);
    }

    #[test]
    fn test_client_addr_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_addr(&request), Some("203.0.113.7".parse().unwrap()));

        let real_ip_only = Request::builder()
            .header("X-Real-IP", "198.51.100.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_addr(&real_ip_only), Some("198.51.100.1".parse().unwrap()));

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_addr(&bare), None);
    }
}
