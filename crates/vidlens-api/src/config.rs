//! Server settings read from the process environment.

use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin without credentials
    pub cors_origins: Vec<String>,
    /// Token refill rate of each client's bucket
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    pub request_timeout: Duration,
    /// Bytes
    pub max_body_size: usize,
    pub environment: String,
    /// Reported to clients while a job is pending
    pub estimated_processing_secs: u64,
    /// Serve Prometheus text at `/api/v1/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec!["*".into()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1 << 20,
            environment: "development".into(),
            estimated_processing_secs: 180,
            metrics_enabled: true,
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

impl ApiConfig {
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(base.host),
            port: parsed("API_PORT").unwrap_or(base.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(base.cors_origins),
            rate_limit_rps: parsed("RATE_LIMIT_RPS").unwrap_or(base.rate_limit_rps),
            rate_limit_burst: parsed("RATE_LIMIT_BURST").unwrap_or(base.rate_limit_burst),
            request_timeout: parsed("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(base.request_timeout),
            max_body_size: parsed("MAX_BODY_SIZE").unwrap_or(base.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(base.environment),
            estimated_processing_secs: parsed("ESTIMATED_PROCESSING_SECS")
                .unwrap_or(base.estimated_processing_secs),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|flag| matches!(flag.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(base.metrics_enabled),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
