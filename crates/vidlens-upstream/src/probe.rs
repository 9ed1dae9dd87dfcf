//! Reachability probe for video references.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};
use vidlens_models::{validate_reference, video_format, VideoMetadata};

use crate::error::{UpstreamError, UpstreamResult};

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for the HEAD request
    pub timeout: Duration,
    /// Largest accepted video, in bytes
    pub max_video_bytes: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_video_bytes: 500 * 1024 * 1024,
        }
    }
}

impl ProbeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let max_mb: u64 = std::env::var("MAX_VIDEO_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        Self {
            timeout: Duration::from_secs(
                std::env::var("PROBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_video_bytes: max_mb * 1024 * 1024,
        }
    }
}

/// Checks that a video reference can be fetched before it is sent upstream.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe `reference`. Every failure is reported as `InvalidInput`.
    async fn probe(&self, reference: &str) -> UpstreamResult<VideoMetadata>;
}

/// Probe that issues an HTTP `HEAD` against the reference.
pub struct HttpMediaProbe {
    http: Client,
    config: ProbeConfig,
}

impl HttpMediaProbe {
    pub fn new(config: ProbeConfig) -> UpstreamResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::provider_fault(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl MediaProbe for HttpMediaProbe {
    async fn probe(&self, reference: &str) -> UpstreamResult<VideoMetadata> {
        let url = validate_reference(reference).map_err(|e| UpstreamError::invalid_input(e.to_string()))?;
        let format = video_format(&url).unwrap_or_default();

        debug!(reference = %reference, "Probing video reference");

        let response = self.http.head(url).send().await.map_err(|e| {
            warn!(reference = %reference, "Video reference not reachable: {}", e);
            UpstreamError::invalid_input(format!("Video is not reachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::invalid_input(format!(
                "Video is not accessible (HTTP {})",
                status.as_u16()
            )));
        }

        // HEAD bodies are empty, so read the header rather than the body size hint.
        let size_bytes = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        if let Some(size) = size_bytes {
            if size > self.config.max_video_bytes {
                return Err(UpstreamError::invalid_input(format!(
                    "Video too large: {:.1}MB (max: {}MB)",
                    size as f64 / (1024.0 * 1024.0),
                    self.config.max_video_bytes / (1024 * 1024)
                )));
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(VideoMetadata {
            format,
            size_bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidlens_models::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe(max_video_bytes: u64) -> HttpMediaProbe {
        HttpMediaProbe::new(ProbeConfig {
            timeout: Duration::from_secs(2),
            max_video_bytes,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_reachable_video() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/a.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .insert_header("content-length", "64")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(&server)
            .await;

        let metadata = probe(1024)
            .probe(&format!("{}/a.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(metadata.format, "mp4");
        assert_eq!(metadata.size_bytes, Some(64));
        assert_eq!(metadata.content_type.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn test_missing_video_is_invalid_input() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = probe(1024)
            .probe(&format!("{}/gone.mp4", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_oversized_video_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "4096")
                    .set_body_bytes(vec![0u8; 4096]),
            )
            .mount(&server)
            .await;

        let err = probe(1024)
            .probe(&format!("{}/big.mkv", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(err.message.contains("too large"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_invalid_input() {
        let err = probe(1024)
            .probe("http://127.0.0.1:1/a.mp4")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_before_request() {
        let err = probe(1024).probe("http://host/a.gif").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
}
