//! Resilient analysis client: provider calls wrapped in retry and a circuit breaker.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use vidlens_models::{
    video_format, AiProviderInfo, Analysis, AnalysisOptions, AnalysisResult, VideoMetadata,
};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::error::UpstreamResult;
use crate::metrics::record_request;
use crate::prompt::build_analysis_prompt;
use crate::provider::{InferenceProvider, InferenceRequest};
use crate::retry::RetryPolicy;

const OPERATION: &str = "analyze_video";

/// Client used by the job processor to analyze videos.
#[derive(Clone)]
pub struct UpstreamClient {
    provider: Arc<dyn InferenceProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            breaker,
            retry,
        }
    }

    /// Current breaker state.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Analyze the video at `reference`.
    ///
    /// `custom_prompt` replaces the prompt derived from `options`. Retries run
    /// inside the breaker, so one logical call reports one outcome to it.
    pub async fn analyze(
        &self,
        reference: &str,
        options: &AnalysisOptions,
        custom_prompt: Option<&str>,
    ) -> UpstreamResult<AnalysisResult> {
        let prompt = match custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
            Some(custom) => custom.to_string(),
            None => build_analysis_prompt(options),
        };

        let request = InferenceRequest {
            video_url: reference.to_string(),
            prompt,
        };

        let start = Instant::now();
        let result = self
            .breaker
            .call(|| {
                self.retry
                    .run(OPERATION, || self.provider.complete(&request))
            })
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) => {
                record_request("success", elapsed_ms as f64);
                response
            }
            Err(e) => {
                record_request(e.kind.as_str(), elapsed_ms as f64);
                warn!(kind = %e.kind, elapsed_ms, "Video analysis failed: {}", e.message);
                return Err(e);
            }
        };

        info!(
            model = %response.model,
            tokens_used = response.tokens_used,
            elapsed_ms,
            "Video analysis completed"
        );

        let format = reqwest::Url::parse(reference)
            .ok()
            .and_then(|url| video_format(&url))
            .unwrap_or_default();

        Ok(AnalysisResult {
            video_metadata: VideoMetadata {
                format,
                ..Default::default()
            },
            analysis: Analysis::from_markdown(response.content, Some(options.language.clone())),
            ai_provider: AiProviderInfo {
                provider: self.provider.name().to_string(),
                model: response.model,
                tokens_used: response.tokens_used,
                processing_time_ms: elapsed_ms,
            },
        })
    }
}
