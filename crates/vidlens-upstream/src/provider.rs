//! Inference provider seam and the OpenRouter implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{UpstreamError, UpstreamResult};
use crate::prompt::SYSTEM_PROMPT;

/// Retry-After assumed when a 429 response carries none.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// One analysis request sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Publicly fetchable video URL
    pub video_url: String,
    /// User prompt
    pub prompt: String,
}

/// Provider response for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    /// Markdown produced by the model
    pub content: String,
    /// Model that served the call
    pub model: String,
    /// Total tokens reported by the provider
    pub tokens_used: u64,
}

/// A remote multimodal model able to analyze a video.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name recorded on results.
    fn name(&self) -> &str;

    /// Make one call. Retrying is the caller's business.
    async fn complete(&self, request: &InferenceRequest) -> UpstreamResult<InferenceResponse>;
}

// =============================================================================
// Configuration
// =============================================================================

/// OpenRouter client configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Sent as `X-Title`
    pub app_name: String,
    /// Sent as `HTTP-Referer`
    pub app_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "nvidia/nemotron-nano-12b-v2-vl:free".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout: Duration::from_secs(120),
            max_tokens: 4000,
            temperature: 0.7,
            app_name: "Vidlens".to_string(),
            app_url: "http://localhost:8000".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            model: std::env::var("OPENROUTER_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("OPENROUTER_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_tokens: std::env::var("OPENROUTER_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("OPENROUTER_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            app_name: std::env::var("APP_NAME").unwrap_or(defaults.app_name),
            app_url: std::env::var("APP_URL").unwrap_or(defaults.app_url),
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    VideoUrl { video_url: MediaUrl<'a> },
}

#[derive(Debug, Serialize)]
struct MediaUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

// =============================================================================
// Client
// =============================================================================

/// OpenRouter chat-completions client.
pub struct OpenRouterProvider {
    http: Client,
    config: UpstreamConfig,
}

impl OpenRouterProvider {
    /// Create a new provider client.
    pub fn new(config: UpstreamConfig) -> UpstreamResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::provider_fault(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Model used for requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> UpstreamError {
    let message = format!("Provider returned {}: {}", status, truncate(body, 500));
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            UpstreamError::rate_limited(message, Some(retry_after.unwrap_or(DEFAULT_RETRY_AFTER)))
        }
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => UpstreamError::invalid_input(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => UpstreamError::timeout(message),
        _ => UpstreamError::provider_fault(message),
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl InferenceProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &InferenceRequest) -> UpstreamResult<InferenceResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT),
                },
                Message {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: &request.prompt,
                        },
                        ContentPart::VideoUrl {
                            video_url: MediaUrl {
                                url: &request.video_url,
                            },
                        },
                    ]),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(url = %url, model = %self.config.model, "Sending analysis request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.app_url)
            .header("X-Title", &self.config.app_name)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = UpstreamError::from_transport(&e);
                error!(kind = %err.kind, "Provider request failed: {}", e);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let err = classify_status(status, &text, retry_after);
            warn!(status = status.as_u16(), kind = %err.kind, "Provider returned an error");
            return Err(err);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::provider_fault(format!("Failed to parse provider response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| UpstreamError::provider_fault("Provider returned no analysis content"))?;

        let tokens_used = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);

        info!(tokens_used, "Provider analysis received");

        Ok(InferenceResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            tokens_used,
        })
    }
}
