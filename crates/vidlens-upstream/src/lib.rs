//! Resilient client for the remote video inference provider.
//!
//! - [`OpenRouterProvider`]: chat-completions calls over reqwest
//! - [`RetryPolicy`]: exponential backoff with jitter for transient failures
//! - [`CircuitBreaker`]: fail-fast guard shared by all workers
//! - [`HttpMediaProbe`]: `HEAD` reachability check for video references
//! - [`UpstreamClient`]: the three above composed into `analyze`

pub mod breaker;
pub mod client;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod prompt;
pub mod provider;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerPermit, CircuitBreaker, CircuitState};
pub use client::UpstreamClient;
pub use error::{UpstreamError, UpstreamResult};
pub use probe::{HttpMediaProbe, MediaProbe, ProbeConfig};
pub use prompt::build_analysis_prompt;
pub use provider::{
    InferenceProvider, InferenceRequest, InferenceResponse, OpenRouterProvider, UpstreamConfig,
};
pub use retry::RetryPolicy;
