//! Scripted upstream fakes shared by the worker tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vidlens_models::VideoMetadata;
use vidlens_queue::JobStore;
use vidlens_upstream::{
    BreakerConfig, CircuitBreaker, InferenceProvider, InferenceRequest, InferenceResponse,
    MediaProbe, RetryPolicy, UpstreamClient, UpstreamError, UpstreamResult,
};

use crate::processor::JobProcessor;

type Hook = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Provider that replays a script of outcomes.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<UpstreamResult<InferenceResponse>>>,
    calls: Mutex<usize>,
    hook: Mutex<Option<Arc<Hook>>>,
    panics: bool,
}

impl ScriptedProvider {
    pub fn new(script: Vec<UpstreamResult<InferenceResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
            hook: Mutex::new(None),
            panics: false,
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
            hook: Mutex::new(None),
            panics: true,
        })
    }

    /// Run `hook` at the start of every call.
    pub fn on_call<F>(&self, hook: F)
    where
        F: Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap() = Some(Arc::new(Box::new(hook)));
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &InferenceRequest) -> UpstreamResult<InferenceResponse> {
        *self.calls.lock().unwrap() += 1;

        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook().await;
        }

        if self.panics {
            panic!("provider blew up");
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::provider_fault("script exhausted")))
    }
}

/// Fixed probe answer.
#[derive(Debug, Clone, Copy)]
pub enum ProbeScript {
    Reachable,
    Unreachable,
}

#[async_trait]
impl MediaProbe for ProbeScript {
    async fn probe(&self, _reference: &str) -> UpstreamResult<VideoMetadata> {
        match self {
            ProbeScript::Reachable => Ok(VideoMetadata {
                format: "mp4".into(),
                size_bytes: Some(1_048_576),
                content_type: Some("video/mp4".into()),
            }),
            ProbeScript::Unreachable => Err(UpstreamError::invalid_input(
                "Video URL is not accessible (HTTP 404)",
            )),
        }
    }
}

pub fn client_with(provider: Arc<ScriptedProvider>) -> UpstreamClient {
    UpstreamClient::new(
        provider,
        Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 100,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
        })),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
    )
}

pub fn processor_with(
    store: Arc<dyn JobStore>,
    probe: ProbeScript,
    provider: Arc<ScriptedProvider>,
) -> JobProcessor {
    JobProcessor::new(store, Arc::new(probe), client_with(provider))
}
