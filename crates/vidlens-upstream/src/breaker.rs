//! Circuit breaker for provider calls.
//!
//! Shared by every worker in the process. After `failure_threshold`
//! consecutive failures inside `failure_window` the circuit opens and calls
//! fail fast with `Unreachable`. Once `cooldown` elapses a single probe is
//! let through; its outcome closes or re-opens the circuit.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{UpstreamError, UpstreamResult};
use crate::metrics::{record_breaker_rejection, record_breaker_state};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Window in which the failures must happen
    pub failure_window: Duration,
    /// Time spent open before a probe is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            failure_threshold: std::env::var("BREAKER_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.failure_threshold),
            failure_window: std::env::var("BREAKER_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.failure_window),
            cooldown: std::env::var("BREAKER_COOLDOWN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
        }
    }
}

/// Circuit breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed (normal operation)
    Closed,
    /// Circuit is open (failing fast)
    Open { opened_at: Instant },
    /// Circuit is half-open (testing recovery)
    HalfOpen { probe_in_flight: bool },
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen { .. } => 1.0,
            CircuitState::Open { .. } => 2.0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    streak_started_at: Option<Instant>,
}

/// Circuit breaker guarding the inference provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                streak_started_at: None,
            }),
            config,
        }
    }

    /// Get current state for monitoring.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make a call.
    ///
    /// Returns a permit whose outcome must be reported, or an `Unreachable`
    /// error when the circuit is open or the half-open probe is taken.
    pub fn acquire(&self) -> UpstreamResult<BreakerPermit<'_>> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::Open { opened_at } => {
                let elapsed = now.duration_since(opened_at);
                if elapsed >= self.config.cooldown {
                    self.transition(&mut inner, CircuitState::HalfOpen { probe_in_flight: true });
                    info!("Circuit breaker half-open, letting one probe through");
                    Ok(BreakerPermit::new(self, true))
                } else {
                    record_breaker_rejection();
                    Err(UpstreamError::unreachable("Circuit breaker is open")
                        .with_retry_after(Some(self.config.cooldown - elapsed)))
                }
            }
            CircuitState::HalfOpen { probe_in_flight: true } => {
                record_breaker_rejection();
                Err(UpstreamError::unreachable(
                    "Circuit breaker is half-open and a probe is in flight",
                ))
            }
            CircuitState::HalfOpen { probe_in_flight: false } => {
                inner.state = CircuitState::HalfOpen { probe_in_flight: true };
                Ok(BreakerPermit::new(self, true))
            }
        }
    }

    /// Run `op` through the breaker, reporting its outcome.
    pub async fn call<T, F, Fut>(&self, op: F) -> UpstreamResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let permit = self.acquire()?;
        let result = op().await;
        match &result {
            Err(e) if e.counts_against_breaker() => permit.failure(),
            _ => permit.success(),
        }
        result
    }

    /// Only the probe may move a half-open circuit. Outcomes of calls admitted
    /// while closed are ignored once the circuit has left `Closed`.
    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        match (inner.state, probe) {
            (CircuitState::HalfOpen { .. }, true) => {
                self.transition(&mut inner, CircuitState::Closed);
                info!("Circuit breaker closed after successful probe");
            }
            (CircuitState::Closed, _) => {
                inner.consecutive_failures = 0;
                inner.streak_started_at = None;
            }
            _ => {}
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match (inner.state, probe) {
            (CircuitState::HalfOpen { .. }, true) => {
                self.transition(&mut inner, CircuitState::Open { opened_at: now });
                warn!("Circuit breaker probe failed, re-opening");
            }
            (CircuitState::Closed, _) => {
                let streak_expired = inner
                    .streak_started_at
                    .map_or(true, |start| now.duration_since(start) > self.config.failure_window);
                if streak_expired {
                    inner.consecutive_failures = 1;
                    inner.streak_started_at = Some(now);
                } else {
                    inner.consecutive_failures += 1;
                }

                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Circuit breaker opened"
                    );
                    self.transition(&mut inner, CircuitState::Open { opened_at: now });
                }
            }
            _ => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if let CircuitState::HalfOpen { probe_in_flight: true } = inner.state {
            inner.state = CircuitState::HalfOpen { probe_in_flight: false };
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        inner.state = to;
        if to == CircuitState::Closed || matches!(to, CircuitState::Open { .. }) {
            inner.consecutive_failures = 0;
            inner.streak_started_at = None;
        }
        record_breaker_state(to.gauge_value());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Admission to make one call. Report the outcome with
/// [`success`](Self::success) or [`failure`](Self::failure); dropping an
/// unreported probe frees the half-open slot.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}
