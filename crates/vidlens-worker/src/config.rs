//! Worker tuning knobs.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed concurrently by one worker
    pub max_concurrent_jobs: usize,
    /// Grace period for in-flight jobs after a shutdown request
    pub shutdown_timeout: Duration,
    /// Blocking wait of a single consume call
    pub consume_block: Duration,
    /// Period of the orphaned-delivery scan
    pub claim_interval: Duration,
    /// Deliveries idle at least this long may be taken over from a dead consumer
    pub claim_min_idle: Duration,
    /// A job processing longer than this is failed as stalled
    pub stall_timeout: Duration,
    pub reconcile_interval: Duration,
    /// Serve Prometheus text on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(30),
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(10 * 60),
            stall_timeout: Duration::from_secs(15 * 60),
            reconcile_interval: Duration::from_secs(60),
            metrics_port: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse(key).map(Duration::from_secs)
}

impl WorkerConfig {
    /// Overlay `WORKER_*` variables on the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|&jobs: &usize| jobs > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT")
                .unwrap_or(defaults.shutdown_timeout),
            consume_block: defaults.consume_block,
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS")
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS")
                .unwrap_or(defaults.claim_min_idle),
            stall_timeout: env_secs("WORKER_STALL_TIMEOUT_SECS")
                .unwrap_or(defaults.stall_timeout),
            reconcile_interval: env_secs("WORKER_RECONCILE_INTERVAL_SECS")
                .unwrap_or(defaults.reconcile_interval),
            metrics_port: env_parse("WORKER_METRICS_PORT"),
        }
    }
}
