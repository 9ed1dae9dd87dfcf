//! Video analysis worker binary.

use std::sync::Arc;

use anyhow::{bail, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidlens_queue::{JobStore, RedisJobStore, RedisTaskQueue, TaskQueue};
use vidlens_upstream::{
    BreakerConfig, CircuitBreaker, HttpMediaProbe, OpenRouterProvider, ProbeConfig, RetryPolicy,
    UpstreamClient, UpstreamConfig,
};
use vidlens_worker::{JobExecutor, JobProcessor, StallReconciler, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidlens=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting vidlens-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let upstream_config = UpstreamConfig::from_env();
    if upstream_config.api_key.trim().is_empty() {
        bail!("OPENROUTER_API_KEY must be set");
    }

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to start Prometheus exporter")?;
        info!("Metrics exporter listening on port {}", port);
    }

    let store: Arc<dyn JobStore> =
        Arc::new(RedisJobStore::from_env().context("Failed to create job store")?);
    let queue: Arc<dyn TaskQueue> =
        Arc::new(RedisTaskQueue::from_env().context("Failed to create task queue")?);

    let provider = OpenRouterProvider::new(upstream_config)
        .context("Failed to create inference provider")?;
    info!("Using model {}", provider.model());

    let probe = HttpMediaProbe::new(ProbeConfig::from_env())
        .context("Failed to create media probe")?;
    let client = UpstreamClient::new(
        Arc::new(provider),
        Arc::new(CircuitBreaker::new(BreakerConfig::from_env())),
        RetryPolicy::from_env(),
    );

    let processor = JobProcessor::new(Arc::clone(&store), Arc::new(probe), client);
    let executor = Arc::new(JobExecutor::new(config.clone(), queue, processor));

    let (reconciler_tx, reconciler_rx) = tokio::sync::watch::channel(false);
    let reconciler = StallReconciler::new(store, config.stall_timeout, config.reconcile_interval);
    let reconciler_task = tokio::spawn(async move { reconciler.run(reconciler_rx).await });

    let signal_task = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal");
            executor.shutdown();
        })
    };

    let result = executor.run().await;

    reconciler_tx.send(true).ok();
    reconciler_task.await.ok();
    signal_task.abort();

    result.context("Executor failed")
}
