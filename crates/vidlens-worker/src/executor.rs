//! Task executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vidlens_queue::{Delivery, TaskQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::record_dead_lettered;
use crate::processor::JobProcessor;

/// Executor that feeds queued tasks to the job processor.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<dyn TaskQueue>,
    processor: JobProcessor,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: Arc<dyn TaskQueue>, processor: JobProcessor) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            processor,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically take over tasks left pending by crashed consumers
        let claim_task = {
            let queue = Arc::clone(&self.queue);
            let processor = self.processor.clone();
            let semaphore = Arc::clone(&self.job_semaphore);
            let consumer_name = self.consumer_name.clone();
            let claim_interval = self.config.claim_interval;
            let min_idle = self.config.claim_min_idle;
            let mut shutdown_rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(claim_interval);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            match queue.claim_pending(&consumer_name, min_idle, 5).await {
                                Ok(deliveries) if !deliveries.is_empty() => {
                                    info!("Claimed {} pending tasks", deliveries.len());
                                    for delivery in deliveries {
                                        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                            break;
                                        };
                                        let queue = Arc::clone(&queue);
                                        let processor = processor.clone();
                                        tokio::spawn(async move {
                                            let _permit = permit;
                                            Self::execute(&processor, queue.as_ref(), delivery).await;
                                        });
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => warn!("Failed to claim pending tasks: {}", e),
                            }
                        }
                    }
                }
            })
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_tasks() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be redelivered",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume tasks up to the number of free slots.
    async fn consume_tasks(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(&self.consumer_name, self.config.consume_block, available.min(5))
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} tasks from queue", deliveries.len());

        for delivery in deliveries {
            let queue = Arc::clone(&self.queue);
            let processor = self.processor.clone();
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::ShuttingDown)?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute(&processor, queue.as_ref(), delivery).await;
            });
        }

        Ok(())
    }

    /// Process one delivery, then ack it or schedule redelivery.
    ///
    /// Job-level failures are already recorded by the processor, so only
    /// infrastructure errors count toward the retry limit.
    pub(crate) async fn execute(processor: &JobProcessor, queue: &dyn TaskQueue, delivery: Delivery) {
        let job_id = delivery.task.job_id.clone();
        let logger = JobLogger::new(&job_id, "execute_task");

        match processor.process(&job_id).await {
            Ok(outcome) => {
                debug!(job_id = %job_id, ?outcome, "Task finished");
                if let Err(e) = queue.ack(&delivery.message_id).await {
                    logger.log_error(&format!("Failed to ack task: {}", e));
                }
            }
            Err(e) => {
                logger.log_error(&e.to_string());

                let retry_count = match queue.increment_retry(&delivery.message_id).await {
                    Ok(count) => count,
                    Err(counter_err) => {
                        warn!(job_id = %job_id, "Failed to bump retry counter: {}", counter_err);
                        u32::MAX
                    }
                };
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        job_id = %job_id,
                        "Task exceeded max retries ({}), moving to DLQ", max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&delivery, &e.to_string()).await {
                        error!(job_id = %job_id, "Failed to move task to DLQ: {}", dlq_err);
                    }
                    record_dead_lettered();

                    let message = format!("Job failed after {} attempts: {}", max_retries, e);
                    if let Err(fail_err) = processor.fail_abandoned(&job_id, &message).await {
                        warn!(job_id = %job_id, "Could not mark abandoned job failed: {}", fail_err);
                    }
                } else {
                    info!(
                        job_id = %job_id,
                        "Task will be retried (attempt {}/{})", retry_count, max_retries
                    );
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
