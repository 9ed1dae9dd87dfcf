//! Redis Streams backend.
//!
//! Tasks are `XADD`ed with a JSON `task` field and read through a consumer
//! group. Acknowledged entries are deleted from the stream so `XLEN` reports
//! outstanding work. Redelivery counts live in `{stream}:retry:{id}` keys.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::{AnalyzeVideoTask, Delivery, QueueConfig, TaskQueue};
use crate::error::{QueueError, QueueResult};

/// Retry counters outlive any sane redelivery window.
const RETRY_COUNTER_TTL_SECS: i64 = 24 * 60 * 60;

pub struct RedisTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisTaskQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Entries parked in the dead-letter stream.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.config.stream_name, message_id)
    }

    /// Turn raw entries into deliveries. Entries without a readable task
    /// can never succeed, so they are acknowledged and dropped.
    async fn into_deliveries(&self, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        let mut poisoned = Vec::new();

        for entry in entries {
            let decoded = entry
                .get::<String>("task")
                .ok_or_else(|| "no task field".to_string())
                .and_then(|raw| {
                    serde_json::from_str::<AnalyzeVideoTask>(&raw).map_err(|e| e.to_string())
                });

            match decoded {
                Ok(task) => deliveries.push(Delivery {
                    message_id: entry.id,
                    task,
                }),
                Err(reason) => {
                    warn!(message_id = %entry.id, %reason, "Dropping unreadable stream entry");
                    poisoned.push(entry.id);
                }
            }
        }

        for message_id in poisoned {
            if let Err(e) = self.ack(&message_id).await {
                warn!(%message_id, error = %e, "Could not drop unreadable entry");
            }
        }

        deliveries
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.config.stream_name, &self.config.consumer_group, "0")
            .await;

        match created {
            Ok(()) => info!(
                stream = %self.config.stream_name,
                group = %self.config.consumer_group,
                "Created consumer group"
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn enqueue(&self, task: &AnalyzeVideoTask) -> QueueResult<String> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn().await?;

        let message_id: String = conn
            .xadd(
                &self.config.stream_name,
                "*",
                &[("task", payload.as_str()), ("job_id", task.job_id.as_str())],
            )
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!(job_id = %task.job_id, %message_id, "Task appended to stream");
        Ok(message_id)
    }

    async fn consume(
        &self,
        consumer_name: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, consumer_name)
            .count(count)
            .block(block.as_millis() as usize);

        let mut conn = self.conn().await?;
        // Nil when the block window passes without new entries
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_name], &[">"], &options)
            .await?;

        let entries = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|key| key.ids)
            .collect();
        Ok(self.into_deliveries(entries).await)
    }

    async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let idle_ms = min_idle.as_millis() as u64;
        let mut conn = self.conn().await?;

        let stale: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if stale.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = stale.ids.iter().map(|p| p.id.as_str()).collect();
        // XCLAIM re-checks idleness, so a racing consumer cannot double-claim
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.config.stream_name,
                &self.config.consumer_group,
                consumer_name,
                idle_ms,
                &ids,
            )
            .await?;

        if !claimed.ids.is_empty() {
            info!(
                consumer = consumer_name,
                claimed = claimed.ids.len(),
                "Took over idle deliveries"
            );
        }
        Ok(self.into_deliveries(claimed.ids).await)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .xack(&self.config.stream_name, &self.config.consumer_group, &[message_id])
            .ignore()
            .xdel(&self.config.stream_name, &[message_id])
            .ignore()
            .del(self.retry_key(message_id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let payload = serde_json::to_string(&delivery.task)?;
        let message_id = delivery.message_id.as_str();
        let mut conn = self.conn().await?;

        redis::pipe()
            .atomic()
            .xadd(
                &self.config.dlq_stream_name,
                "*",
                &[("task", payload.as_str()), ("error", error), ("original_id", message_id)],
            )
            .ignore()
            .xack(&self.config.stream_name, &self.config.consumer_group, &[message_id])
            .ignore()
            .xdel(&self.config.stream_name, &[message_id])
            .ignore()
            .del(self.retry_key(message_id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        warn!(job_id = %delivery.task.job_id, %error, "Task dead-lettered");
        Ok(())
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let key = self.retry_key(message_id);
        let mut conn = self.conn().await?;
        let (attempts,): (u32,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, RETRY_COUNTER_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(attempts)
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
