//! Redis-backed job store.
//!
//! Each job lives in a hash `{prefix}:job:{id}` with a `version` and a JSON
//! `data` field. Ids are indexed in the set `{prefix}:jobs` so `list` can
//! enumerate records; ids whose hash has expired are pruned on read.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};
use vidlens_models::{Job, JobId};

use super::{JobStore, StoreConfig};
use crate::error::{StoreError, StoreResult};

/// Compare-and-set: write only if ARGV[1] is newer than the stored version.
const PUT_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current and tonumber(current) >= tonumber(ARGV[1]) then
  return {0, tonumber(current)}
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'data', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
redis.call('SADD', KEYS[2], ARGV[4])
return {1, tonumber(ARGV[1])}
"#;

/// Job store backed by Redis hashes.
pub struct RedisJobStore {
    client: redis::Client,
    config: StoreConfig,
    put_script: redis::Script,
}

impl RedisJobStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            put_script: redis::Script::new(PUT_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs", self.config.key_prefix)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, job: &Job) -> StoreResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let stored = self.config.stamp(job);
        let payload = serde_json::to_string(&stored)?;
        let ttl_secs = self.config.ttl_for(job).as_secs().max(1);

        let (applied, current): (i64, u64) = self
            .put_script
            .key(self.job_key(&job.id))
            .key(self.index_key())
            .arg(job.version)
            .arg(&payload)
            .arg(ttl_secs)
            .arg(job.id.as_str())
            .invoke_async(&mut conn)
            .await?;

        if applied == 0 {
            debug!(
                job_id = %job.id,
                stored = current,
                attempted = job.version,
                "Rejected stale job write"
            );
            return Err(StoreError::VersionConflict {
                job_id: job.id.to_string(),
                stored: current,
                attempted: job.version,
            });
        }

        Ok(stored)
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let data: Option<String> = conn.hget(self.job_key(id), "data").await?;
        let data = data.ok_or_else(|| StoreError::not_found(id.as_str()))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn delete(&self, id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::pipe()
            .atomic()
            .del(self.job_key(id))
            .ignore()
            .srem(self.index_key(), id.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let ids: Vec<String> = conn.smembers(self.index_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hget(self.job_key(&JobId::from(id.as_str())), "data");
        }
        let payloads: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        let mut expired = Vec::new();

        for (id, payload) in ids.into_iter().zip(payloads) {
            match payload {
                Some(data) => match serde_json::from_str::<Job>(&data) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!(job_id = %id, "Skipping unreadable job record: {}", e),
                },
                None => expired.push(id),
            }
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Pruning expired job ids from index");
            conn.srem::<_, _, ()>(self.index_key(), &expired).await?;
        }

        Ok(jobs)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
