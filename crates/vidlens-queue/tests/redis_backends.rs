//! Redis-backed store and queue tests.
//!
//! Run with a local Redis: `cargo test -p vidlens-queue -- --ignored`

use std::time::Duration;

use vidlens_models::{AnalysisOptions, Job, JobStatus};
use vidlens_queue::{
    AnalyzeVideoTask, JobStore, QueueConfig, RedisJobStore, RedisTaskQueue, StoreConfig, TaskQueue,
};

fn unique_prefix() -> String {
    format!("vidlens-test-{}", nanos())
}

fn nanos() -> String {
    format!(
        "{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_store_version_check() {
    let store = RedisJobStore::new(StoreConfig {
        redis_url: redis_url(),
        key_prefix: unique_prefix(),
        ..Default::default()
    })
    .unwrap();

    let mut job = Job::new("http://host/a.mp4", AnalysisOptions::default(), None);
    store.put(&job).await.unwrap();

    let stale = job.clone();
    job.start().unwrap();
    store.put(&job).await.unwrap();

    assert!(store.put(&stale).await.unwrap_err().is_version_conflict());

    let fetched = store.get(&job.id).await.unwrap();
    assert_eq!(fetched.status, JobStatus::Processing);
    assert!(fetched.expires_at.is_some());

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);

    store.delete(&job.id).await.unwrap();
    assert!(store.get(&job.id).await.unwrap_err().is_not_found());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_queue_delivery_and_claim() {
    let prefix = unique_prefix();
    let queue = RedisTaskQueue::new(QueueConfig {
        redis_url: redis_url(),
        stream_name: format!("{}:tasks", prefix),
        consumer_group: format!("{}:workers", prefix),
        dlq_stream_name: format!("{}:dlq", prefix),
        max_retries: 1,
    })
    .unwrap();
    queue.init().await.unwrap();
    queue.init().await.unwrap();

    let job = Job::new("http://host/a.mp4", AnalysisOptions::default(), None);
    queue.enqueue(&AnalyzeVideoTask::new(job.id.clone())).await.unwrap();

    let batch = queue
        .consume("crashed", Duration::from_millis(100), 10)
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].task.job_id, job.id);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let claimed = queue
        .claim_pending("w2", Duration::from_millis(10), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    queue.dlq(&claimed[0], "boom").await.unwrap();
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
    assert_eq!(queue.len().await.unwrap(), 0);
}
