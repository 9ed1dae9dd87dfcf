//! In-process task queue with the same delivery semantics as the stream queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{AnalyzeVideoTask, Delivery, TaskQueue};
use crate::error::QueueResult;

struct Pending {
    task: AnalyzeVideoTask,
    delivered_at: Instant,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Delivery>,
    pending: HashMap<String, Pending>,
    retries: HashMap<String, u32>,
    dead_letters: Vec<(Delivery, String)>,
}

/// Queue held in memory. Used by tests and single-process setups.
pub struct MemoryTaskQueue {
    state: Mutex<State>,
    notify: Notify,
    next_id: AtomicU64,
    max_retries: u32,
}

impl MemoryTaskQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            max_retries,
        }
    }

    /// Messages delivered but not yet acknowledged.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Dead-lettered tasks with their error.
    pub async fn dead_letters(&self) -> Vec<(Delivery, String)> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Put a copy of an already delivered message back on the queue,
    /// as a broker does on duplicate delivery.
    pub async fn redeliver(&self, delivery: &Delivery) {
        self.state.lock().await.ready.push_back(delivery.clone());
        self.notify.notify_one();
    }

    async fn take_ready(&self, count: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let n = count.min(state.ready.len());
        let batch: Vec<Delivery> = state.ready.drain(..n).collect();
        let now = Instant::now();
        for d in &batch {
            state.pending.insert(
                d.message_id.clone(),
                Pending {
                    task: d.task.clone(),
                    delivered_at: now,
                },
            );
        }
        batch
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn enqueue(&self, task: &AnalyzeVideoTask) -> QueueResult<String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message_id = format!("{}-0", id);
        self.state.lock().await.ready.push_back(Delivery {
            message_id: message_id.clone(),
            task: task.clone(),
        });
        self.notify.notify_one();
        Ok(message_id)
    }

    async fn consume(
        &self,
        _consumer_name: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let batch = self.take_ready(count).await;
        if !batch.is_empty() || block.is_zero() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(block, self.notify.notified()).await;
        Ok(self.take_ready(count).await)
    }

    async fn claim_pending(
        &self,
        _consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut claimed = Vec::new();
        for (message_id, pending) in state.pending.iter_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(pending.delivered_at) >= min_idle {
                pending.delivered_at = now;
                claimed.push(Delivery {
                    message_id: message_id.clone(),
                    task: pending.task.clone(),
                });
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.pending.remove(message_id);
        state.retries.remove(message_id);
        Ok(())
    }

    async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.dead_letters.push((delivery.clone(), error.to_string()));
        state.pending.remove(&delivery.message_id);
        state.retries.remove(&delivery.message_id);
        Ok(())
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut state = self.state.lock().await;
        let count = state.retries.entry(message_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn len(&self) -> QueueResult<u64> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.pending.len()) as u64)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
