//! In-memory job queue.

use crate::error::{QueueError, QueueResult};
use crate::job::JobData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stacks_log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name
    pub name: String,

    /// Maximum number of waiting items (0 = unlimited)
    pub max_size: usize,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_size: 0,
        }
    }

    /// Set the maximum queue size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

/// A job waiting on or reserved from the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    /// Name of the job to run
    pub job: String,
    pub payload: JobData,
    pub enqueued_at: DateTime<Utc>,
    /// Not handed out by `dequeue` before this instant
    pub available_at: DateTime<Utc>,
}

/// A job whose attempts were exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    pub job: String,
    pub payload: JobData,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<QueuedJob>,
    reserved: HashMap<Uuid, QueuedJob>,
    failed: Vec<FailedJob>,
}

/// Process-local job queue. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct Queue {
    config: QueueConfig,
    state: Arc<Mutex<QueueState>>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(QueueConfig::new(name))
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a job for immediate processing.
    pub async fn enqueue(&self, job: impl Into<String>, payload: JobData) -> QueueResult<Uuid> {
        self.push(job.into(), payload, Utc::now()).await
    }

    /// Enqueue a job that becomes available after `delay`.
    pub async fn enqueue_later(
        &self,
        job: impl Into<String>,
        payload: JobData,
        delay: Duration,
    ) -> QueueResult<Uuid> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| QueueError::Other(format!("invalid delay: {e}")))?;
        self.push(job.into(), payload, Utc::now() + delay).await
    }

    async fn push(&self, job: String, payload: JobData, available_at: DateTime<Utc>) -> QueueResult<Uuid> {
        let mut state = self.state.lock().await;
        if self.config.max_size > 0 && state.waiting.len() >= self.config.max_size {
            return Err(QueueError::QueueFull(self.config.name.clone()));
        }

        let item = QueuedJob {
            id: Uuid::new_v4(),
            job,
            payload,
            enqueued_at: Utc::now(),
            available_at,
        };
        let id = item.id;
        debug!("Enqueued job '{}' ({}) on queue '{}'", item.job, id, self.config.name);
        state.waiting.push_back(item);
        Ok(id)
    }

    /// Reserve the oldest available item.
    pub async fn dequeue(&self) -> Option<QueuedJob> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let position = state.waiting.iter().position(|item| item.available_at <= now)?;
        let item = state.waiting.remove(position)?;
        state.reserved.insert(item.id, item.clone());
        Some(item)
    }

    /// Drop a reserved item after it succeeded.
    pub async fn complete(&self, id: Uuid) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state
            .reserved
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    /// Move a reserved item to the failed list.
    pub async fn record_failure(&self, id: Uuid, error: impl Into<String>, attempts: u32) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let item = state
            .reserved
            .remove(&id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        state.failed.push(FailedJob {
            id: item.id,
            job: item.job,
            payload: item.payload,
            error: error.into(),
            attempts,
            failed_at: Utc::now(),
        });
        Ok(())
    }

    /// Jobs that exhausted their attempts, oldest first.
    pub async fn failed(&self) -> Vec<FailedJob> {
        self.state.lock().await.failed.clone()
    }

    /// Put a failed job back on the queue under its original id.
    pub async fn retry_failed(&self, id: Uuid) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let position = state
            .failed
            .iter()
            .position(|failed| failed.id == id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        if self.config.max_size > 0 && state.waiting.len() >= self.config.max_size {
            return Err(QueueError::QueueFull(self.config.name.clone()));
        }

        let failed = state.failed.remove(position);
        debug!("Retrying failed job '{}' ({})", failed.job, failed.id);
        state.waiting.push_back(requeued(failed));
        Ok(())
    }

    /// Put every failed job back on the queue, oldest first. Returns how many
    /// were moved; jobs that do not fit stay in the failed list.
    pub async fn retry_all_failed(&self) -> usize {
        let mut state = self.state.lock().await;
        let room = match self.config.max_size {
            0 => usize::MAX,
            max => max.saturating_sub(state.waiting.len()),
        };
        let count = room.min(state.failed.len());
        let moved: Vec<FailedJob> = state.failed.drain(..count).collect();
        state.waiting.extend(moved.into_iter().map(requeued));
        count
    }

    /// Number of waiting items, available or delayed.
    pub async fn size(&self) -> usize {
        self.state.lock().await.waiting.len()
    }

    /// Number of items currently reserved by workers.
    pub async fn reserved(&self) -> usize {
        self.state.lock().await.reserved.len()
    }

    /// Drop every waiting item.
    pub async fn clear(&self) {
        self.state.lock().await.waiting.clear();
    }
}

fn requeued(failed: FailedJob) -> QueuedJob {
    let now = Utc::now();
    QueuedJob {
        id: failed.id,
        job: failed.job,
        payload: failed.payload,
        enqueued_at: now,
        available_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = Queue::new("default");
        queue.enqueue("A", json!(1)).await.unwrap();
        queue.enqueue("B", json!(2)).await.unwrap();

        assert_eq!(queue.size().await, 2);
        assert_eq!(queue.dequeue().await.unwrap().job, "A");
        assert_eq!(queue.dequeue().await.unwrap().job, "B");
        assert!(queue.dequeue().await.is_none());
        assert_eq!(queue.reserved().await, 2);
    }

    #[tokio::test]
    async fn test_delayed_item_is_not_handed_out_early() {
        let queue = Queue::new("default");
        queue
            .enqueue_later("Later", JobData::Null, Duration::from_secs(3600))
            .await
            .unwrap();
        queue.enqueue("Now", JobData::Null).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().job, "Now");
        assert!(queue.dequeue().await.is_none());
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_max_size() {
        let queue = Queue::with_config(QueueConfig::new("small").with_max_size(1));
        queue.enqueue("A", JobData::Null).await.unwrap();
        let err = queue.enqueue("B", JobData::Null).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull(name) if name == "small"));
    }

    #[tokio::test]
    async fn test_complete_and_fail() {
        let queue = Queue::new("default");
        queue.enqueue("A", JobData::Null).await.unwrap();
        queue.enqueue("B", json!({"id": 7})).await.unwrap();

        let a = queue.dequeue().await.unwrap();
        let b = queue.dequeue().await.unwrap();
        queue.complete(a.id).await.unwrap();
        queue.record_failure(b.id, "boom", 3).await.unwrap();

        let failed = queue.failed().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job, "B");
        assert_eq!(failed[0].attempts, 3);
        assert_eq!(failed[0].payload, json!({"id": 7}));
        assert_eq!(queue.reserved().await, 0);

        assert!(matches!(
            queue.complete(a.id).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_failed() {
        let queue = Queue::new("default");
        for name in ["A", "B", "C"] {
            queue.enqueue(name, json!({"job": name})).await.unwrap();
        }
        for _ in 0..3 {
            let item = queue.dequeue().await.unwrap();
            queue.record_failure(item.id, "boom", 2).await.unwrap();
        }

        let first = queue.failed().await[0].clone();
        queue.retry_failed(first.id).await.unwrap();
        assert_eq!(queue.failed().await.len(), 2);

        let again = queue.dequeue().await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.payload, json!({"job": "A"}));

        assert!(matches!(
            queue.retry_failed(first.id).await,
            Err(QueueError::JobNotFound(_))
        ));

        assert_eq!(queue.retry_all_failed().await, 2);
        assert!(queue.failed().await.is_empty());
        assert_eq!(queue.dequeue().await.unwrap().job, "B");
        assert_eq!(queue.dequeue().await.unwrap().job, "C");
    }

    #[tokio::test]
    async fn test_retry_all_failed_respects_max_size() {
        let queue = Queue::with_config(QueueConfig::new("small").with_max_size(1));
        for name in ["A", "B"] {
            queue.enqueue(name, JobData::Null).await.unwrap();
            let item = queue.dequeue().await.unwrap();
            queue.record_failure(item.id, "boom", 1).await.unwrap();
        }

        assert_eq!(queue.retry_all_failed().await, 1);
        assert_eq!(queue.size().await, 1);
        assert_eq!(queue.failed().await[0].job, "B");

        let b = queue.failed().await[0].id;
        assert!(matches!(
            queue.retry_failed(b).await,
            Err(QueueError::QueueFull(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let queue = Queue::new("default");
        let other = queue.clone();
        other.enqueue("A", JobData::Null).await.unwrap();
        assert_eq!(queue.size().await, 1);
    }
}
