//! Worker pool that drains a [`Queue`] through the [`RetryExecutor`].

use crate::error::{QueueError, QueueResult};
use crate::executor::{JobResult, RetryExecutor};
use crate::queue::{Queue, QueuedJob};
use crate::registry::JobRegistry;
use stacks_log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent polling tasks
    pub concurrency: usize,

    /// Poll interval when the queue has nothing available
    pub poll_interval: Duration,

    /// Whether to log worker lifecycle and job outcomes
    pub log_execution: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            log_execution: true,
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_execution = enabled;
        self
    }
}

/// Background workers processing queued jobs.
pub struct Worker {
    queue: Queue,
    jobs: Arc<JobRegistry>,
    executor: RetryExecutor,
    config: WorkerConfig,
    running: Arc<RwLock<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    pub fn new(queue: Queue, jobs: Arc<JobRegistry>, executor: RetryExecutor) -> Self {
        Self::with_config(queue, jobs, executor, WorkerConfig::default())
    }

    pub fn with_config(
        queue: Queue,
        jobs: Arc<JobRegistry>,
        executor: RetryExecutor,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            jobs,
            executor,
            config,
            running: Arc::new(RwLock::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Spawn `concurrency` polling tasks.
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.config.concurrency == 0 {
            return Err(QueueError::Other("worker concurrency must be at least 1".to_string()));
        }

        let mut running = self.running.write().await;
        if *running {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        *running = true;
        drop(running);

        if self.config.log_execution {
            info!(
                "Worker started on queue '{}' with concurrency {}",
                self.queue.name(),
                self.config.concurrency
            );
        }

        for slot in 0..self.config.concurrency {
            let queue = self.queue.clone();
            let jobs = Arc::clone(&self.jobs);
            let executor = self.executor.clone();
            let running = Arc::clone(&self.running);
            let poll_interval = self.config.poll_interval;
            let log = self.config.log_execution;

            self.handles.push(tokio::spawn(async move {
                while *running.read().await {
                    match queue.dequeue().await {
                        Some(item) => process(slot, &queue, &jobs, &executor, item, log).await,
                        None => tokio::time::sleep(poll_interval).await,
                    }
                }
            }));
        }

        Ok(())
    }

    /// Stop polling. Items already being processed run to completion first.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(QueueError::WorkerNotRunning);
        }
        *running = false;
        drop(running);

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        if self.config.log_execution {
            info!("Worker on queue '{}' stopped", self.queue.name());
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

async fn process(
    slot: usize,
    queue: &Queue,
    jobs: &JobRegistry,
    executor: &RetryExecutor,
    item: QueuedJob,
    log: bool,
) {
    let outcome = match jobs.get(&item.job) {
        Some(job) => {
            if log {
                info!("[worker-{}] Processing '{}' ({})", slot, item.job, item.id);
            }
            match executor.execute_with(job, item.payload.clone()).await {
                JobResult::Succeeded { .. } => queue.complete(item.id).await,
                JobResult::Failed {
                    attempts,
                    last_error,
                } => {
                    queue
                        .record_failure(item.id, last_error.to_string(), attempts)
                        .await
                }
            }
        }
        None => {
            let cause = QueueError::NoHandler(item.job.clone());
            error!("[worker-{}] {}", slot, cause);
            queue.record_failure(item.id, cause.to_string(), 0).await
        }
    };

    if let Err(e) = outcome {
        error!("[worker-{}] Failed to settle job {}: {}", slot, item.id, e);
    }
}
