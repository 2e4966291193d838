//! Bounded retry with a flat backoff.

use crate::action::ActionRegistry;
use crate::error::{JobExecutionError, QueueError, QueueResult};
use crate::execution::{ExecutionStatus, JobExecution};
use crate::job::{Job, JobContext, JobData, JobHandler};
use stacks_log::{debug, error, success, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinError;

/// Outcome of running a job to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// An attempt succeeded; no further attempts were made.
    Succeeded { attempts: u32 },
    /// All `tries` attempts failed.
    Failed {
        attempts: u32,
        last_error: JobExecutionError,
    },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            JobResult::Succeeded { attempts } | JobResult::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Runs jobs, retrying failed attempts until `tries` is used up.
///
/// Between attempts the executor sleeps for the job's `backoff` seconds. The
/// delay is the same for every retry.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    actions: Arc<ActionRegistry>,
    log_execution: bool,
}

impl RetryExecutor {
    pub fn new(actions: Arc<ActionRegistry>) -> Self {
        Self {
            actions,
            log_execution: true,
        }
    }

    /// Report attempt outcomes to the log (on by default).
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_execution = enabled;
        self
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Run `job` with a `null` payload.
    pub async fn execute(&self, job: Arc<Job>) -> JobResult {
        self.execute_with(job, JobData::Null).await
    }

    /// Run `job`, handing `payload` to every attempt.
    pub async fn execute_with(&self, job: Arc<Job>, payload: JobData) -> JobResult {
        let mut execution = JobExecution::new(Arc::clone(&job));

        loop {
            execution.begin();
            let attempt = execution.attempt();
            let ctx = JobContext::new(job.name(), attempt, job.tries(), payload.clone());

            if self.log_execution {
                debug!("Running job '{}' (attempt {}/{})", job.name(), attempt, job.tries());
            }

            match self.invoke(&job, ctx).await {
                Ok(()) => {
                    execution.succeed();
                    if self.log_execution {
                        success!("Job '{}' succeeded on attempt {}", job.name(), attempt);
                    }
                    return JobResult::Succeeded { attempts: attempt };
                }
                Err(cause) => {
                    let failure = JobExecutionError::new(job.name(), attempt, &cause);
                    execution.fail(failure.clone());

                    if execution.advance() == ExecutionStatus::Exhausted {
                        if self.log_execution {
                            error!("{} (giving up after {} attempts)", failure, attempt);
                        }
                        self.notify_failure(&job, &failure).await;
                        return JobResult::Failed {
                            attempts: attempt,
                            last_error: failure,
                        };
                    }

                    if self.log_execution {
                        warn!("{}; retrying in {}s", failure, job.backoff());
                    }
                    tokio::time::sleep(job.backoff_delay()).await;
                }
            }
        }
    }

    /// One attempt: resolve the handler, then apply the job timeout if any.
    ///
    /// The attempt runs as its own task so a panicking handler fails the
    /// attempt instead of the caller.
    async fn invoke(&self, job: &Job, ctx: JobContext) -> QueueResult<()> {
        let attempt: Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> = match job.handler() {
            JobHandler::Handle(handle) => {
                let handle = Arc::clone(handle);
                Box::pin(async move { handle(ctx).await })
            }
            JobHandler::Action(name) => {
                let action = self
                    .actions
                    .get(name)
                    .ok_or_else(|| QueueError::UnknownAction(name.clone()))?;
                Box::pin(async move { action.handle(ctx).await })
            }
        };

        let task = tokio::spawn(attempt);
        let abort = task.abort_handle();
        let joined = match job.timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Err(QueueError::Timeout(limit));
                }
            },
            None => task.await,
        };

        joined.unwrap_or_else(|e| Err(attempt_aborted(e)))
    }

    async fn notify_failure(&self, job: &Job, failure: &JobExecutionError) {
        let Some(hook) = job.failure_hook() else {
            return;
        };
        let hook = hook.clone();
        let failure = failure.clone();
        if let Err(e) = tokio::spawn(async move { hook.call(failure).await }).await {
            error!("Failure hook of job '{}' ended abnormally: {}", job.name(), e);
        }
    }
}

fn attempt_aborted(err: JoinError) -> QueueError {
    if !err.is_panic() {
        return QueueError::failed("attempt was cancelled");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    QueueError::failed(format!("handler panicked: {}", message))
}
