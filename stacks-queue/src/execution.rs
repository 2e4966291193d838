//! Per-dispatch execution state.

use crate::error::JobExecutionError;
use crate::job::Job;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Waiting for the next attempt
    Pending,
    /// An attempt is in progress
    Running,
    /// An attempt succeeded (terminal)
    Succeeded,
    /// The last attempt failed; retry or exhaust next
    Failed,
    /// Every attempt failed (terminal)
    Exhausted,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded | ExecutionStatus::Exhausted)
    }
}

/// Attempt counter, last error and status for one dispatch of a job.
///
/// Created fresh for every dispatch and dropped afterwards; never shared
/// between concurrent dispatches.
#[derive(Debug, Clone)]
pub struct JobExecution {
    job: Arc<Job>,
    attempt: u32,
    status: ExecutionStatus,
    last_error: Option<JobExecutionError>,
}

impl JobExecution {
    pub fn new(job: Arc<Job>) -> Self {
        Self {
            job,
            attempt: 1,
            status: ExecutionStatus::Pending,
            last_error: None,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Current attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&JobExecutionError> {
        self.last_error.as_ref()
    }

    /// Whether a failed attempt may be followed by another one.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.job.tries()
    }

    /// `Pending -> Running`.
    pub fn begin(&mut self) {
        debug_assert_eq!(self.status, ExecutionStatus::Pending);
        self.status = ExecutionStatus::Running;
    }

    /// `Running -> Succeeded`.
    pub fn succeed(&mut self) {
        debug_assert_eq!(self.status, ExecutionStatus::Running);
        self.status = ExecutionStatus::Succeeded;
    }

    /// `Running -> Failed`, remembering the error.
    pub fn fail(&mut self, error: JobExecutionError) {
        debug_assert_eq!(self.status, ExecutionStatus::Running);
        self.status = ExecutionStatus::Failed;
        self.last_error = Some(error);
    }

    /// Leave `Failed`: back to `Pending` with the next attempt number when
    /// tries remain, otherwise `Exhausted`. Returns the new status.
    pub fn advance(&mut self) -> ExecutionStatus {
        debug_assert_eq!(self.status, ExecutionStatus::Failed);
        if self.can_retry() {
            self.attempt += 1;
            self.status = ExecutionStatus::Pending;
        } else {
            self.status = ExecutionStatus::Exhausted;
        }
        self.status
    }
}
