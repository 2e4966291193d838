//! Error types for jobs, queues and workers.

use thiserror::Error;

/// Result type for queue operations and job handlers.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Invalid job or worker configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Queued item not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A handler reported a failure
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// Attempt exceeded the job timeout
    #[error("Job timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Action name not present in the action registry
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// No job registered under the queued name
    #[error("No job registered under name: {0}")]
    NoHandler(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Queue is full
    #[error("Queue '{0}' is full")]
    QueueFull(String),

    /// Generic error
    #[error("Queue error: {0}")]
    Other(String),
}

impl QueueError {
    /// Shorthand used by handlers: `Err(QueueError::failed("smtp down"))`.
    pub fn failed(message: impl Into<String>) -> Self {
        QueueError::ExecutionFailed(message.into())
    }
}

/// Invalid job definition. Fatal when job definitions are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("job '{job}': tries must be at least 1, got {value}")]
    InvalidTries { job: String, value: i64 },

    #[error("job '{job}': backoff must not be negative, got {value}")]
    NegativeBackoff { job: String, value: i64 },

    #[error("job '{job}' has no handler (expected an action or an inline handle)")]
    MissingHandler { job: String },

    #[error("job '{job}' declares more than one handler")]
    ConflictingHandlers { job: String },

    #[error("job '{job}' references unknown action '{action}'")]
    UnknownAction { job: String, action: String },

    #[error("job name must not be empty")]
    EmptyName,

    #[error("job '{0}' is defined twice")]
    DuplicateJob(String),
}

/// One failed invocation of a job handler.
///
/// Recovered by the retry executor until the job's `tries` are used up; only
/// then returned to the caller inside `JobResult::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job '{job}' failed on attempt {attempt}: {message}")]
pub struct JobExecutionError {
    pub job: String,
    pub attempt: u32,
    pub message: String,
}

impl JobExecutionError {
    pub fn new(job: impl Into<String>, attempt: u32, cause: &QueueError) -> Self {
        Self {
            job: job.into(),
            attempt,
            message: cause.to_string(),
        }
    }
}
