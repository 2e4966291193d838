//! Error types for the buddy CLI.

use stacks_config::ConfigError;
use stacks_cron::{CronError, ScheduleDefinitionError};
use stacks_queue::{ConfigurationError, QueueError};
use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// IO error (file operations, etc.)
    Io(std::io::Error),

    /// Invalid or unreadable `buddy.toml` / environment
    Config(String),

    /// Invalid schedule or job definition
    Definition(String),

    /// Scheduler or worker failure
    Runtime(String),

    /// A required file or job does not exist
    NotFound(String),

    /// Invalid argument
    InvalidArgument(String),

    /// `job:run` exhausted its attempts
    JobFailed {
        job: String,
        attempts: u32,
        error: String,
    },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Definition(msg) => write!(f, "Definition error: {}", msg),
            CliError::Runtime(msg) => write!(f, "{}", msg),
            CliError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::JobFailed {
                job,
                attempts,
                error,
            } => write!(
                f,
                "Job {} failed after {} attempt(s): {}",
                job, attempts, error
            ),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ScheduleDefinitionError> for CliError {
    fn from(e: ScheduleDefinitionError) -> Self {
        CliError::Definition(e.to_string())
    }
}

impl From<ConfigurationError> for CliError {
    fn from(e: ConfigurationError) -> Self {
        CliError::Definition(e.to_string())
    }
}

impl From<CronError> for CliError {
    fn from(e: CronError) -> Self {
        match e {
            CronError::Definition(e) => e.into(),
            other => CliError::Runtime(other.to_string()),
        }
    }
}

impl From<QueueError> for CliError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Configuration(e) => e.into(),
            other => CliError::Runtime(other.to_string()),
        }
    }
}
