//! Error types for schedules and the scheduler runtime.

use thiserror::Error;

/// Result type for cron operations.
pub type CronResult<T> = Result<T, CronError>;

/// Cron-specific errors.
#[derive(Debug, Error)]
pub enum CronError {
    /// A schedule could not be defined
    #[error(transparent)]
    Definition(#[from] ScheduleDefinitionError),

    /// An entry could not be evaluated for a tick
    #[error(transparent)]
    Evaluation(#[from] TickEvaluationError),

    /// Job, action or queue failure while dispatching
    #[error(transparent)]
    Queue(#[from] stacks_queue::QueueError),

    /// Shell command or script exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Process spawning or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job targets a queue the dispatcher does not hold
    #[error("job '{job}' runs on queue '{queue}', which is not attached")]
    QueueNotAttached { job: String, queue: String },

    /// Scheduler not running
    #[error("Scheduler not running")]
    SchedulerNotRunning,

    /// Scheduler already running
    #[error("Scheduler already running")]
    SchedulerAlreadyRunning,

    /// Generic error
    #[error("Cron error: {0}")]
    Other(String),
}

/// A fluent schedule chain that cannot produce a valid cron spec.
///
/// Raised when the schedule is registered, never at tick time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleDefinitionError {
    #[error("schedule has no cadence (call a method such as every_minute() or daily() first)")]
    MissingCadence,

    #[error("cadence already set by {existing}(), cannot also call {attempted}()")]
    CadenceAlreadySet { existing: String, attempted: String },

    #[error("{cadence}() must come before at() and day modifiers")]
    CadenceAfterRefinement { cadence: String },

    #[error("{modifier}() needs a cadence such as weekly() or daily()")]
    DayModifierWithoutCadence { modifier: String },

    #[error("{modifier}() cannot be combined with {cadence}()")]
    IncompatibleModifier { modifier: String, cadence: String },

    #[error("invalid time '{0}' (expected HH:MM)")]
    InvalidTime(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("day list must not be empty")]
    EmptyDays,

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("cannot parse schedule chain '{chain}': {reason}")]
    InvalidChain { chain: String, reason: String },

    #[error("unknown schedule method '{0}'")]
    UnknownMethod(String),

    #[error("schedule entry '{entry}': {source}")]
    InEntry {
        entry: String,
        #[source]
        source: Box<ScheduleDefinitionError>,
    },
}

impl ScheduleDefinitionError {
    pub(crate) fn out_of_range(field: &str, value: i64, min: i64, max: i64) -> Self {
        ScheduleDefinitionError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        }
    }

    pub(crate) fn in_entry(self, entry: impl Into<String>) -> Self {
        ScheduleDefinitionError::InEntry {
            entry: entry.into(),
            source: Box::new(self),
        }
    }
}

/// Failure to decide whether one entry is due.
///
/// Logged per entry; the rest of the tick carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to evaluate schedule entry '{entry}': {reason}")]
pub struct TickEvaluationError {
    pub entry: String,
    pub reason: String,
}

impl TickEvaluationError {
    pub fn new(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_entry_wraps_message() {
        let err = ScheduleDefinitionError::MissingCadence.in_entry("php artisan inspire");
        let text = err.to_string();
        assert!(text.starts_with("schedule entry 'php artisan inspire'"));
        assert!(text.contains("no cadence"));
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ScheduleDefinitionError::out_of_range("hour", 24, 0, 23);
        assert_eq!(err.to_string(), "hour must be between 0 and 23, got 24");
    }

    #[test]
    fn test_conversions() {
        let err: CronError = TickEvaluationError::new("backup", "boom").into();
        assert!(matches!(err, CronError::Evaluation(_)));

        let err: CronError = ScheduleDefinitionError::EmptyDays.into();
        assert!(matches!(err, CronError::Definition(_)));
    }
}
