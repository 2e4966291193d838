//! Job definition.
//!
//! A [`Job`] is an immutable description of a unit of background work: what to
//! call, how many times to try, and how long to wait between tries. Running it
//! is the executor's business (see [`crate::executor`]).

use crate::error::{ConfigurationError, JobExecutionError, QueueResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Job data payload.
pub type JobData = serde_json::Value;

/// Inline job handler.
pub type HandlerFn =
    Arc<dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> + Send + Sync>;

/// Wrap an async closure into a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueueResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: JobContext| -> Pin<Box<dyn Future<Output = QueueResult<()>> + Send>> {
        Box::pin(f(ctx))
    })
}

/// Context handed to a handler for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// Job name
    pub job: String,

    /// Attempt number, starting at 1
    pub attempt: u32,

    /// Maximum number of attempts (`tries`)
    pub max_attempts: u32,

    /// Payload the job was dispatched with (`null` for scheduled runs)
    pub payload: JobData,

    /// When this attempt started
    pub started_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(job: impl Into<String>, attempt: u32, max_attempts: u32, payload: JobData) -> Self {
        Self {
            job: job.into(),
            attempt,
            max_attempts,
            payload,
            started_at: Utc::now(),
        }
    }

    /// Whether this is the final attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// What a job calls when it runs.
#[derive(Clone)]
pub enum JobHandler {
    /// Named action, resolved through the [`crate::ActionRegistry`] at run time
    Action(String),
    /// Inline handler
    Handle(HandlerFn),
}

impl fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobHandler::Action(name) => f.debug_tuple("Action").field(name).finish(),
            JobHandler::Handle(_) => f.write_str("Handle(<fn>)"),
        }
    }
}

/// Runs once with the last error after a job has used up its tries.
#[derive(Clone)]
pub struct FailureHook(
    Arc<dyn Fn(JobExecutionError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>,
);

impl FailureHook {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JobExecutionError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |error| Box::pin(f(error))))
    }

    pub async fn call(&self, error: JobExecutionError) {
        (self.0)(error).await
    }
}

impl fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailureHook(<fn>)")
    }
}

/// A background job.
#[derive(Debug, Clone)]
pub struct Job {
    name: String,
    description: String,
    handler: JobHandler,
    tries: u32,
    backoff: u64,
    queue: String,
    timeout: Option<Duration>,
    rate: Option<String>,
    on_failure: Option<FailureHook>,
}

impl Job {
    pub const DEFAULT_TRIES: u32 = 3;
    pub const DEFAULT_BACKOFF_SECS: u64 = 3;
    pub const DEFAULT_QUEUE: &'static str = "default";

    /// Start a validated definition.
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    /// Job with an inline handler and default retry settings.
    pub fn new<F, Fut>(name: impl Into<String>, handle: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        Self::with_handler(name.into(), JobHandler::Handle(handler_fn(handle)))
    }

    /// Job that invokes a named action, with default retry settings.
    pub fn action(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self::with_handler(name.into(), JobHandler::Action(action.into()))
    }

    fn with_handler(name: String, handler: JobHandler) -> Self {
        Self {
            name,
            description: String::new(),
            handler,
            tries: Self::DEFAULT_TRIES,
            backoff: Self::DEFAULT_BACKOFF_SECS,
            queue: Self::DEFAULT_QUEUE.to_string(),
            timeout: None,
            rate: None,
            on_failure: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn handler(&self) -> &JobHandler {
        &self.handler
    }

    /// Maximum number of attempts, always at least 1.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Delay between attempts, in seconds.
    pub fn backoff(&self) -> u64 {
        self.backoff
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Per-attempt time limit, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fluent schedule chain used to enqueue this job periodically.
    pub fn rate(&self) -> Option<&str> {
        self.rate.as_deref()
    }

    pub fn failure_hook(&self) -> Option<&FailureHook> {
        self.on_failure.as_ref()
    }

    /// Delay before the next attempt.
    ///
    /// The delay is flat: every retry waits `backoff` seconds, whatever the
    /// attempt number.
    pub fn backoff_delay(&self) -> Duration {
        Duration::from_secs(self.backoff)
    }
}

/// Builder that validates `tries >= 1` and `backoff >= 0` on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct JobBuilder {
    name: String,
    description: String,
    handler: Option<JobHandler>,
    conflicting_handlers: bool,
    tries: i64,
    backoff: i64,
    queue: String,
    timeout: Option<Duration>,
    rate: Option<String>,
    on_failure: Option<FailureHook>,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            handler: None,
            conflicting_handlers: false,
            tries: i64::from(Job::DEFAULT_TRIES),
            backoff: Job::DEFAULT_BACKOFF_SECS as i64,
            queue: Job::DEFAULT_QUEUE.to_string(),
            timeout: None,
            rate: None,
            on_failure: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn handle<F, Fut>(self, handle: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        self.handler(JobHandler::Handle(handler_fn(handle)))
    }

    pub fn action(self, action: impl Into<String>) -> Self {
        self.handler(JobHandler::Action(action.into()))
    }

    pub fn handler(mut self, handler: JobHandler) -> Self {
        if self.handler.is_some() {
            self.conflicting_handlers = true;
        }
        self.handler = Some(handler);
        self
    }

    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = i64::from(tries);
        self
    }

    /// Delay between attempts, in seconds.
    pub fn backoff(mut self, seconds: u64) -> Self {
        self.backoff = i64::try_from(seconds).unwrap_or(i64::MAX);
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn rate(mut self, chain: impl Into<String>) -> Self {
        self.rate = Some(chain.into());
        self
    }

    /// Called once the last attempt has failed.
    pub fn on_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobExecutionError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_failure = Some(FailureHook::new(hook));
        self
    }

    pub(crate) fn raw_limits(mut self, tries: Option<i64>, backoff: Option<i64>) -> Self {
        if let Some(tries) = tries {
            self.tries = tries;
        }
        if let Some(backoff) = backoff {
            self.backoff = backoff;
        }
        self
    }

    pub fn build(self) -> Result<Job, ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if self.conflicting_handlers {
            return Err(ConfigurationError::ConflictingHandlers { job: self.name });
        }
        let tries = u32::try_from(self.tries)
            .ok()
            .filter(|t| *t >= 1)
            .ok_or_else(|| ConfigurationError::InvalidTries {
                job: self.name.clone(),
                value: self.tries,
            })?;
        let backoff =
            u64::try_from(self.backoff).map_err(|_| ConfigurationError::NegativeBackoff {
                job: self.name.clone(),
                value: self.backoff,
            })?;
        let handler = self
            .handler
            .ok_or_else(|| ConfigurationError::MissingHandler {
                job: self.name.clone(),
            })?;

        Ok(Job {
            name: self.name,
            description: self.description,
            handler,
            tries,
            backoff,
            queue: self.queue,
            timeout: self.timeout,
            rate: self.rate,
            on_failure: self.on_failure,
        })
    }
}

/// File form of a job (one TOML or JSON document per job).
///
/// Numbers are signed on purpose so that `tries = 0` or `backoff = -1` reach
/// validation and produce a [`ConfigurationError`] instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobDefinition {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tries: Option<i64>,
    pub backoff: Option<i64>,
    /// Per-attempt timeout in seconds
    pub timeout: Option<u64>,
    pub queue: Option<String>,
    pub rate: Option<String>,
    pub action: Option<String>,
    pub command: Option<String>,
}

impl JobDefinition {
    /// Validate into a [`Job`].
    ///
    /// `fallback_name` is used when the document has no `name` (callers pass
    /// the defining file's stem). `command_handler` turns a `command` entry
    /// into an inline handler; the queue crate itself does not run processes.
    pub fn into_job<C>(self, fallback_name: &str, command_handler: C) -> Result<Job, ConfigurationError>
    where
        C: FnOnce(&str) -> HandlerFn,
    {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        let handler = match (self.action, self.command) {
            (Some(_), Some(_)) => return Err(ConfigurationError::ConflictingHandlers { job: name }),
            (Some(action), None) => JobHandler::Action(action),
            (None, Some(command)) => JobHandler::Handle(command_handler(&command)),
            (None, None) => return Err(ConfigurationError::MissingHandler { job: name }),
        };

        let mut builder = JobBuilder::new(name)
            .handler(handler)
            .raw_limits(self.tries, self.backoff);
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(queue) = self.queue {
            builder = builder.queue(queue);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        if let Some(rate) = self.rate {
            builder = builder.rate(rate);
        }
        builder.build()
    }
}
