//! Jobs, bounded retries and background workers for Stacks.
//!
//! - Immutable [`Job`] definitions, validated on construction
//! - A [`RetryExecutor`] that retries failed attempts with a flat backoff
//! - Named [`Action`]s resolved at run time
//! - An in-memory [`Queue`] drained by a [`Worker`] pool
//!
//! ## Defining a job
//!
//! ```
//! use stacks_queue::{Job, QueueError};
//!
//! let job = Job::builder("SendDigest")
//!     .description("Mail the weekly digest")
//!     .tries(5)
//!     .backoff(10)
//!     .handle(|ctx| async move {
//!         if ctx.attempt < 2 {
//!             return Err(QueueError::failed("smtp not ready"));
//!         }
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(job.tries(), 5);
//! assert_eq!(job.backoff(), 10);
//! ```
//!
//! Invalid limits are rejected when the job is built:
//!
//! ```
//! use stacks_queue::{ConfigurationError, Job};
//!
//! let err = Job::builder("Broken").action("Noop").tries(0).build().unwrap_err();
//! assert!(matches!(err, ConfigurationError::InvalidTries { .. }));
//! ```
//!
//! ## Running a job
//!
//! ```
//! use stacks_queue::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut actions = ActionRegistry::new();
//! actions.register_fn("Inspire", |_ctx| async { Ok(()) });
//!
//! let executor = RetryExecutor::new(Arc::new(actions));
//! let job = Arc::new(Job::action("Inspire", "Inspire"));
//!
//! let result = executor.execute(job).await;
//! assert_eq!(result, JobResult::Succeeded { attempts: 1 });
//! # }
//! ```

pub mod action;
pub mod error;
pub mod execution;
pub mod executor;
pub mod job;
pub mod queue;
pub mod registry;
pub mod worker;

pub use action::{Action, ActionRegistry};
pub use error::{ConfigurationError, JobExecutionError, QueueError, QueueResult};
pub use execution::{ExecutionStatus, JobExecution};
pub use executor::{JobResult, RetryExecutor};
pub use job::{
    handler_fn, FailureHook, HandlerFn, Job, JobBuilder, JobContext, JobData, JobDefinition,
    JobHandler,
};
pub use queue::{FailedJob, Queue, QueueConfig, QueuedJob};
pub use registry::JobRegistry;
pub use worker::{Worker, WorkerConfig};

/// Prelude for common imports.
///
/// ```
/// use stacks_queue::prelude::*;
/// ```
pub mod prelude {
    pub use crate::action::{Action, ActionRegistry};
    pub use crate::error::{ConfigurationError, QueueError, QueueResult};
    pub use crate::executor::{JobResult, RetryExecutor};
    pub use crate::job::{Job, JobContext, JobData, JobDefinition};
    pub use crate::queue::Queue;
    pub use crate::registry::JobRegistry;
    pub use crate::worker::{Worker, WorkerConfig};
}
