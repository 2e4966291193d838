//! Fluent cron schedules for Stacks.
//!
//! Provides:
//! - A fluent [`ScheduleBuilder`] that compiles cadence and refinement calls
//!   into a five-field [`CronSpec`]
//! - Per-entry IANA timezones
//! - Command, script, action, job and inline callback targets
//! - A minute-aligned [`Scheduler`] that dispatches due entries concurrently
//!
//! ## Building a schedule
//!
//! ```
//! use stacks_cron::ScheduleBuilder;
//!
//! let mut builder = ScheduleBuilder::new();
//! builder.weekly().mondays().at("08:00");
//! assert_eq!(builder.spec().unwrap().to_string(), "0 8 * * 1");
//!
//! let mut builder = ScheduleBuilder::new();
//! builder.every_fifteen_minutes().weekdays();
//! assert_eq!(builder.spec().unwrap().to_string(), "*/15 * * * 1-5");
//! ```
//!
//! Contradictory chains are rejected when the entry is built:
//!
//! ```
//! use stacks_cron::{ScheduleBuilder, ScheduleDefinitionError};
//!
//! let mut builder = ScheduleBuilder::new();
//! builder.every_minute().at("13:00");
//! assert!(matches!(
//!     builder.spec(),
//!     Err(ScheduleDefinitionError::IncompatibleModifier { .. })
//! ));
//! ```
//!
//! ## Cron expressions
//!
//! ```
//! use stacks_cron::CronSpec;
//!
//! let spec: CronSpec = "0 9 * * 1-5".parse().unwrap();
//! assert!(spec.matches(0, 9, 15, 1, 1));
//! assert!(!spec.matches(0, 9, 14, 1, 0));
//! ```
//!
//! ## Registering entries
//!
//! ```
//! use stacks_cron::{define, SchedulerContext};
//!
//! let registry = define(|run: &mut SchedulerContext| {
//!     run.command("php artisan inspire").hourly();
//!     run.job("SendDigest").weekly().mondays().at("08:00").timezone("Europe/Berlin");
//!     run.action("PruneSessions").daily_at(3, 0);
//! })
//! .unwrap();
//!
//! assert_eq!(registry.len(), 3);
//! ```

pub mod builder;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod expression;
pub mod registry;
pub mod scheduler;
pub mod zone;

pub use builder::ScheduleBuilder;
pub use dispatch::{CommandOutput, CommandRunner, DispatchOutcome, Dispatcher, ShellCommandRunner};
pub use entry::{CallbackFn, Condition, ScheduleEntry, Target, TimeWindow};
pub use error::{CronError, CronResult, ScheduleDefinitionError, TickEvaluationError};
pub use expression::{CronField, CronPresets, CronSpec, FieldKind};
pub use registry::{define, ScheduleRegistry, SchedulerContext};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport};
pub use zone::{WallClock, Zone};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::ScheduleBuilder;
    pub use crate::dispatch::{Dispatcher, ShellCommandRunner};
    pub use crate::entry::{ScheduleEntry, Target};
    pub use crate::error::{CronError, CronResult, ScheduleDefinitionError};
    pub use crate::expression::CronSpec;
    pub use crate::registry::{define, ScheduleRegistry, SchedulerContext};
    pub use crate::scheduler::{Scheduler, SchedulerConfig};
    pub use crate::zone::Zone;
}
