//! Schedule entries: what to run and when.

use crate::error::{CronResult, ScheduleDefinitionError, TickEvaluationError};
use crate::expression::CronSpec;
use crate::zone::Zone;
use chrono::{DateTime, NaiveTime, Utc};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Inline scheduled function.
pub type CallbackFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = CronResult<()>> + Send>> + Send + Sync>;

/// What a schedule entry runs.
#[derive(Clone)]
pub enum Target {
    /// Shell command line
    Command(String),
    /// Script file executed directly
    Script(PathBuf),
    /// Named action from the action registry
    Action(String),
    /// Named job from the job registry
    Job(String),
    /// Inline function
    Callback(CallbackFn),
}

impl Target {
    /// Wrap an async closure as a [`Target::Callback`].
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CronResult<()>> + Send + 'static,
    {
        Target::Callback(Arc::new(
            move || -> Pin<Box<dyn Future<Output = CronResult<()>> + Send>> { Box::pin(f()) },
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Command(_) => "command",
            Target::Script(_) => "script",
            Target::Action(_) => "action",
            Target::Job(_) => "job",
            Target::Callback(_) => "callback",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Target::Command(command) => command.clone(),
            Target::Script(path) => path.display().to_string(),
            Target::Action(name) | Target::Job(name) => name.clone(),
            Target::Callback(_) => "<callback>".to_string(),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Callback(_) => f.write_str("Callback(<fn>)"),
            other => write!(f, "{}({:?})", capitalize(other.kind()), other.label()),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Local time-of-day window, inclusive at both ends.
///
/// A window whose end is earlier than its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleDefinitionError> {
        Ok(Self::new(parse_clock(start)?, parse_clock(end)?))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Parse `HH:MM` (hours 0-23, minutes 0-59).
pub(crate) fn parse_clock(text: &str) -> Result<NaiveTime, ScheduleDefinitionError> {
    let invalid = || ScheduleDefinitionError::InvalidTime(text.to_string());
    let (hour, minute) = text.trim().split_once(':').ok_or_else(invalid)?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .filter(|_| hour < 24 && minute < 60)
        .ok_or_else(invalid)
}

/// Extra predicate consulted on every tick the cron spec matches.
#[derive(Clone)]
pub struct Condition(Arc<dyn Fn() -> bool + Send + Sync>);

impl Condition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn check(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(<fn>)")
    }
}

/// A registered schedule: target plus cron spec and refinements.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub target: Target,
    pub spec: CronSpec,
    /// IANA zone name; the scheduler default applies when unset
    pub timezone: Option<String>,
    pub name: Option<String>,
    pub window: Option<TimeWindow>,
    pub condition: Option<Condition>,
    pub without_overlapping: bool,
}

impl ScheduleEntry {
    pub fn new(target: Target, spec: CronSpec) -> Self {
        Self {
            target,
            spec,
            timezone: None,
            name: None,
            window: None,
            condition: None,
            without_overlapping: false,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_overlap_prevention(mut self) -> Self {
        self.without_overlapping = true;
        self
    }

    /// Display name: the explicit name, else the target.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.target.label())
    }

    /// Zone this entry is evaluated in.
    pub fn zone(&self, default: Zone) -> Result<Zone, TickEvaluationError> {
        match &self.timezone {
            Some(name) => {
                Zone::parse(name).map_err(|e| TickEvaluationError::new(self.label(), e.to_string()))
            }
            None => Ok(default),
        }
    }

    /// Whether this entry should run for the minute containing `now`.
    ///
    /// The cron spec, window and condition are all read in the entry's zone.
    /// A panicking condition is reported as an error for this entry only.
    pub fn is_due(&self, now: DateTime<Utc>, default: Zone) -> Result<bool, TickEvaluationError> {
        let zone = self.zone(default)?;
        let clock = zone.wall_clock(now);
        let spec = &self.spec;
        if !spec.matches(clock.minute, clock.hour, clock.day, clock.month, clock.weekday) {
            return Ok(false);
        }
        if let Some(window) = &self.window {
            if !window.contains(clock.time()) {
                return Ok(false);
            }
        }
        match &self.condition {
            Some(condition) => catch_unwind(AssertUnwindSafe(|| condition.check()))
                .map_err(|_| TickEvaluationError::new(self.label(), "condition panicked")),
            None => Ok(true),
        }
    }

    /// Next time the cron spec fires after `after`. Window and condition are
    /// not taken into account.
    pub fn next_run(&self, after: DateTime<Utc>, default: Zone) -> Option<DateTime<Utc>> {
        self.zone(default).ok()?.next_run(&self.spec, after)
    }
}
