//! Timezone resolution for schedule evaluation.

use crate::error::ScheduleDefinitionError;
use crate::expression::CronSpec;
use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Zone an entry is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's local timezone
    #[default]
    Local,
    /// An IANA zone such as `America/Los_Angeles`
    Named(Tz),
}

/// Wall-clock fields of an instant in some zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    /// 0 = Sunday
    pub weekday: u8,
}

impl WallClock {
    fn of<Z: TimeZone>(at: &DateTime<Z>) -> Self {
        Self {
            minute: at.minute() as u8,
            hour: at.hour() as u8,
            day: at.day() as u8,
            month: at.month() as u8,
            weekday: at.weekday().num_days_from_sunday() as u8,
        }
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl Zone {
    /// Parse an IANA zone name.
    pub fn parse(name: &str) -> Result<Self, ScheduleDefinitionError> {
        name.trim()
            .parse::<Tz>()
            .map(Zone::Named)
            .map_err(|_| ScheduleDefinitionError::UnknownTimezone(name.to_string()))
    }

    /// Wall-clock reading of `at` in this zone.
    pub fn wall_clock(&self, at: DateTime<Utc>) -> WallClock {
        match self {
            Zone::Local => WallClock::of(&at.with_timezone(&Local)),
            Zone::Named(tz) => WallClock::of(&at.with_timezone(tz)),
        }
    }

    /// Whether `spec` matches the minute containing `at`, read in this zone.
    pub fn matches(&self, spec: &CronSpec, at: DateTime<Utc>) -> bool {
        let clock = self.wall_clock(at);
        spec.matches(clock.minute, clock.hour, clock.day, clock.month, clock.weekday)
    }

    /// Next matching instant after `after`, evaluated in this zone.
    pub fn next_run(&self, spec: &CronSpec, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Zone::Local => spec
                .next_after(&after.with_timezone(&Local))
                .map(|t| t.with_timezone(&Utc)),
            Zone::Named(tz) => spec
                .next_after(&after.with_timezone(tz))
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => f.write_str("local"),
            Zone::Named(tz) => f.write_str(tz.name()),
        }
    }
}
