//! Five-field cron expressions.
//!
//! A [`CronSpec`] holds the minute, hour, day-of-month, month and day-of-week
//! fields of a standard cron expression. Days of the week run from 0 (Sunday)
//! to 6 (Saturday); `7` is accepted as Sunday when parsing. When both day
//! fields are restricted, a time has to satisfy both.

use crate::error::ScheduleDefinitionError;
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use cron::Schedule;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// One of the five positions in a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::DayOfMonth => "day of month",
            FieldKind::Month => "month",
            FieldKind::DayOfWeek => "day of week",
        }
    }

    /// Inclusive value range.
    pub fn bounds(&self) -> (u8, u8) {
        match self {
            FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::DayOfMonth => (1, 31),
            FieldKind::Month => (1, 12),
            FieldKind::DayOfWeek => (0, 6),
        }
    }
}

/// A single cron field: either unrestricted or an explicit set of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CronField {
    Any,
    Values(BTreeSet<u8>),
}

impl CronField {
    pub fn single(value: u8) -> Self {
        CronField::Values(BTreeSet::from([value]))
    }

    pub fn list(values: impl IntoIterator<Item = u8>) -> Self {
        CronField::Values(values.into_iter().collect())
    }

    /// `start, start + step, ...` up to `max`.
    pub fn stepped(start: u8, max: u8, step: u8) -> Self {
        CronField::Values((start..=max).step_by(usize::from(step.max(1))).collect())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, CronField::Any)
    }

    pub fn contains(&self, value: u8) -> bool {
        match self {
            CronField::Any => true,
            CronField::Values(values) => values.contains(&value),
        }
    }

    fn render(&self, kind: FieldKind) -> String {
        let values = match self {
            CronField::Any => return "*".to_string(),
            CronField::Values(values) => values,
        };
        let (min, max) = kind.bounds();
        if values.len() == usize::from(max - min + 1) {
            return "*".to_string();
        }

        let list: Vec<u8> = values.iter().copied().collect();
        if kind != FieldKind::DayOfWeek {
            if let Some(text) = render_progression(&list, min, max) {
                return text;
            }
        }
        render_runs(&list)
    }

    /// Comma-separated form understood by the `cron` crate.
    fn render_for_engine(&self, kind: FieldKind) -> String {
        match self {
            CronField::Any => "*".to_string(),
            CronField::Values(values) => values
                .iter()
                .map(|v| match kind {
                    FieldKind::DayOfWeek => WEEKDAY_NAMES[usize::from(*v % 7)].to_string(),
                    _ => v.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// `*/n` when the values step from the field minimum to the end of the range,
/// `a-b/n` for other arithmetic progressions of three or more values.
fn render_progression(list: &[u8], min: u8, max: u8) -> Option<String> {
    if list.len() < 2 {
        return None;
    }
    let step = list[1] - list[0];
    if step < 2 || list.windows(2).any(|w| w[1] - w[0] != step) {
        return None;
    }
    let first = list[0];
    let last = list[list.len() - 1];
    let reaches_end = u16::from(last) + u16::from(step) > u16::from(max);
    if first == min && reaches_end {
        Some(format!("*/{}", step))
    } else if list.len() >= 3 {
        Some(format!("{}-{}/{}", first, last, step))
    } else {
        None
    }
}

/// `a-b` for contiguous runs of three or more, plain values otherwise.
fn render_runs(list: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < list.len() {
        let mut j = i;
        while j + 1 < list.len() && list[j + 1] == list[j] + 1 {
            j += 1;
        }
        if j - i >= 2 {
            parts.push(format!("{}-{}", list[i], list[j]));
        } else {
            parts.extend(list[i..=j].iter().map(u8::to_string));
        }
        i = j + 1;
    }
    parts.join(",")
}

/// A parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CronSpec {
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronSpec {
    /// `* * * * *`
    pub fn every_minute() -> Self {
        Self {
            minute: CronField::Any,
            hour: CronField::Any,
            day_of_month: CronField::Any,
            month: CronField::Any,
            day_of_week: CronField::Any,
        }
    }

    /// Parse a five-field expression.
    ///
    /// Supports `*`, lists, ranges, steps, month and weekday names and the
    /// nicknames `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
    /// `@midnight` and `@hourly`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stacks_cron::CronSpec;
    ///
    /// // Every Monday at 13:00
    /// let spec = CronSpec::parse("0 13 * * MON").unwrap();
    /// assert!(spec.matches(0, 13, 15, 1, 1));
    ///
    /// // Seconds are not supported
    /// assert!(CronSpec::parse("0 0 13 * * MON").is_err());
    /// ```
    pub fn parse(expression: &str) -> Result<Self, ScheduleDefinitionError> {
        let invalid = |reason: String| ScheduleDefinitionError::InvalidExpression {
            expression: expression.to_string(),
            reason,
        };

        let trimmed = expression.trim();
        let expanded = if trimmed.starts_with('@') {
            nickname(trimmed).ok_or_else(|| invalid(format!("unknown nickname {}", trimmed)))?
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            let reason = if fields.len() == 6 {
                "expected 5 fields, got 6 (seconds are not supported)".to_string()
            } else {
                format!("expected 5 fields, got {}", fields.len())
            };
            return Err(invalid(reason));
        }

        let parse = |text: &str, kind: FieldKind| parse_field(text, kind).map_err(&invalid);
        Ok(Self {
            minute: parse(fields[0], FieldKind::Minute)?,
            hour: parse(fields[1], FieldKind::Hour)?,
            day_of_month: parse(fields[2], FieldKind::DayOfMonth)?,
            month: parse(fields[3], FieldKind::Month)?,
            day_of_week: parse(fields[4], FieldKind::DayOfWeek)?,
        })
    }

    /// Whether the given wall-clock minute matches. `weekday` is 0 for Sunday.
    pub fn matches(&self, minute: u8, hour: u8, day: u8, month: u8, weekday: u8) -> bool {
        self.minute.contains(minute)
            && self.hour.contains(hour)
            && self.day_of_month.contains(day)
            && self.month.contains(month)
            && self.day_of_week.contains(weekday % 7)
    }

    /// Whether `at`, read in its own timezone, falls on a matching minute.
    pub fn matches_at<Z: TimeZone>(&self, at: &DateTime<Z>) -> bool {
        self.matches(
            at.minute() as u8,
            at.hour() as u8,
            at.day() as u8,
            at.month() as u8,
            at.weekday().num_days_from_sunday() as u8,
        )
    }

    /// First matching minute strictly after `after`, in the same timezone.
    ///
    /// Returns `None` for expressions that can never match (such as the 30th
    /// of February).
    pub fn next_after<Z: TimeZone>(&self, after: &DateTime<Z>) -> Option<DateTime<Z>> {
        let schedule = Schedule::from_str(&self.engine_expression()).ok()?;
        schedule.after(after).next()
    }

    /// Six-field form (leading seconds) with weekday names, as the `cron`
    /// crate numbers weekdays from 1.
    fn engine_expression(&self) -> String {
        format!(
            "0 {} {} {} {} {}",
            self.minute.render_for_engine(FieldKind::Minute),
            self.hour.render_for_engine(FieldKind::Hour),
            self.day_of_month.render_for_engine(FieldKind::DayOfMonth),
            self.month.render_for_engine(FieldKind::Month),
            self.day_of_week.render_for_engine(FieldKind::DayOfWeek),
        )
    }
}

impl Default for CronSpec {
    fn default() -> Self {
        Self::every_minute()
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute.render(FieldKind::Minute),
            self.hour.render(FieldKind::Hour),
            self.day_of_month.render(FieldKind::DayOfMonth),
            self.month.render(FieldKind::Month),
            self.day_of_week.render(FieldKind::DayOfWeek),
        )
    }
}

impl FromStr for CronSpec {
    type Err = ScheduleDefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn nickname(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some(CronPresets::YEARLY),
        "@monthly" => Some(CronPresets::MONTHLY),
        "@weekly" => Some(CronPresets::WEEKLY),
        "@daily" | "@midnight" => Some(CronPresets::DAILY),
        "@hourly" => Some(CronPresets::HOURLY),
        _ => None,
    }
}

fn parse_field(text: &str, kind: FieldKind) -> Result<CronField, String> {
    let (min, max) = kind.bounds();
    let day_field = matches!(kind, FieldKind::DayOfMonth | FieldKind::DayOfWeek);
    if text == "*" || (day_field && text == "?") {
        return Ok(CronField::Any);
    }

    let mut values = BTreeSet::new();
    for part in text.split(',') {
        if part.is_empty() {
            return Err(format!("empty list item in {} field '{}'", kind.name(), text));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .ok()
                    .filter(|s| *s >= 1)
                    .ok_or_else(|| format!("invalid step '{}' in {} field", step, kind.name()))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (field_value(a, kind)?, field_value(b, kind)?)
        } else {
            let value = field_value(range, kind)?;
            if step.is_some() {
                (value, max)
            } else {
                (value, value)
            }
        };

        if low > high {
            return Err(format!("range {}-{} is reversed in {} field", low, high, kind.name()));
        }

        for value in (low..=high).step_by(usize::from(step.unwrap_or(1))) {
            values.insert(if kind == FieldKind::DayOfWeek { value % 7 } else { value });
        }
    }

    if values.len() == usize::from(max - min + 1) {
        Ok(CronField::Any)
    } else {
        Ok(CronField::Values(values))
    }
}

fn field_value(token: &str, kind: FieldKind) -> Result<u8, String> {
    let upper = token.to_ascii_uppercase();
    let named = match kind {
        FieldKind::Month => MONTH_NAMES.iter().position(|n| *n == upper).map(|i| i as u8 + 1),
        FieldKind::DayOfWeek => WEEKDAY_NAMES.iter().position(|n| *n == upper).map(|i| i as u8),
        _ => None,
    };
    if let Some(value) = named {
        return Ok(value);
    }

    let (min, max) = kind.bounds();
    // 7 is an alias for Sunday
    let max = if kind == FieldKind::DayOfWeek { 7 } else { max };
    token
        .parse::<u8>()
        .ok()
        .filter(|v| (min..=max).contains(v))
        .ok_or_else(|| {
            format!(
                "'{}' is not a valid {} (expected {}-{})",
                token,
                kind.name(),
                min,
                max
            )
        })
}

/// Common cron expression presets.
pub struct CronPresets;

impl CronPresets {
    /// Every minute
    pub const EVERY_MINUTE: &'static str = "* * * * *";

    /// Every 5 minutes
    pub const EVERY_5_MINUTES: &'static str = "*/5 * * * *";

    /// Every 15 minutes
    pub const EVERY_15_MINUTES: &'static str = "*/15 * * * *";

    /// Every 30 minutes
    pub const EVERY_30_MINUTES: &'static str = "*/30 * * * *";

    /// Every hour, on the hour
    pub const HOURLY: &'static str = "0 * * * *";

    /// Every day at midnight
    pub const DAILY: &'static str = "0 0 * * *";

    /// Every week on Sunday at midnight
    pub const WEEKLY: &'static str = "0 0 * * 0";

    /// Every month on the 1st at midnight
    pub const MONTHLY: &'static str = "0 0 1 * *";

    /// First day of every quarter at midnight
    pub const QUARTERLY: &'static str = "0 0 1 */3 *";

    /// Every year on January 1st at midnight
    pub const YEARLY: &'static str = "0 0 1 1 *";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_valid_expression() {
        let spec = CronSpec::parse("*/15 9-17 * * MON-FRI").unwrap();
        assert!(spec.matches(30, 9, 3, 6, 1));
        assert!(!spec.matches(31, 9, 3, 6, 1));
        assert!(!spec.matches(30, 18, 3, 6, 1));
        assert!(!spec.matches(30, 9, 3, 6, 0));
    }

    #[test]
    fn test_parse_invalid_expression() {
        assert!(CronSpec::parse("invalid").is_err());
        assert!(CronSpec::parse("60 * * * *").is_err());
        assert!(CronSpec::parse("* 24 * * *").is_err());
        assert!(CronSpec::parse("* * 0 * *").is_err());
        assert!(CronSpec::parse("* * * 13 *").is_err());
        assert!(CronSpec::parse("* * * * 8").is_err());
        assert!(CronSpec::parse("5-1 * * * *").is_err());
        assert!(CronSpec::parse("*/0 * * * *").is_err());
        assert!(CronSpec::parse("@reboot").is_err());
    }

    #[test]
    fn test_six_fields_rejected() {
        let err = CronSpec::parse("0 * * * * *").unwrap_err();
        assert!(err.to_string().contains("seconds"));
    }

    #[test]
    fn test_names_and_sunday_alias() {
        let spec = CronSpec::parse("0 0 * JAN,dec 7").unwrap();
        assert_eq!(spec.month, CronField::list([1, 12]));
        assert_eq!(spec.day_of_week, CronField::single(0));
    }

    #[test]
    fn test_nicknames() {
        for (nick, text) in [
            ("@yearly", "0 0 1 1 *"),
            ("@annually", "0 0 1 1 *"),
            ("@monthly", "0 0 1 * *"),
            ("@weekly", "0 0 * * 0"),
            ("@daily", "0 0 * * *"),
            ("@midnight", "0 0 * * *"),
            ("@hourly", "0 * * * *"),
        ] {
            assert_eq!(CronSpec::parse(nick).unwrap().to_string(), text, "{nick}");
        }
    }

    #[test]
    fn test_display_is_canonical() {
        for text in [
            "* * * * *",
            "*/5 * * * *",
            "*/30 * * * *",
            "0 1-23/2 * * *",
            "0 1,13 * * *",
            "0 0 1 */3 *",
            "0 13 * * 1",
            "0 0 * * 1-5",
            "0 0 * * 0,6",
            "0 0 * * 1,3,5",
            "15,45 * * * *",
        ] {
            assert_eq!(CronSpec::parse(text).unwrap().to_string(), text);
        }
        // full ranges collapse to `*`
        assert_eq!(CronSpec::parse("0-59 * * * 0-6").unwrap().to_string(), "* * * * *");
    }

    #[test]
    fn test_day_fields_are_combined() {
        // 13th of the month that is also a Friday
        let spec = CronSpec::parse("0 0 13 * 5").unwrap();
        assert!(spec.matches(0, 0, 13, 9, 5));
        assert!(!spec.matches(0, 0, 13, 9, 4));
        assert!(!spec.matches(0, 0, 14, 9, 5));
    }

    #[test]
    fn test_next_after() {
        let spec = CronSpec::parse("0 13 * * 1").unwrap();
        // Sunday 2024-01-14 12:00 UTC
        let after = Utc.with_ymd_and_hms(2024, 1, 14, 12, 0, 0).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_next_after_sunday() {
        let spec = CronSpec::parse(CronPresets::WEEKLY).unwrap();
        // Wednesday 2024-01-17
        let after = Utc.with_ymd_and_hms(2024, 1, 17, 8, 30, 0).unwrap();
        let next = spec.next_after(&after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 21, 0, 0, 0).unwrap());
        assert!(spec.matches_at(&next));
    }

    #[test]
    fn test_presets_parse() {
        for preset in [
            CronPresets::EVERY_MINUTE,
            CronPresets::EVERY_5_MINUTES,
            CronPresets::EVERY_15_MINUTES,
            CronPresets::EVERY_30_MINUTES,
            CronPresets::HOURLY,
            CronPresets::DAILY,
            CronPresets::WEEKLY,
            CronPresets::MONTHLY,
            CronPresets::QUARTERLY,
            CronPresets::YEARLY,
        ] {
            assert_eq!(CronSpec::parse(preset).unwrap().to_string(), preset);
        }
    }
}
