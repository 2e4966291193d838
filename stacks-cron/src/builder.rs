//! Fluent schedule builder.
//!
//! A [`ScheduleBuilder`] starts from one *cadence* method (`every_minute`,
//! `daily`, `weekly`, ...) and is narrowed by *modifiers* (`at`, `mondays`,
//! `timezone`, ...). Every method takes and returns `&mut Self` so calls can
//! be chained on the builder handed out by the registration context:
//!
//! ```
//! use stacks_cron::ScheduleBuilder;
//!
//! let mut builder = ScheduleBuilder::new();
//! builder.weekly().mondays().at("13:00");
//! assert_eq!(builder.spec().unwrap().to_string(), "0 13 * * 1");
//! ```
//!
//! Mistakes are remembered and reported by [`ScheduleBuilder::spec`] or
//! [`ScheduleBuilder::build`], so an invalid chain never yields a cron
//! expression:
//!
//! ```
//! use stacks_cron::{ScheduleBuilder, ScheduleDefinitionError};
//!
//! let mut builder = ScheduleBuilder::new();
//! builder.mondays();
//! assert!(matches!(
//!     builder.spec(),
//!     Err(ScheduleDefinitionError::DayModifierWithoutCadence { .. })
//! ));
//! ```

use crate::entry::{parse_clock, Condition, ScheduleEntry, Target, TimeWindow};
use crate::error::ScheduleDefinitionError;
use crate::expression::{CronField, CronSpec};
use crate::zone::Zone;
use chrono::Timelike;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CadenceKind {
    /// Runs several times an hour or every few hours
    SubDaily,
    Daily,
    TwiceDaily,
    Weekly,
    /// Pinned to days of the month
    DayOfMonth,
    /// Raw expression
    Expression,
}

#[derive(Debug, Clone)]
struct Cadence {
    method: &'static str,
    kind: CadenceKind,
    spec: CronSpec,
}

/// Incrementally built schedule. See the [module docs](self).
#[derive(Debug, Clone, Default)]
pub struct ScheduleBuilder {
    cadence: Option<Cadence>,
    at: Option<(u8, u8)>,
    days: Option<(&'static str, BTreeSet<u8>)>,
    timezone: Option<String>,
    name: Option<String>,
    window: Option<TimeWindow>,
    condition: Option<Condition>,
    without_overlapping: bool,
    error: Option<ScheduleDefinitionError>,
}

fn spec_of(minute: CronField, hour: CronField, day_of_month: CronField, month: CronField) -> CronSpec {
    CronSpec {
        minute,
        hour,
        day_of_month,
        month,
        day_of_week: CronField::Any,
    }
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, error: ScheduleDefinitionError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn checked(&mut self, field: &str, value: u32, min: u8, max: u8) -> Option<u8> {
        match u8::try_from(value) {
            Ok(v) if (min..=max).contains(&v) => Some(v),
            _ => {
                self.fail(ScheduleDefinitionError::out_of_range(
                    field,
                    i64::from(value),
                    i64::from(min),
                    i64::from(max),
                ));
                None
            }
        }
    }

    fn cadence(&mut self, method: &'static str, kind: CadenceKind, spec: CronSpec) -> &mut Self {
        if let Some(existing) = &self.cadence {
            let existing = existing.method.to_string();
            self.fail(ScheduleDefinitionError::CadenceAlreadySet {
                existing,
                attempted: method.to_string(),
            });
        } else if self.at.is_some() || self.days.is_some() {
            self.fail(ScheduleDefinitionError::CadenceAfterRefinement {
                cadence: method.to_string(),
            });
        } else {
            self.cadence = Some(Cadence { method, kind, spec });
        }
        self
    }

    fn minutes_cadence(&mut self, method: &'static str, n: u32) -> &mut Self {
        let Some(n) = self.checked("minute interval", n, 1, 59) else {
            return self;
        };
        let minute = if n == 1 {
            CronField::Any
        } else {
            CronField::stepped(0, 59, n)
        };
        let spec = spec_of(minute, CronField::Any, CronField::Any, CronField::Any);
        self.cadence(method, CadenceKind::SubDaily, spec)
    }

    fn hours_cadence(&mut self, method: &'static str, n: u32) -> &mut Self {
        let Some(n) = self.checked("hour interval", n, 1, 23) else {
            return self;
        };
        let hour = if n == 1 {
            CronField::Any
        } else {
            CronField::stepped(0, 23, n)
        };
        let spec = spec_of(CronField::single(0), hour, CronField::Any, CronField::Any);
        self.cadence(method, CadenceKind::SubDaily, spec)
    }

    /// Same as [`every_minute`](Self::every_minute): cron has no seconds
    /// field, so one minute is the finest cadence available.
    pub fn every_second(&mut self) -> &mut Self {
        self.minutes_cadence("every_second", 1)
    }

    pub fn every_minute(&mut self) -> &mut Self {
        self.minutes_cadence("every_minute", 1)
    }

    pub fn every_two_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_two_minutes", 2)
    }

    pub fn every_three_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_three_minutes", 3)
    }

    pub fn every_four_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_four_minutes", 4)
    }

    pub fn every_five_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_five_minutes", 5)
    }

    pub fn every_ten_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_ten_minutes", 10)
    }

    pub fn every_fifteen_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_fifteen_minutes", 15)
    }

    pub fn every_thirty_minutes(&mut self) -> &mut Self {
        self.minutes_cadence("every_thirty_minutes", 30)
    }

    /// Every `n` minutes past the hour, starting at minute 0.
    pub fn every_minutes(&mut self, n: u32) -> &mut Self {
        self.minutes_cadence("every_minutes", n)
    }

    pub fn hourly(&mut self) -> &mut Self {
        self.hours_cadence("hourly", 1)
    }

    pub fn hourly_at(&mut self, minute: u32) -> &mut Self {
        let Some(minute) = self.checked("minute", minute, 0, 59) else {
            return self;
        };
        let spec = spec_of(CronField::single(minute), CronField::Any, CronField::Any, CronField::Any);
        self.cadence("hourly_at", CadenceKind::SubDaily, spec)
    }

    /// Every `n` hours on the hour, starting at midnight.
    pub fn every_hours(&mut self, n: u32) -> &mut Self {
        self.hours_cadence("every_hours", n)
    }

    pub fn every_two_hours(&mut self) -> &mut Self {
        self.hours_cadence("every_two_hours", 2)
    }

    pub fn every_three_hours(&mut self) -> &mut Self {
        self.hours_cadence("every_three_hours", 3)
    }

    pub fn every_four_hours(&mut self) -> &mut Self {
        self.hours_cadence("every_four_hours", 4)
    }

    pub fn every_six_hours(&mut self) -> &mut Self {
        self.hours_cadence("every_six_hours", 6)
    }

    /// 01:00, 03:00, ..., 23:00
    pub fn every_odd_hour(&mut self) -> &mut Self {
        let spec = spec_of(
            CronField::single(0),
            CronField::stepped(1, 23, 2),
            CronField::Any,
            CronField::Any,
        );
        self.cadence("every_odd_hour", CadenceKind::SubDaily, spec)
    }

    /// Midnight every day.
    pub fn daily(&mut self) -> &mut Self {
        let spec = spec_of(CronField::single(0), CronField::single(0), CronField::Any, CronField::Any);
        self.cadence("daily", CadenceKind::Daily, spec)
    }

    pub fn daily_at(&mut self, hour: u32, minute: u32) -> &mut Self {
        let (Some(hour), Some(minute)) = (
            self.checked("hour", hour, 0, 23),
            self.checked("minute", minute, 0, 59),
        ) else {
            return self;
        };
        let spec = spec_of(
            CronField::single(minute),
            CronField::single(hour),
            CronField::Any,
            CronField::Any,
        );
        self.cadence("daily_at", CadenceKind::Daily, spec)
    }

    /// On the hour at `first` and `second`.
    pub fn twice_daily(&mut self, first: u32, second: u32) -> &mut Self {
        let (Some(first), Some(second)) = (
            self.checked("hour", first, 0, 23),
            self.checked("hour", second, 0, 23),
        ) else {
            return self;
        };
        let spec = spec_of(
            CronField::single(0),
            CronField::list([first, second]),
            CronField::Any,
            CronField::Any,
        );
        self.cadence("twice_daily", CadenceKind::TwiceDaily, spec)
    }

    /// Midnight on every `n`th day of the month, starting on the 1st.
    pub fn every_days(&mut self, n: u32) -> &mut Self {
        let Some(n) = self.checked("day interval", n, 1, 31) else {
            return self;
        };
        let spec = spec_of(
            CronField::single(0),
            CronField::single(0),
            CronField::stepped(1, 31, n),
            CronField::Any,
        );
        self.cadence("every_days", CadenceKind::DayOfMonth, spec)
    }

    /// Midnight on Sundays.
    pub fn weekly(&mut self) -> &mut Self {
        let mut spec = spec_of(CronField::single(0), CronField::single(0), CronField::Any, CronField::Any);
        spec.day_of_week = CronField::single(0);
        self.cadence("weekly", CadenceKind::Weekly, spec)
    }

    /// Midnight on the 1st.
    pub fn monthly(&mut self) -> &mut Self {
        let spec = spec_of(
            CronField::single(0),
            CronField::single(0),
            CronField::single(1),
            CronField::Any,
        );
        self.cadence("monthly", CadenceKind::DayOfMonth, spec)
    }

    pub fn monthly_on(&mut self, day: u32) -> &mut Self {
        let Some(day) = self.checked("day of month", day, 1, 31) else {
            return self;
        };
        let spec = spec_of(
            CronField::single(0),
            CronField::single(0),
            CronField::single(day),
            CronField::Any,
        );
        self.cadence("monthly_on", CadenceKind::DayOfMonth, spec)
    }

    /// Midnight on the first day of January, April, July and October.
    pub fn quarterly(&mut self) -> &mut Self {
        let spec = spec_of(
            CronField::single(0),
            CronField::single(0),
            CronField::single(1),
            CronField::list([1, 4, 7, 10]),
        );
        self.cadence("quarterly", CadenceKind::DayOfMonth, spec)
    }

    /// Midnight on January 1st.
    pub fn yearly(&mut self) -> &mut Self {
        let spec = spec_of(
            CronField::single(0),
            CronField::single(0),
            CronField::single(1),
            CronField::single(1),
        );
        self.cadence("yearly", CadenceKind::DayOfMonth, spec)
    }

    pub fn annually(&mut self) -> &mut Self {
        self.yearly()
    }

    /// Raw five-field expression.
    pub fn cron(&mut self, expression: &str) -> &mut Self {
        match CronSpec::parse(expression) {
            Ok(spec) => self.cadence("cron", CadenceKind::Expression, spec),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    /// Run at `HH:MM`. Without a cadence this means daily.
    pub fn at(&mut self, time: &str) -> &mut Self {
        match parse_clock(time) {
            Ok(t) => self.at = Some((t.hour() as u8, t.minute() as u8)),
            Err(e) => self.fail(e),
        }
        self
    }

    fn on_days(&mut self, modifier: &'static str, days: BTreeSet<u8>) -> &mut Self {
        self.days = Some((modifier, days));
        self
    }

    /// Monday to Friday.
    pub fn weekdays(&mut self) -> &mut Self {
        self.on_days("weekdays", (1..=5).collect())
    }

    /// Saturday and Sunday.
    pub fn weekends(&mut self) -> &mut Self {
        self.on_days("weekends", BTreeSet::from([0, 6]))
    }

    pub fn sundays(&mut self) -> &mut Self {
        self.on_days("sundays", BTreeSet::from([0]))
    }

    pub fn mondays(&mut self) -> &mut Self {
        self.on_days("mondays", BTreeSet::from([1]))
    }

    pub fn tuesdays(&mut self) -> &mut Self {
        self.on_days("tuesdays", BTreeSet::from([2]))
    }

    pub fn wednesdays(&mut self) -> &mut Self {
        self.on_days("wednesdays", BTreeSet::from([3]))
    }

    pub fn thursdays(&mut self) -> &mut Self {
        self.on_days("thursdays", BTreeSet::from([4]))
    }

    pub fn fridays(&mut self) -> &mut Self {
        self.on_days("fridays", BTreeSet::from([5]))
    }

    pub fn saturdays(&mut self) -> &mut Self {
        self.on_days("saturdays", BTreeSet::from([6]))
    }

    /// Explicit days of the week, 0 (or 7) = Sunday.
    pub fn days(&mut self, days: &[u32]) -> &mut Self {
        if days.is_empty() {
            self.fail(ScheduleDefinitionError::EmptyDays);
            return self;
        }
        let mut set = BTreeSet::new();
        for day in days {
            match self.checked("day of week", *day, 0, 7) {
                Some(d) => {
                    set.insert(d % 7);
                }
                None => return self,
            }
        }
        self.on_days("days", set)
    }

    /// Evaluate in the given IANA zone instead of the scheduler default.
    pub fn timezone(&mut self, zone: &str) -> &mut Self {
        match Zone::parse(zone) {
            Ok(_) => self.timezone = Some(zone.trim().to_string()),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Display name for listings and logs.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Only run while the local time is within `start..=end`.
    pub fn between(&mut self, start: &str, end: &str) -> &mut Self {
        match TimeWindow::parse(start, end) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Only run when `predicate` returns true at tick time.
    pub fn when<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Condition::new(predicate));
        self
    }

    /// Skip a tick while the previous run of this entry is still going.
    pub fn without_overlapping(&mut self) -> &mut Self {
        self.without_overlapping = true;
        self
    }

    pub(crate) fn entry_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Validate the chain and produce its cron spec.
    pub fn spec(&self) -> Result<CronSpec, ScheduleDefinitionError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let (method, kind, mut spec) = match (&self.cadence, &self.at, &self.days) {
            (Some(c), _, _) => (c.method, c.kind, c.spec.clone()),
            (None, Some(_), _) => (
                "daily",
                CadenceKind::Daily,
                spec_of(CronField::single(0), CronField::single(0), CronField::Any, CronField::Any),
            ),
            (None, None, Some((modifier, _))) => {
                return Err(ScheduleDefinitionError::DayModifierWithoutCadence {
                    modifier: modifier.to_string(),
                })
            }
            (None, None, None) => return Err(ScheduleDefinitionError::MissingCadence),
        };

        if let Some((hour, minute)) = self.at {
            if matches!(
                kind,
                CadenceKind::SubDaily | CadenceKind::TwiceDaily | CadenceKind::Expression
            ) {
                return Err(ScheduleDefinitionError::IncompatibleModifier {
                    modifier: "at".to_string(),
                    cadence: method.to_string(),
                });
            }
            spec.hour = CronField::single(hour);
            spec.minute = CronField::single(minute);
        }

        if let Some((modifier, days)) = &self.days {
            if matches!(kind, CadenceKind::DayOfMonth | CadenceKind::Expression) {
                return Err(ScheduleDefinitionError::IncompatibleModifier {
                    modifier: modifier.to_string(),
                    cadence: method.to_string(),
                });
            }
            spec.day_of_week = CronField::Values(days.clone());
        }

        Ok(spec)
    }

    /// Validate the chain and attach it to `target`.
    pub fn build(&self, target: Target) -> Result<ScheduleEntry, ScheduleDefinitionError> {
        let spec = self.spec()?;
        Ok(ScheduleEntry {
            target,
            spec,
            timezone: self.timezone.clone(),
            name: self.name.clone(),
            window: self.window,
            condition: self.condition.clone(),
            without_overlapping: self.without_overlapping,
        })
    }

    /// Apply a textual chain such as `weekly().mondays().at('13:00')`.
    ///
    /// Method names may be camelCase or snake_case. Arguments are integers,
    /// quoted strings, or `[..]` integer lists for `days`.
    ///
    /// ```
    /// use stacks_cron::ScheduleBuilder;
    ///
    /// let mut builder = ScheduleBuilder::new();
    /// builder.apply_chain("everyFiveMinutes().weekdays().between('08:00', '17:00')").unwrap();
    /// assert_eq!(builder.spec().unwrap().to_string(), "*/5 * * * 1-5");
    /// ```
    pub fn apply_chain(&mut self, chain: &str) -> Result<&mut Self, ScheduleDefinitionError> {
        for call in parse_chain(chain)? {
            self.apply_call(chain, &call)?;
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }

    fn apply_call(&mut self, chain: &str, call: &ChainCall) -> Result<(), ScheduleDefinitionError> {
        let method = snake_case(&call.method);
        let wrong_args = || ScheduleDefinitionError::InvalidChain {
            chain: chain.to_string(),
            reason: format!("wrong arguments for {}()", call.method),
        };
        let args = call.args.as_slice();

        match (method.as_str(), args) {
            ("every_second", []) => self.every_second(),
            ("every_minute", []) => self.every_minute(),
            ("every_two_minutes", []) => self.every_two_minutes(),
            ("every_three_minutes", []) => self.every_three_minutes(),
            ("every_four_minutes", []) => self.every_four_minutes(),
            ("every_five_minutes", []) => self.every_five_minutes(),
            ("every_ten_minutes", []) => self.every_ten_minutes(),
            ("every_fifteen_minutes", []) => self.every_fifteen_minutes(),
            ("every_thirty_minutes", []) => self.every_thirty_minutes(),
            ("every_minutes", [n]) => self.every_minutes(n.int().ok_or_else(wrong_args)?),
            ("hourly", []) => self.hourly(),
            ("hourly_at", [m]) => self.hourly_at(m.int().ok_or_else(wrong_args)?),
            ("every_hours", [n]) => self.every_hours(n.int().ok_or_else(wrong_args)?),
            ("every_two_hours", []) => self.every_two_hours(),
            ("every_three_hours", []) => self.every_three_hours(),
            ("every_four_hours", []) => self.every_four_hours(),
            ("every_six_hours", []) => self.every_six_hours(),
            ("every_odd_hour", []) => self.every_odd_hour(),
            ("daily", []) => self.daily(),
            ("daily_at", [ChainArg::Str(time)]) => {
                let time = parse_clock(time)?;
                self.daily_at(time.hour(), time.minute())
            }
            ("daily_at", [h, m]) => self.daily_at(
                h.int().ok_or_else(wrong_args)?,
                m.int().ok_or_else(wrong_args)?,
            ),
            ("twice_daily", []) => self.twice_daily(1, 13),
            ("twice_daily", [a, b]) => self.twice_daily(
                a.int().ok_or_else(wrong_args)?,
                b.int().ok_or_else(wrong_args)?,
            ),
            ("every_days", [n]) => self.every_days(n.int().ok_or_else(wrong_args)?),
            ("weekly", []) => self.weekly(),
            ("monthly", []) => self.monthly(),
            ("monthly_on", [d]) => self.monthly_on(d.int().ok_or_else(wrong_args)?),
            ("quarterly", []) => self.quarterly(),
            ("yearly", []) | ("annually", []) => self.yearly(),
            ("cron", [ChainArg::Str(expression)]) => self.cron(expression),
            ("at", [ChainArg::Str(time)]) => self.at(time),
            ("weekdays", []) => self.weekdays(),
            ("weekends", []) => self.weekends(),
            ("sundays", []) => self.sundays(),
            ("mondays", []) => self.mondays(),
            ("tuesdays", []) => self.tuesdays(),
            ("wednesdays", []) => self.wednesdays(),
            ("thursdays", []) => self.thursdays(),
            ("fridays", []) => self.fridays(),
            ("saturdays", []) => self.saturdays(),
            ("days" | "on_days", [ChainArg::List(days)]) => self.days(days),
            ("days" | "on_days", ints) if !ints.is_empty() => {
                let days = ints
                    .iter()
                    .map(ChainArg::int)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(wrong_args)?;
                self.days(&days)
            }
            ("timezone", [ChainArg::Str(zone)]) => self.timezone(zone),
            ("name", [ChainArg::Str(name)]) => self.name(name.clone()),
            ("between", [ChainArg::Str(start), ChainArg::Str(end)]) => self.between(start, end),
            ("without_overlapping", []) => self.without_overlapping(),
            (name, _) if KNOWN_METHODS.contains(&name) => return Err(wrong_args()),
            _ => return Err(ScheduleDefinitionError::UnknownMethod(call.method.clone())),
        };
        Ok(())
    }
}

const KNOWN_METHODS: &[&str] = &[
    "every_second",
    "every_minute",
    "every_two_minutes",
    "every_three_minutes",
    "every_four_minutes",
    "every_five_minutes",
    "every_ten_minutes",
    "every_fifteen_minutes",
    "every_thirty_minutes",
    "every_minutes",
    "hourly",
    "hourly_at",
    "every_hours",
    "every_two_hours",
    "every_three_hours",
    "every_four_hours",
    "every_six_hours",
    "every_odd_hour",
    "daily",
    "daily_at",
    "twice_daily",
    "every_days",
    "weekly",
    "monthly",
    "monthly_on",
    "quarterly",
    "yearly",
    "annually",
    "cron",
    "at",
    "weekdays",
    "weekends",
    "sundays",
    "mondays",
    "tuesdays",
    "wednesdays",
    "thursdays",
    "fridays",
    "saturdays",
    "days",
    "on_days",
    "timezone",
    "name",
    "between",
    "without_overlapping",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChainArg {
    Int(u32),
    Str(String),
    List(Vec<u32>),
}

impl ChainArg {
    fn int(&self) -> Option<u32> {
        match self {
            ChainArg::Int(v) => Some(*v),
            ChainArg::Str(s) => s.trim().parse().ok(),
            ChainArg::List(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainCall {
    method: String,
    args: Vec<ChainArg>,
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

struct ChainParser<'a> {
    chain: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn parse_chain(chain: &str) -> Result<Vec<ChainCall>, ScheduleDefinitionError> {
    let mut parser = ChainParser {
        chain,
        chars: chain.chars().collect(),
        pos: 0,
    };
    let mut calls = Vec::new();

    parser.skip_ws();
    if parser.peek().is_none() {
        return Err(parser.error("chain is empty"));
    }
    loop {
        calls.push(parser.call()?);
        parser.skip_ws();
        match parser.bump() {
            None => break,
            Some('.') => parser.skip_ws(),
            Some(c) => return Err(parser.error(&format!("unexpected '{}'", c))),
        }
    }
    Ok(calls)
}

impl ChainParser<'_> {
    fn error(&self, reason: &str) -> ScheduleDefinitionError {
        ScheduleDefinitionError::InvalidChain {
            chain: self.chain.to_string(),
            reason: format!("{} at position {}", reason, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ScheduleDefinitionError> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn call(&mut self) -> Result<ChainCall, ScheduleDefinitionError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a method name"));
        }
        let method: String = self.chars[start..self.pos].iter().collect();

        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(ChainCall { method, args });
        }
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => break,
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
        Ok(ChainCall { method, args })
    }

    fn arg(&mut self) -> Result<ChainArg, ScheduleDefinitionError> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                self.expect(quote)?;
                Ok(ChainArg::Str(text))
            }
            Some('[') => {
                self.pos += 1;
                let mut values = Vec::new();
                self.skip_ws();
                if self.peek() == Some(']') {
                    self.pos += 1;
                    return Ok(ChainArg::List(values));
                }
                loop {
                    values.push(self.int()?);
                    self.skip_ws();
                    match self.bump() {
                        Some(',') => continue,
                        Some(']') => break,
                        _ => return Err(self.error("expected ',' or ']'")),
                    }
                }
                Ok(ChainArg::List(values))
            }
            _ => Ok(ChainArg::Int(self.int()?)),
        }
    }

    fn int(&mut self) -> Result<u32, ScheduleDefinitionError> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| self.error("expected a non-negative integer"))
    }
}
