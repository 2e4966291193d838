//! Minute-aligned scheduler runtime.

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::entry::ScheduleEntry;
use crate::error::{CronError, CronResult, TickEvaluationError};
use crate::registry::ScheduleRegistry;
use crate::zone::Zone;
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use stacks_log::{debug, error, info, success, warn};
use stacks_queue::JobResult;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Also evaluate the minute the scheduler was started in
    pub run_on_start: bool,

    /// Whether to log each dispatch and its outcome
    pub log_execution: bool,

    /// Zone for entries without their own timezone
    pub default_timezone: Zone,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_on_start: false,
            log_execution: true,
            default_timezone: Zone::Local,
        }
    }
}

impl SchedulerConfig {
    pub fn with_run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_execution = enabled;
        self
    }

    pub fn with_default_timezone(mut self, zone: Zone) -> Self {
        self.default_timezone = zone;
        self
    }
}

/// Decision for one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Indices of entries whose schedule matched
    pub due: Vec<usize>,

    /// Due entries not dispatched because their previous run is still going
    pub skipped: Vec<usize>,

    /// Entries that could not be evaluated
    pub errors: Vec<TickEvaluationError>,
}

struct Shared {
    entries: Vec<ScheduleEntry>,
    dispatcher: Dispatcher,
    config: SchedulerConfig,
    in_flight: Mutex<JoinSet<()>>,
    active: StdMutex<HashSet<usize>>,
    last_tick: StdMutex<Option<DateTime<Utc>>>,
}

/// Marks an overlap-protected entry as running until dropped.
struct ActiveGuard {
    shared: Arc<Shared>,
    index: usize,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.shared
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.index);
    }
}

impl Shared {
    fn evaluate(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.is_due(now, self.config.default_timezone) {
                Ok(true) => report.due.push(index),
                Ok(false) => {}
                Err(e) => report.errors.push(e),
            }
        }
        report
    }

    fn claim(self: &Arc<Self>, index: usize) -> Option<ActiveGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(index).then(|| ActiveGuard {
            shared: Arc::clone(self),
            index,
        })
    }

    async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> TickReport {
        let mut report = self.evaluate(now);
        for e in &report.errors {
            error!("{}", e);
        }
        debug!(
            "Tick at {}: {} due, {} errors",
            now.format("%Y-%m-%d %H:%M"),
            report.due.len(),
            report.errors.len()
        );

        *self.last_tick.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);

        let mut in_flight = self.in_flight.lock().await;
        reap(&mut in_flight);

        for &index in &report.due {
            let Some(entry) = self.entries.get(index) else {
                continue;
            };
            let guard = if entry.without_overlapping {
                match self.claim(index) {
                    Some(guard) => Some(guard),
                    None => {
                        if self.config.log_execution {
                            warn!("Skipping '{}': previous run still in progress", entry.label());
                        }
                        report.skipped.push(index);
                        continue;
                    }
                }
            } else {
                None
            };

            let shared = Arc::clone(self);
            in_flight.spawn(async move {
                shared.run(index).await;
                drop(guard);
            });
        }
        report
    }

    async fn run(&self, index: usize) {
        let Some(entry) = self.entries.get(index) else {
            return;
        };
        let label = entry.label();
        let log = self.config.log_execution;
        if log {
            info!("Running scheduled {} '{}'", entry.target.kind(), label);
        }

        match self.dispatcher.dispatch(entry).await {
            Ok(DispatchOutcome::Completed) if log => success!("Scheduled '{}' finished", label),
            Ok(DispatchOutcome::Enqueued(id)) if log => {
                info!("Scheduled job '{}' queued as {}", label, id)
            }
            // the retry executor reports job attempts itself
            Ok(DispatchOutcome::Job(JobResult::Failed { .. })) | Ok(_) => {}
            Err(e) => error!("Scheduled '{}' failed: {}", label, e),
        }
    }

    async fn drain(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!("Scheduled task ended abnormally: {}", e);
            }
        }
    }
}

/// Collect finished dispatches without waiting.
fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(result) = in_flight.try_join_next() {
        if let Err(e) = result {
            error!("Scheduled task ended abnormally: {}", e);
        }
    }
}

fn minute_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// The minute to tick next. Never the same minute twice, even when the wall
/// clock lags behind the timer or is stepped back.
fn next_boundary(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let upcoming = minute_floor(now) + TimeDelta::minutes(1);
    match last {
        Some(last) => upcoming.max(last + TimeDelta::minutes(1)),
        None => upcoming,
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let mut last = None;
    if shared.config.run_on_start {
        let minute = minute_floor(Utc::now());
        shared.tick(minute).await;
        last = Some(minute);
    }

    loop {
        let now = Utc::now();
        let boundary = next_boundary(now, last);
        let wait = (boundary - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                shared.tick(boundary).await;
                last = Some(boundary);
            }
            _ = stop.changed() => break,
        }
    }
}

/// Runs registered entries on their cron schedules.
///
/// Once a minute, on the minute, every entry is checked against the wall
/// clock of its timezone. Due entries are dispatched concurrently and the
/// loop goes back to sleep without waiting for them.
///
/// ```no_run
/// use stacks_cron::*;
/// use stacks_queue::{ActionRegistry, JobRegistry, RetryExecutor};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), CronError> {
/// let registry = define(|run| {
///     run.command("php artisan inspire").every_five_minutes();
/// })?;
///
/// let executor = RetryExecutor::new(Arc::new(ActionRegistry::new()));
/// let dispatcher = Dispatcher::new(executor, Arc::new(JobRegistry::new()));
///
/// let mut scheduler = Scheduler::new(registry, dispatcher);
/// scheduler.start().await?;
/// tokio::signal::ctrl_c().await?;
/// scheduler.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    shared: Arc<Shared>,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(registry: ScheduleRegistry, dispatcher: Dispatcher) -> Self {
        Self::with_config(registry, dispatcher, SchedulerConfig::default())
    }

    pub fn with_config(registry: ScheduleRegistry, dispatcher: Dispatcher, config: SchedulerConfig) -> Self {
        debug!(
            "Scheduler config - entries: {}, default timezone: {}, run_on_start: {}",
            registry.len(),
            config.default_timezone,
            config.run_on_start
        );
        Self {
            shared: Arc::new(Shared {
                entries: registry.into_entries(),
                dispatcher,
                config,
                in_flight: Mutex::new(JoinSet::new()),
                active: StdMutex::new(HashSet::new()),
                last_tick: StdMutex::new(None),
            }),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.shared.entries
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Which entries are due for the minute containing `now`. No side effects.
    pub fn evaluate(&self, now: DateTime<Utc>) -> TickReport {
        self.shared.evaluate(now)
    }

    /// Evaluate `now` and dispatch every due entry in the background.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.shared.tick(now).await
    }

    /// Next fire time of each entry after `now`.
    pub fn next_runs(&self, now: DateTime<Utc>) -> Vec<(&ScheduleEntry, Option<DateTime<Utc>>)> {
        let zone = self.shared.config.default_timezone;
        self.shared
            .entries
            .iter()
            .map(|entry| (entry, entry.next_run(now, zone)))
            .collect()
    }

    /// Number of dispatched entries that have not finished yet.
    pub async fn in_flight(&self) -> usize {
        let mut in_flight = self.shared.in_flight.lock().await;
        reap(&mut in_flight);
        in_flight.len()
    }

    /// Minute of the most recent tick, if any.
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self
            .shared
            .last_tick
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the tick loop.
    pub async fn start(&mut self) -> CronResult<()> {
        if self.is_running() {
            warn!("Scheduler already running");
            return Err(CronError::SchedulerAlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.handle = Some(tokio::spawn(run_loop(Arc::clone(&self.shared), stop_rx)));
        self.stop_tx = Some(stop_tx);

        info!(
            "Scheduler started with {} entries",
            self.shared.entries.len()
        );
        Ok(())
    }

    async fn halt(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        if let Some(stop_tx) = self.stop_tx.take() {
            // the loop may already be gone
            let _ = stop_tx.send(true);
        }
        if let Err(e) = handle.await {
            error!("Scheduler loop ended abnormally: {}", e);
        }
        true
    }

    /// Stop scheduling new ticks. Dispatches already in flight keep running
    /// in the background.
    pub async fn stop(&mut self) -> CronResult<()> {
        if !self.halt().await {
            return Err(CronError::SchedulerNotRunning);
        }
        self.shared.in_flight.lock().await.detach_all();
        info!("Scheduler stopped");
        Ok(())
    }

    /// Stop scheduling new ticks, then wait for in-flight dispatches.
    pub async fn shutdown(&mut self) -> CronResult<()> {
        self.halt().await;
        self.shared.drain().await;
        info!("Scheduler shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Target;
    use crate::registry::define;
    use chrono::TimeZone;
    use stacks_queue::{ActionRegistry, JobRegistry, RetryExecutor};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::{Barrier, Notify};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            RetryExecutor::new(Arc::new(ActionRegistry::new())).with_logging(false),
            Arc::new(JobRegistry::new()),
        )
    }

    fn scheduler(registry: ScheduleRegistry) -> Scheduler {
        let config = SchedulerConfig::default()
            .with_logging(false)
            .with_default_timezone(Zone::parse("UTC").unwrap());
        Scheduler::with_config(registry, dispatcher(), config)
    }

    fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_every_minute_and_every_ten_minutes() {
        let registry = define(|run| {
            run.command("a").every_minute();
            run.command("b").every_ten_minutes();
        })
        .unwrap();
        let scheduler = scheduler(registry);

        assert_eq!(scheduler.evaluate(utc(10, 10)).due, vec![0, 1]);
        assert_eq!(scheduler.evaluate(utc(10, 11)).due, vec![0]);
    }

    #[test]
    fn test_entry_timezone() {
        let registry = define(|run| {
            run.command("report").daily().at("09:00").timezone("America/Los_Angeles");
        })
        .unwrap();
        let scheduler = scheduler(registry);

        // 09:00 in Los Angeles
        assert_eq!(scheduler.evaluate(utc(17, 0)).due, vec![0]);
        // 09:00 UTC
        assert!(scheduler.evaluate(utc(9, 0)).due.is_empty());
    }

    #[test]
    fn test_evaluation_error_is_isolated() {
        let mut registry = ScheduleRegistry::new();
        registry.register(
            ScheduleEntry::new(Target::Command("broken".into()), crate::CronSpec::every_minute())
                .with_timezone("Not/AZone"),
        );
        registry.register(ScheduleEntry::new(
            Target::Command("fine".into()),
            crate::CronSpec::every_minute(),
        ));

        let report = scheduler(registry).evaluate(utc(12, 0));
        assert_eq!(report.due, vec![1]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].entry, "broken");
    }

    #[test]
    fn test_next_runs() {
        let registry = define(|run| {
            run.command("a").hourly();
        })
        .unwrap();
        let scheduler = scheduler(registry);
        let runs = scheduler.next_runs(utc(10, 15));
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].1, Some(utc(11, 0)));
    }

    #[tokio::test]
    async fn test_due_entries_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let registry = define(|run| {
            for _ in 0..2 {
                let barrier = Arc::clone(&barrier);
                run.call(move || {
                    let barrier = Arc::clone(&barrier);
                    async move {
                        barrier.wait().await;
                        Ok(())
                    }
                })
                .every_minute();
            }
        })
        .unwrap();

        let mut scheduler = scheduler(registry);
        let report = scheduler.tick(utc(8, 0)).await;
        assert_eq!(report.due.len(), 2);

        // would never finish if the two callbacks ran one after the other
        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduler.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_without_overlapping_skips_busy_entry() {
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicU32::new(0));
        let registry = define(|run| {
            let release = Arc::clone(&release);
            let runs = Arc::clone(&runs);
            run.call(move || {
                let release = Arc::clone(&release);
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    Ok(())
                }
            })
            .every_minute()
            .without_overlapping();
        })
        .unwrap();

        let mut scheduler = scheduler(registry);
        let first = scheduler.tick(utc(8, 0)).await;
        assert!(first.skipped.is_empty());

        let second = scheduler.tick(utc(8, 1)).await;
        assert_eq!(second.due, vec![0]);
        assert_eq!(second.skipped, vec![0]);

        release.notify_one();
        scheduler.shutdown().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // the entry is free again once its run finished
        let third = scheduler.tick(utc(8, 2)).await;
        assert!(third.skipped.is_empty());
        release.notify_one();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_stop() {
        let mut scheduler = scheduler(ScheduleRegistry::new());
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(CronError::SchedulerAlreadyRunning)
        ));

        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.stop().await,
            Err(CronError::SchedulerNotRunning)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_on_minute_boundaries() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        let registry = define(move |run| {
            run.call(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .every_minute();
        })
        .unwrap();

        let before = minute_floor(Utc::now());
        let mut scheduler = scheduler(registry);
        scheduler.start().await.unwrap();
        // the paused timer runs far ahead of the wall clock here
        tokio::time::sleep(Duration::from_secs(400)).await;
        scheduler.shutdown().await.unwrap();

        let ticks = i64::from(count.load(Ordering::SeqCst));
        assert!(ticks >= 2);
        assert!(!scheduler.is_running());

        // one distinct minute per dispatch
        let last = scheduler.last_tick().unwrap();
        assert!(last >= before + TimeDelta::minutes(ticks));
        assert!(last <= before + TimeDelta::minutes(ticks + 1));
    }

    #[test]
    fn test_next_boundary_never_repeats_a_minute() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 59, 30).unwrap();
        assert_eq!(next_boundary(now, None), utc(11, 0));

        // wall clock still before the minute that was just ticked
        assert_eq!(next_boundary(now, Some(utc(11, 0))), utc(11, 1));
        // clock stepped back by several minutes
        assert_eq!(next_boundary(now, Some(utc(11, 5))), utc(11, 6));
        // clock jumped forward
        assert_eq!(next_boundary(now, Some(utc(10, 30))), utc(11, 0));
    }

    #[tokio::test]
    async fn test_panicking_dispatch_is_reaped() {
        let registry = define(|run| {
            run.call(|| async {
                let explode = true;
                if explode {
                    panic!("callback blew up");
                }
                Ok(())
            })
            .every_minute();
        })
        .unwrap();
        let mut scheduler = scheduler(registry);

        scheduler.tick(utc(8, 0)).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.in_flight().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(scheduler.last_tick(), Some(utc(8, 0)));
        scheduler.shutdown().await.unwrap();
    }
}
