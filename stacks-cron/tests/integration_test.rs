//! Integration tests for stacks-cron

use chrono::{DateTime, TimeZone, Utc};
use stacks_cron::*;
use stacks_queue::{ActionRegistry, Job, JobRegistry, Queue, QueueError, RetryExecutor};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
}

fn utc() -> Zone {
    Zone::parse("UTC").unwrap()
}

fn quiet(registry: ScheduleRegistry, dispatcher: Dispatcher) -> Scheduler {
    let config = SchedulerConfig::default()
        .with_logging(false)
        .with_default_timezone(utc());
    Scheduler::with_config(registry, dispatcher, config)
}

fn compiled(apply: impl FnOnce(&mut ScheduleBuilder)) -> String {
    let mut builder = ScheduleBuilder::new();
    apply(&mut builder);
    builder.spec().unwrap().to_string()
}

#[test]
fn test_builder_cadences_compile_to_expressions() {
    assert_eq!(compiled(|b| { b.every_minute(); }), "* * * * *");
    assert_eq!(compiled(|b| { b.every_five_minutes(); }), "*/5 * * * *");
    assert_eq!(compiled(|b| { b.hourly(); }), "0 * * * *");
    assert_eq!(compiled(|b| { b.hourly_at(17); }), "17 * * * *");
    assert_eq!(compiled(|b| { b.daily(); }), "0 0 * * *");
    assert_eq!(compiled(|b| { b.daily_at(13, 30); }), "30 13 * * *");
    assert_eq!(compiled(|b| { b.twice_daily(1, 13); }), "0 1,13 * * *");
    assert_eq!(compiled(|b| { b.weekly(); }), "0 0 * * 0");
    assert_eq!(compiled(|b| { b.monthly(); }), "0 0 1 * *");
    assert_eq!(compiled(|b| { b.yearly(); }), "0 0 1 1 *");
    assert_eq!(compiled(|b| { b.weekly().fridays().at("17:45"); }), "45 17 * * 5");
    assert_eq!(compiled(|b| { b.at("06:15"); }), "15 6 * * *");
    assert_eq!(compiled(|b| { b.daily().weekends(); }), "0 0 * * 0,6");
}

#[test]
fn test_textual_chain_matches_fluent_calls() {
    let mut fluent = ScheduleBuilder::new();
    fluent.weekly().mondays().at("13:00");

    let mut textual = ScheduleBuilder::new();
    textual.apply_chain("weekly().mondays().at('13:00')").unwrap();

    assert_eq!(fluent.spec().unwrap(), textual.spec().unwrap());
}

#[test]
fn test_unknown_chain_method() {
    let mut builder = ScheduleBuilder::new();
    let err = builder.apply_chain("daily().sometimes()").unwrap_err();
    assert!(matches!(err, ScheduleDefinitionError::UnknownMethod(_)));
}

#[test]
fn test_schedule_evaluation_across_zones() {
    let registry = define(|run| {
        run.command("every-minute").every_minute();
        run.command("every-ten").every_ten_minutes();
        run.job("Report").daily().at("09:00").timezone("America/Los_Angeles");
        run.action("Digest").weekly().mondays().at("08:00").timezone("UTC");
    })
    .unwrap();
    let scheduler = quiet(registry, dispatcher(ActionRegistry::new(), JobRegistry::new()));

    assert_eq!(scheduler.evaluate(at(15, 10, 10)).due, vec![0, 1]);
    assert_eq!(scheduler.evaluate(at(15, 10, 11)).due, vec![0]);
    // 2024-01-15 is a Monday
    assert_eq!(scheduler.evaluate(at(15, 8, 0)).due, vec![0, 1, 3]);
    assert_eq!(scheduler.evaluate(at(16, 8, 0)).due, vec![0, 1]);
    // 09:00 in Los Angeles
    assert_eq!(scheduler.evaluate(at(15, 17, 0)).due, vec![0, 1, 2]);
}

#[test]
fn test_next_runs_follow_entry_zone() {
    let registry = define(|run| {
        run.job("Report").daily().at("09:00").timezone("America/Los_Angeles");
    })
    .unwrap();
    let scheduler = quiet(registry, dispatcher(ActionRegistry::new(), JobRegistry::new()));

    let runs = scheduler.next_runs(at(15, 12, 0));
    assert_eq!(runs[0].1, Some(at(15, 17, 0)));
}

fn dispatcher(actions: ActionRegistry, jobs: JobRegistry) -> Dispatcher {
    Dispatcher::new(
        RetryExecutor::new(Arc::new(actions)).with_logging(false),
        Arc::new(jobs),
    )
}

#[tokio::test]
async fn test_tick_dispatches_actions_and_jobs() {
    let action_runs = Arc::new(AtomicU32::new(0));
    let job_runs = Arc::new(AtomicU32::new(0));

    let mut actions = ActionRegistry::new();
    let counter = Arc::clone(&action_runs);
    actions.register_fn("Inspire", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let mut jobs = JobRegistry::new();
    let counter = Arc::clone(&job_runs);
    jobs.register(
        Job::builder("Flaky")
            .tries(3)
            .backoff(0)
            .handle(move |ctx| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt < 2 {
                        return Err(QueueError::failed("not yet"));
                    }
                    Ok(())
                }
            })
            .build()
            .unwrap(),
    )
    .unwrap();

    let registry = define(|run| {
        run.action("Inspire").every_minute();
        run.job("Flaky").hourly();
    })
    .unwrap();
    let mut scheduler = quiet(registry, dispatcher(actions, jobs));

    let report = scheduler.tick(at(15, 10, 0)).await;
    assert_eq!(report.due, vec![0, 1]);
    scheduler.shutdown().await.unwrap();

    assert_eq!(action_runs.load(Ordering::SeqCst), 1);
    assert_eq!(job_runs.load(Ordering::SeqCst), 2);

    let report = scheduler.tick(at(15, 10, 1)).await;
    assert_eq!(report.due, vec![0]);
    scheduler.shutdown().await.unwrap();
    assert_eq!(action_runs.load(Ordering::SeqCst), 2);
    assert_eq!(job_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_jobs_are_enqueued_when_queue_attached() {
    let mut jobs = JobRegistry::new();
    jobs.register(Job::action("Sync", "Sync")).unwrap();

    let queue = Queue::new("default");
    let dispatcher = dispatcher(ActionRegistry::new(), jobs).with_queue(queue.clone());
    let registry = define(|run| {
        run.job("Sync").every_minute();
    })
    .unwrap();
    let mut scheduler = quiet(registry, dispatcher);

    scheduler.tick(at(15, 10, 0)).await;
    scheduler.shutdown().await.unwrap();

    let queued = queue.dequeue().await.unwrap();
    assert_eq!(queued.job, "Sync");
}

#[tokio::test]
async fn test_failing_entry_does_not_affect_others() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let registry = define(move |run| {
        run.call(|| async { Err(CronError::Other("broken".into())) }).every_minute();
        run.action("Missing").every_minute();
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
    let mut scheduler = quiet(registry, dispatcher(ActionRegistry::new(), JobRegistry::new()));

    let report = scheduler.tick(at(15, 10, 0)).await;
    assert_eq!(report.due.len(), 3);
    scheduler.shutdown().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
