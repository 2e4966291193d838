//! `queue:work`: drain the queue with a worker pool.

use crate::error::CliResult;
use crate::output;
use crate::project::Project;
use colored::Colorize;
use stacks_cron::{ScheduleBuilder, ScheduleDefinitionError, ScheduleRegistry, Scheduler, Target};
use stacks_log::debug;
use stacks_queue::{JobRegistry, Queue, QueueConfig, Worker, WorkerConfig};

/// Entries that enqueue every job with a `rate` onto `queue`.
pub fn rate_entries(jobs: &JobRegistry, queue: &str) -> CliResult<ScheduleRegistry> {
    let mut registry = ScheduleRegistry::new();
    for job in jobs.iter() {
        let Some(rate) = job.rate() else {
            continue;
        };
        if job.queue() != queue {
            debug!("Job {} runs on queue '{}', not scheduling it here", job.name(), job.queue());
            continue;
        }

        let mut builder = ScheduleBuilder::new();
        let entry = builder
            .apply_chain(rate)
            .and_then(|builder| builder.build(Target::Job(job.name().to_string())))
            .map_err(|source| ScheduleDefinitionError::InEntry {
                entry: job.name().to_string(),
                source: Box::new(source),
            })?;
        registry.register(entry);
    }
    Ok(registry)
}

pub async fn work(project: &Project, stop_when_empty: bool) -> CliResult<()> {
    let settings = &project.config.queue;
    let queue = Queue::with_config(
        QueueConfig::new(settings.name.clone()).with_max_size(settings.max_size),
    );

    let worker_config = WorkerConfig::default()
        .with_concurrency(settings.concurrency)
        .with_poll_interval(settings.poll_interval())
        .with_logging(project.config.scheduler.log_execution);
    let mut worker = Worker::with_config(
        queue.clone(),
        project.jobs.clone(),
        project.executor(),
        worker_config,
    );

    let rated = rate_entries(&project.jobs, &settings.name)?;
    let mut scheduler = if rated.is_empty() {
        None
    } else {
        Some(Scheduler::with_config(
            rated,
            project.dispatcher().with_queue(queue.clone()),
            project.scheduler_config()?,
        ))
    };

    worker.start().await?;
    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.start().await?;
    }
    output::info(&format!(
        "Worker on queue '{}' with concurrency {}",
        settings.name, settings.concurrency
    ));

    if stop_when_empty {
        while queue.size().await > 0 || queue.reserved().await > 0 {
            tokio::time::sleep(settings.poll_interval()).await;
        }
    } else {
        output::info(&format!("Press {} to stop", "Ctrl+C".yellow()));
        tokio::signal::ctrl_c().await?;
        output::info("Shutting down, finishing current jobs...");
    }

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }
    worker.stop().await?;

    let failed = queue.failed().await;
    if failed.is_empty() {
        output::success("Worker stopped");
    } else {
        output::warn(&format!("Worker stopped with {} failed job(s)", failed.len()));
    }
    Ok(())
}
