//! `schedule:run` and `schedule:list`.

use crate::error::CliResult;
use crate::output;
use crate::project::Project;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use stacks_cron::{Scheduler, Target, Zone};

fn format_in(zone: Zone, at: DateTime<Utc>) -> String {
    match zone {
        Zone::Local => at.with_timezone(&Local).format("%Y-%m-%d %H:%M %Z").to_string(),
        Zone::Named(tz) => at.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
    }
}

fn load_scheduler(project: &Project) -> CliResult<Scheduler> {
    let registry = project.schedule()?;
    for entry in registry.all() {
        match &entry.target {
            Target::Action(name) if !project.actions.contains(name) => {
                output::warn(&format!(
                    "Action '{}' is not registered; entry '{}' will fail when due",
                    name,
                    entry.label()
                ));
            }
            Target::Job(name) if project.jobs.get(name).is_none() => {
                output::warn(&format!(
                    "Job '{}' is not defined in {}; entry '{}' will fail when due",
                    name,
                    project.config.scheduler.jobs_dir.display(),
                    entry.label()
                ));
            }
            _ => {}
        }
    }
    Ok(Scheduler::with_config(
        registry,
        project.dispatcher(),
        project.scheduler_config()?,
    ))
}

/// Start the scheduler loop. With `once`, run the entries due this minute,
/// wait for them and return.
pub async fn run(project: &Project, once: bool) -> CliResult<()> {
    let mut scheduler = load_scheduler(project)?;

    if once {
        let report = scheduler.tick(Utc::now()).await;
        scheduler.shutdown().await?;
        output::info(&format!(
            "{} of {} entries were due",
            report.due.len(),
            scheduler.entries().len()
        ));
        return Ok(());
    }

    scheduler.start().await?;
    output::info(&format!(
        "Scheduler running with {} entries. Press {} to stop",
        scheduler.entries().len(),
        "Ctrl+C".yellow()
    ));

    tokio::signal::ctrl_c().await?;

    output::info("Shutting down, waiting for running entries...");
    scheduler.shutdown().await?;
    output::success("Scheduler stopped");
    Ok(())
}

/// Print every entry with its cron text, zone and next run.
pub fn list(project: &Project) -> CliResult<()> {
    let scheduler = load_scheduler(project)?;
    let default_zone = scheduler.config().default_timezone;

    if scheduler.entries().is_empty() {
        println!("No scheduled entries.");
        return Ok(());
    }

    println!(
        "  {} {} {} {}",
        format!("{:<16}", "Expression").bold(),
        format!("{:<22}", "Timezone").bold(),
        format!("{:<26}", "Next run").bold(),
        "Target".bold()
    );

    for (entry, next) in scheduler.next_runs(Utc::now()) {
        let timezone = entry
            .timezone
            .clone()
            .unwrap_or_else(|| default_zone.to_string());
        let next = match (next, entry.zone(default_zone)) {
            (Some(at), Ok(zone)) => format!("{:<26}", format_in(zone, at)).normal(),
            (_, Err(_)) => format!("{:<26}", "invalid timezone").red(),
            (None, Ok(_)) => format!("{:<26}", "never").dimmed(),
        };

        println!(
            "  {} {:<22} {} {} {}",
            format!("{:<16}", entry.spec.to_string()).cyan(),
            timezone,
            next,
            entry.target.kind().dimmed(),
            entry.label()
        );
    }

    println!();
    println!("  Total entries: {}", scheduler.entries().len());
    Ok(())
}
