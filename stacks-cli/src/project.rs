//! Everything a command needs: settings, jobs and the pieces built from them.

use crate::definitions;
use crate::error::CliResult;
use stacks_config::AppConfig;
use stacks_cron::{Dispatcher, ScheduleRegistry, SchedulerConfig, ShellCommandRunner, Zone};
use stacks_queue::{ActionRegistry, JobRegistry, RetryExecutor};
use std::path::Path;
use std::sync::Arc;

pub struct Project {
    pub config: AppConfig,
    pub jobs: Arc<JobRegistry>,
    pub actions: Arc<ActionRegistry>,
    runner: ShellCommandRunner,
}

impl Project {
    /// Load settings and job definitions.
    ///
    /// The stock binary registers no actions, so a job file naming an
    /// action is rejected here.
    pub fn load(config_path: Option<&Path>) -> CliResult<Self> {
        let config = AppConfig::load(config_path)?;
        let runner = ShellCommandRunner::new();
        let jobs = definitions::load_jobs(&config.scheduler.jobs_dir, &runner)?;
        let actions = ActionRegistry::new();
        jobs.verify_actions(&actions)?;

        Ok(Self {
            config,
            jobs: Arc::new(jobs),
            actions: Arc::new(actions),
            runner,
        })
    }

    pub fn schedule(&self) -> CliResult<ScheduleRegistry> {
        definitions::load_schedule(&self.config.scheduler.schedule_file)
    }

    pub fn executor(&self) -> RetryExecutor {
        RetryExecutor::new(Arc::clone(&self.actions))
            .with_logging(self.config.scheduler.log_execution)
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.executor(), Arc::clone(&self.jobs)).with_runner(self.runner.clone())
    }

    pub fn default_zone(&self) -> CliResult<Zone> {
        Ok(match &self.config.scheduler.timezone {
            Some(name) => Zone::parse(name)?,
            None => Zone::Local,
        })
    }

    pub fn scheduler_config(&self) -> CliResult<SchedulerConfig> {
        Ok(SchedulerConfig::default()
            .with_run_on_start(self.config.scheduler.run_on_start)
            .with_logging(self.config.scheduler.log_execution)
            .with_default_timezone(self.default_zone()?))
    }
}
