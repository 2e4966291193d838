//! Dispatch of due entries to commands, scripts, actions, jobs and callbacks.

use crate::entry::{ScheduleEntry, Target};
use crate::error::{CronError, CronResult};
use async_trait::async_trait;
use stacks_log::debug;
use stacks_queue::{JobContext, JobData, JobRegistry, JobResult, Queue, QueueError, RetryExecutor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use uuid::Uuid;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Runs shell commands and scripts for [`Target::Command`] and
/// [`Target::Script`] entries.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> CronResult<CommandOutput>;

    async fn run_script(&self, path: &Path) -> CronResult<CommandOutput>;
}

/// Runs commands through `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner {
    working_dir: Option<PathBuf>,
}

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn prepare(&self, mut command: Command) -> Command {
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str) -> CronResult<CommandOutput> {
        let mut shell = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        shell.arg(command);
        let output = self.prepare(shell).output().await?;
        Ok(output.into())
    }

    async fn run_script(&self, path: &Path) -> CronResult<CommandOutput> {
        let output = self.prepare(Command::new(path)).output().await?;
        Ok(output.into())
    }
}

/// What happened to a dispatched entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Command, script, action or callback finished successfully
    Completed,
    /// Job ran inline through the retry executor
    Job(JobResult),
    /// Job was pushed onto the attached queue
    Enqueued(Uuid),
}

/// Routes a due entry to whatever runs its target.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn CommandRunner>,
    executor: RetryExecutor,
    jobs: Arc<JobRegistry>,
    queues: HashMap<String, Queue>,
}

impl Dispatcher {
    pub fn new(executor: RetryExecutor, jobs: Arc<JobRegistry>) -> Self {
        Self {
            runner: Arc::new(ShellCommandRunner::new()),
            executor,
            jobs,
            queues: HashMap::new(),
        }
    }

    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    /// Enqueue job targets instead of running them inline.
    ///
    /// Once any queue is attached, every job target is enqueued on the queue
    /// its job names; a job whose queue is not attached fails to dispatch.
    pub fn with_queue(mut self, queue: Queue) -> Self {
        self.queues.insert(queue.name().to_string(), queue);
        self
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub async fn dispatch(&self, entry: &ScheduleEntry) -> CronResult<DispatchOutcome> {
        debug!("Dispatching {} '{}'", entry.target.kind(), entry.label());

        match &entry.target {
            Target::Command(command) => {
                let output = self.runner.run(command).await?;
                check_output(command, output)
            }
            Target::Script(path) => {
                let output = self.runner.run_script(path).await?;
                check_output(&path.display().to_string(), output)
            }
            Target::Action(name) => {
                let action = self
                    .executor
                    .actions()
                    .get(name)
                    .ok_or_else(|| QueueError::UnknownAction(name.clone()))?;
                action
                    .handle(JobContext::new(name.clone(), 1, 1, JobData::Null))
                    .await?;
                Ok(DispatchOutcome::Completed)
            }
            Target::Job(name) => {
                let job = self
                    .jobs
                    .get(name)
                    .ok_or_else(|| QueueError::NoHandler(name.clone()))?;
                if self.queues.is_empty() {
                    return Ok(DispatchOutcome::Job(self.executor.execute(job).await));
                }
                let queue =
                    self.queues
                        .get(job.queue())
                        .ok_or_else(|| CronError::QueueNotAttached {
                            job: job.name().to_string(),
                            queue: job.queue().to_string(),
                        })?;
                let id = queue.enqueue(job.name(), JobData::Null).await?;
                Ok(DispatchOutcome::Enqueued(id))
            }
            Target::Callback(callback) => {
                callback().await?;
                Ok(DispatchOutcome::Completed)
            }
        }
    }
}

fn check_output(what: &str, output: CommandOutput) -> CronResult<DispatchOutcome> {
    if output.success() {
        return Ok(DispatchOutcome::Completed);
    }
    let code = output
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let stderr = output.stderr.trim();
    Err(CronError::CommandFailed(if stderr.is_empty() {
        format!("`{}` exited with {}", what, code)
    } else {
        format!("`{}` exited with {}: {}", what, code, stderr)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::CronSpec;
    use stacks_queue::{ActionRegistry, Job};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        commands: Mutex<Vec<String>>,
        code: i32,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str) -> CronResult<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(CommandOutput {
                code: Some(self.code),
                stdout: String::new(),
                stderr: if self.code == 0 { String::new() } else { "boom".to_string() },
            })
        }

        async fn run_script(&self, path: &Path) -> CronResult<CommandOutput> {
            self.run(&format!("script:{}", path.display())).await
        }
    }

    fn dispatcher(actions: ActionRegistry, jobs: JobRegistry) -> Dispatcher {
        Dispatcher::new(
            RetryExecutor::new(Arc::new(actions)).with_logging(false),
            Arc::new(jobs),
        )
    }

    fn entry(target: Target) -> ScheduleEntry {
        ScheduleEntry::new(target, CronSpec::every_minute())
    }

    #[tokio::test]
    async fn test_command_failure_is_reported() {
        let d = dispatcher(ActionRegistry::new(), JobRegistry::new()).with_runner(RecordingRunner {
            code: 2,
            ..Default::default()
        });
        let err = d.dispatch(&entry(Target::Command("false".into()))).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("exited with 2"));
        assert!(text.contains("boom"));
    }

    #[tokio::test]
    async fn test_action_target() {
        let mut actions = ActionRegistry::new();
        actions.register_fn("Inspire", |_| async { Ok(()) });
        let d = dispatcher(actions, JobRegistry::new());

        let outcome = d.dispatch(&entry(Target::Action("Inspire".into()))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);

        let err = d.dispatch(&entry(Target::Action("Missing".into()))).await.unwrap_err();
        assert!(matches!(err, CronError::Queue(QueueError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn test_job_target_runs_inline_or_enqueues() {
        let mut jobs = JobRegistry::new();
        jobs.register(Job::new("Sync", |_| async { Ok(()) })).unwrap();
        let d = dispatcher(ActionRegistry::new(), jobs);

        let outcome = d.dispatch(&entry(Target::Job("Sync".into()))).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Job(JobResult::Succeeded { attempts: 1 }));

        let queue = Queue::new("default");
        let d = d.with_queue(queue.clone());
        let outcome = d.dispatch(&entry(Target::Job("Sync".into()))).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Enqueued(_)));
        assert_eq!(queue.size().await, 1);

        assert!(d.dispatch(&entry(Target::Job("Nope".into()))).await.is_err());
    }

    #[tokio::test]
    async fn test_jobs_go_to_their_own_queue() {
        let mut jobs = JobRegistry::new();
        jobs.register(Job::builder("Mail").action("Send").queue("mail").build().unwrap())
            .unwrap();
        let default = Queue::new("default");
        let d = dispatcher(ActionRegistry::new(), jobs).with_queue(default.clone());

        let err = d.dispatch(&entry(Target::Job("Mail".into()))).await.unwrap_err();
        assert!(matches!(err, CronError::QueueNotAttached { ref queue, .. } if queue == "mail"));
        assert_eq!(default.size().await, 0);

        let mail = Queue::new("mail");
        let d = d.with_queue(mail.clone());
        let outcome = d.dispatch(&entry(Target::Job("Mail".into()))).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Enqueued(_)));
        assert_eq!(mail.size().await, 1);
        assert_eq!(default.size().await, 0);
    }

    #[tokio::test]
    async fn test_callback_target() {
        let d = dispatcher(ActionRegistry::new(), JobRegistry::new());
        let ok = entry(Target::callback(|| async { Ok(()) }));
        assert_eq!(d.dispatch(&ok).await.unwrap(), DispatchOutcome::Completed);

        let failing = entry(Target::callback(|| async { Err(CronError::Other("nope".into())) }));
        assert!(d.dispatch(&failing).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner() {
        let runner = ShellCommandRunner::new();
        let output = runner.run("echo scheduled").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "scheduled");

        let output = runner.run("exit 3").await.unwrap();
        assert_eq!(output.code, Some(3));
    }
}
