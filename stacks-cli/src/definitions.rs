//! Schedule and job definition files.
//!
//! The schedule file is TOML with one `[[schedule]]` table per entry:
//!
//! ```toml
//! [[schedule]]
//! job = "SendDigest"
//! run = "weekly().mondays().at('08:00')"
//! timezone = "Europe/Berlin"
//! ```
//!
//! Jobs live in a directory with one TOML or JSON file per job; the file
//! stem is the job name unless the file sets `name`.

use crate::error::{CliError, CliResult};
use serde::Deserialize;
use stacks_cron::{
    CommandRunner, ScheduleBuilder, ScheduleDefinitionError, ScheduleEntry, ScheduleRegistry,
    ShellCommandRunner, Target,
};
use stacks_log::debug;
use stacks_queue::{handler_fn, HandlerFn, JobDefinition, JobRegistry, QueueError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleFile {
    #[serde(default)]
    pub schedule: Vec<ScheduleTable>,
}

/// One `[[schedule]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleTable {
    pub command: Option<String>,
    pub script: Option<PathBuf>,
    pub action: Option<String>,
    pub job: Option<String>,
    /// Fluent chain, e.g. `everyFiveMinutes().weekdays()`
    pub run: String,
    pub timezone: Option<String>,
    pub name: Option<String>,
}

impl ScheduleTable {
    fn target(&self) -> Result<Target, &'static str> {
        let mut targets = Vec::new();
        if let Some(command) = &self.command {
            targets.push(Target::Command(command.clone()));
        }
        if let Some(script) = &self.script {
            targets.push(Target::Script(script.clone()));
        }
        if let Some(action) = &self.action {
            targets.push(Target::Action(action.clone()));
        }
        if let Some(job) = &self.job {
            targets.push(Target::Job(job.clone()));
        }

        match targets.len() {
            0 => Err("needs one of command, script, action or job"),
            1 => Ok(targets.remove(0)),
            _ => Err("must set only one of command, script, action or job"),
        }
    }

    fn build(&self, target: Target) -> Result<ScheduleEntry, ScheduleDefinitionError> {
        let mut builder = ScheduleBuilder::new();
        builder.apply_chain(&self.run)?;
        if let Some(zone) = &self.timezone {
            builder.timezone(zone);
        }
        if let Some(name) = &self.name {
            builder.name(name.clone());
        }
        builder.build(target)
    }

    /// Validate into a schedule entry. `position` is 1-based.
    pub fn into_entry(&self, position: usize) -> CliResult<ScheduleEntry> {
        let target = self.target().map_err(|reason| {
            CliError::Definition(format!("schedule entry #{}: {}", position, reason))
        })?;
        let label = self.name.clone().unwrap_or_else(|| target.label());

        self.build(target).map_err(|source| {
            ScheduleDefinitionError::InEntry {
                entry: label,
                source: Box::new(source),
            }
            .into()
        })
    }
}

/// Parse schedule file text into a registry.
pub fn parse_schedule(content: &str) -> CliResult<ScheduleRegistry> {
    let file: ScheduleFile =
        toml::from_str(content).map_err(|e| CliError::Definition(e.to_string()))?;

    let mut registry = ScheduleRegistry::new();
    for (index, table) in file.schedule.iter().enumerate() {
        registry.register(table.into_entry(index + 1)?);
    }
    Ok(registry)
}

pub fn load_schedule(path: &Path) -> CliResult<ScheduleRegistry> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            CliError::NotFound(format!("schedule file {}", path.display()))
        }
        _ => CliError::Io(e),
    })?;

    parse_schedule(&content).map_err(|e| match e {
        CliError::Definition(msg) => CliError::Definition(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Handler that runs `command` through the shell; a non-zero exit fails the
/// attempt.
pub fn command_handler(runner: ShellCommandRunner, command: &str) -> HandlerFn {
    let command = command.to_string();
    handler_fn(move |_ctx| {
        let runner = runner.clone();
        let command = command.clone();
        async move {
            let output = runner
                .run(&command)
                .await
                .map_err(|e| QueueError::failed(e.to_string()))?;
            if output.success() {
                return Ok(());
            }
            let code = output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(QueueError::failed(format!("`{}` exited with {}", command, code)))
        }
    })
}

fn is_definition_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("toml") | Some("json")
    )
}

fn parse_job_file(path: &Path) -> CliResult<JobDefinition> {
    let content = fs::read_to_string(path)?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
        _ => toml::from_str(&content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| CliError::Definition(format!("{}: {}", path.display(), e)))
}

/// Load every job file in `dir`. A missing directory means no jobs.
pub fn load_jobs(dir: &Path, runner: &ShellCommandRunner) -> CliResult<JobRegistry> {
    let mut registry = JobRegistry::new();
    if !dir.is_dir() {
        debug!("No jobs directory at {}", dir.display());
        return Ok(registry);
    }

    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_definition_file(path));

    for path in files {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let job = parse_job_file(&path)?
            .into_job(&stem, |command| command_handler(runner.clone(), command))
            .map_err(|e| CliError::Definition(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded job {} from {}", job.name(), path.display());
        registry.register(job)?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_schedule() {
        let registry = parse_schedule(
            r#"
            [[schedule]]
            command = "php artisan inspire"
            run = "everyFiveMinutes()"

            [[schedule]]
            job = "SendDigest"
            run = "weekly().mondays().at('08:00')"
            timezone = "America/Los_Angeles"
            name = "digest"
            "#,
        )
        .unwrap();

        let entries = registry.all();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].spec.to_string(), "*/5 * * * *");
        assert_eq!(entries[1].spec.to_string(), "0 8 * * 1");
        assert_eq!(entries[1].timezone.as_deref(), Some("America/Los_Angeles"));
        assert_eq!(entries[1].label(), "digest");
    }

    #[test]
    fn test_schedule_target_must_be_unique() {
        let err = parse_schedule(
            r#"
            [[schedule]]
            command = "echo"
            job = "Sync"
            run = "daily()"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("only one"));

        let err = parse_schedule("[[schedule]]\nrun = \"daily()\"\n").unwrap_err();
        assert!(err.to_string().contains("needs one of"));
    }

    #[test]
    fn test_schedule_errors_name_the_entry() {
        let err = parse_schedule(
            r#"
            [[schedule]]
            job = "Sync"
            run = "everyMinute().at('13:00')"
            "#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Sync"), "{text}");
        assert!(text.contains("at()"), "{text}");
    }

    #[test]
    fn test_load_jobs() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("SendDigest.toml"),
            "description = \"Mail the digest\"\ntries = 5\nbackoff = 10\ntimeout = 30\ncommand = \"true\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("prune.json"),
            r#"{"name": "PruneSessions", "action": "Prune", "rate": "daily()"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a job").unwrap();

        let registry = load_jobs(dir.path(), &ShellCommandRunner::new()).unwrap();
        assert_eq!(registry.len(), 2);

        let digest = registry.get("SendDigest").unwrap();
        assert_eq!(digest.tries(), 5);
        assert_eq!(digest.backoff(), 10);
        assert_eq!(digest.timeout(), Some(Duration::from_secs(30)));

        let prune = registry.get("PruneSessions").unwrap();
        assert_eq!(prune.rate(), Some("daily()"));
    }

    #[test]
    fn test_invalid_job_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Broken.toml"), "tries = 0\ncommand = \"true\"\n").unwrap();

        let err = load_jobs(dir.path(), &ShellCommandRunner::new()).unwrap_err();
        assert!(err.to_string().contains("Broken.toml"));
    }

    #[test]
    fn test_missing_jobs_dir() {
        let dir = TempDir::new().unwrap();
        let registry = load_jobs(&dir.path().join("nope"), &ShellCommandRunner::new()).unwrap();
        assert!(registry.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_handler() {
        use stacks_queue::{JobContext, JobData};

        let ok = command_handler(ShellCommandRunner::new(), "true");
        assert!(ok(JobContext::new("Ok", 1, 1, JobData::Null)).await.is_ok());

        let failing = command_handler(ShellCommandRunner::new(), "exit 4");
        let err = failing(JobContext::new("Fail", 1, 1, JobData::Null)).await.unwrap_err();
        assert!(err.to_string().contains("exited with 4"));
    }
}
