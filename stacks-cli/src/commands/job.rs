//! `job:run`: run one job through the retry executor.

use crate::error::{CliError, CliResult};
use crate::output;
use crate::project::Project;
use colored::Colorize;
use stacks_queue::{JobData, JobResult};

pub async fn run(project: &Project, name: &str, payload: Option<&str>) -> CliResult<()> {
    let job = project.jobs.get(name).ok_or_else(|| {
        CliError::NotFound(format!(
            "job '{}' in {}",
            name,
            project.config.scheduler.jobs_dir.display()
        ))
    })?;

    let payload = match payload {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| CliError::InvalidArgument(format!("--payload is not JSON: {}", e)))?,
        None => JobData::Null,
    };

    output::info(&format!(
        "Running {} (tries: {}, backoff: {}s)",
        name.cyan(),
        job.tries(),
        job.backoff()
    ));

    match project.executor().execute_with(job, payload).await {
        JobResult::Succeeded { attempts } => {
            output::success(&format!("{} completed after {} attempt(s)", name, attempts));
            Ok(())
        }
        JobResult::Failed {
            attempts,
            last_error,
        } => Err(CliError::JobFailed {
            job: name.to_string(),
            attempts,
            error: last_error.message,
        }),
    }
}
