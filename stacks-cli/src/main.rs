//! buddy - run the Stacks scheduler, queue worker and jobs.
//!
//! # Commands
//!
//! - `buddy schedule:run` - Start the scheduler (Ctrl+C to stop)
//! - `buddy schedule:list` - Show every entry with its next run
//! - `buddy queue:work` - Process queued jobs
//! - `buddy job:run <name>` - Run one job with retries
//!
//! Settings come from `buddy.toml` / `buddy.json`, `.env` and `STACKS_*`
//! environment variables.

use clap::{Parser, Subcommand};
use colored::Colorize;
use stacks_log::{Format, Level, debug};
use std::path::PathBuf;

mod commands;
mod definitions;
mod error;
mod output;
mod project;

use error::CliResult;
use project::Project;

/// buddy - Stacks scheduler and queue runner
#[derive(Parser)]
#[command(name = "buddy")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(about = "Run the Stacks scheduler, queue worker and jobs")]
#[command(propagate_version = true)]
#[command(after_help = format!(
    "{}\n  {} buddy schedule:list\n  {} buddy schedule:run\n  {} buddy job:run SendDigest --payload '{{\"user\": 1}}'",
    "Examples:".bright_cyan().bold(),
    "$".dimmed(),
    "$".dimmed(),
    "$".dimmed(),
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: buddy.toml or buddy.json in the working directory)
    #[arg(short, long, global = true, env = "STACKS_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler, dispatching due entries every minute
    #[command(name = "schedule:run")]
    ScheduleRun {
        /// Run the entries due this minute, wait for them and exit
        #[arg(long)]
        once: bool,
    },

    /// List scheduled entries and their next run
    #[command(name = "schedule:list")]
    ScheduleList,

    /// Process jobs from the configured queue
    #[command(name = "queue:work")]
    QueueWork {
        /// Exit once the queue is empty
        #[arg(long)]
        stop_when_empty: bool,
    },

    /// Run a single job through the retry executor
    #[command(name = "job:run")]
    JobRun {
        /// Job name (file stem in the jobs directory unless the file sets `name`)
        name: String,

        /// JSON payload handed to the job
        #[arg(long)]
        payload: Option<String>,
    },
}

fn configure_output(cli: &Cli) {
    if cli.no_color {
        colored::control::set_override(false);
    }

    if std::env::var_os("STACKS_LOG_FORMAT").is_none() {
        stacks_log::set_format(Format::Pretty);
    }
    if cli.verbose {
        stacks_log::set_debug(true);
    } else if cli.quiet {
        stacks_log::set_level(Level::Error);
        output::set_quiet(true);
    }

    // Crates logging through the `log` facade share the same sink
    if let Err(e) = stacks_log::init_log_facade() {
        debug!("log facade not installed: {}", e);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let project = Project::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ScheduleRun { once } => commands::schedule::run(&project, once).await,
        Commands::ScheduleList => commands::schedule::list(&project),
        Commands::QueueWork { stop_when_empty } => {
            commands::queue::work(&project, stop_when_empty).await
        }
        Commands::JobRun { name, payload } => {
            commands::job::run(&project, &name, payload.as_deref()).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    configure_output(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
