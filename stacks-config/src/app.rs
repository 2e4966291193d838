//! Typed settings for the scheduler, the queue worker and the CLI.

use crate::{ConfigError, ConfigManager, ConfigValidator, EnvLoader, Result, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Files looked for in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["buddy.toml", "buddy.json"];

/// Prefix of environment overrides (`STACKS_QUEUE_CONCURRENCY`, ...).
pub const ENV_PREFIX: &str = "STACKS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Schedule definition file
    pub schedule_file: PathBuf,

    /// Directory holding one definition file per job
    pub jobs_dir: PathBuf,

    /// Default IANA zone for entries without their own
    pub timezone: Option<String>,

    /// Also evaluate the minute the scheduler starts in
    pub run_on_start: bool,

    pub log_execution: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            schedule_file: PathBuf::from("app/Schedule.toml"),
            jobs_dir: PathBuf::from("app/Jobs"),
            timezone: None,
            run_on_start: false,
            log_execution: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub name: String,

    /// Number of worker tasks
    pub concurrency: usize,

    /// Sleep between polls of an empty queue
    pub poll_interval_ms: u64,

    /// Maximum waiting jobs; 0 is unbounded
    pub max_size: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            concurrency: 1,
            poll_interval_ms: 1000,
            max_size: 0,
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings tree read from `buddy.toml` / `buddy.json`.
///
/// ```
/// use stacks_config::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.queue.name, "default");
/// assert_eq!(config.queue.concurrency, 1);
/// assert!(config.scheduler.log_execution);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerSettings,
    pub queue: QueueSettings,
}

impl AppConfig {
    /// Load from the working directory: defaults, then `path` (or the first
    /// of [`DEFAULT_CONFIG_FILES`] that exists), then `.env`, then
    /// `STACKS_*` overrides. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_in(Path::new("."), path)
    }

    /// [`load`](Self::load) relative to `dir`.
    pub fn load_in(dir: &Path, path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::new();
        match path {
            Some(path) => {
                let path = dir.join(path);
                if !path.is_file() {
                    return Err(ConfigError::LoadError(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                manager.load_path(&path)?;
            }
            None => {
                if let Some(found) = Self::discover(dir) {
                    manager.load_path(&found)?;
                }
            }
        }

        let dotenv = dir.join(".env");
        if dotenv.is_file() {
            dotenvy::from_path(&dotenv).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        }

        let mut config: Self = manager.deserialize()?;
        config.apply_env(&EnvLoader::with_prefix(ENV_PREFIX))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a single file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let manager = ConfigManager::new();
        manager.load_path(path)?;
        manager.load_validated()
    }

    /// First default config file present in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    pub fn apply_env(&mut self, env: &EnvLoader) -> Result<()> {
        self.apply_overrides(|key| env.var(key))
    }

    /// Apply overrides from `lookup`, keyed without the `STACKS_` prefix.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("QUEUE_CONCURRENCY") {
            self.queue.concurrency =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        var: format!("{}_QUEUE_CONCURRENCY", ENV_PREFIX),
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup("QUEUE_NAME") {
            self.queue.name = value.trim().to_string();
        }
        if let Some(value) = lookup("SCHEDULER_TIMEZONE") {
            self.scheduler.timezone = Some(value.trim().to_string());
        }
        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.queue.name, "queue.name")?;
        ConfigValidator::positive(self.queue.concurrency as u64, "queue.concurrency")?;
        ConfigValidator::positive(self.queue.poll_interval_ms, "queue.poll_interval_ms")?;
        if let Some(zone) = &self.scheduler.timezone {
            ConfigValidator::is_timezone(zone, "scheduler.timezone")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.schedule_file, PathBuf::from("app/Schedule.toml"));
        assert_eq!(config.scheduler.jobs_dir, PathBuf::from("app/Jobs"));
        assert_eq!(config.queue.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_tables_keep_defaults() {
        let manager = ConfigManager::new();
        manager.set("queue.concurrency", 3).unwrap();

        let config: AppConfig = manager.load_validated().unwrap();
        assert_eq!(config.queue.concurrency, 3);
        assert_eq!(config.queue.name, "default");
        assert!(!config.scheduler.run_on_start);
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("QUEUE_CONCURRENCY", "6"),
            ("QUEUE_NAME", "mail"),
            ("SCHEDULER_TIMEZONE", "Europe/Berlin"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.queue.concurrency, 6);
        assert_eq!(config.queue.name, "mail");
        assert_eq!(config.scheduler.timezone.as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn test_bad_override() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "QUEUE_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STACKS_QUEUE_CONCURRENCY"));
    }

    #[test]
    fn test_validation_rejects() {
        let mut config = AppConfig::default();
        config.queue.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.queue.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scheduler.timezone = Some("Atlantis/Central".to_string());
        assert!(config.validate().is_err());
    }
}
