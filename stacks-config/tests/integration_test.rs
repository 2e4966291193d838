//! Integration tests for stacks-config

use stacks_config::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_load_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("buddy.toml");
    fs::write(
        &path,
        r#"
        [scheduler]
        schedule_file = "config/Schedule.toml"
        timezone = "America/Los_Angeles"
        run_on_start = true

        [queue]
        name = "mail"
        concurrency = 4
        "#,
    )
    .unwrap();

    let config = AppConfig::from_file(&path).unwrap();
    assert_eq!(config.scheduler.schedule_file, Path::new("config/Schedule.toml"));
    assert_eq!(config.scheduler.timezone.as_deref(), Some("America/Los_Angeles"));
    assert!(config.scheduler.run_on_start);
    assert_eq!(config.queue.name, "mail");
    assert_eq!(config.queue.concurrency, 4);
    assert_eq!(config.queue.poll_interval_ms, 1000);
}

#[test]
fn test_load_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("buddy.json");
    fs::write(&path, r#"{"queue": {"max_size": 50}}"#).unwrap();

    let config = AppConfig::from_file(&path).unwrap();
    assert_eq!(config.queue.max_size, 50);
    assert_eq!(config.scheduler, SchedulerSettings::default());
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("buddy.toml");
    fs::write(&path, "[queue]\nconcurrency = 0\n").unwrap();

    let err = AppConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    fs::write(&path, "[queue\n").unwrap();
    assert!(matches!(
        AppConfig::from_file(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_discover_prefers_toml() {
    let dir = TempDir::new().unwrap();
    assert!(AppConfig::discover(dir.path()).is_none());

    fs::write(dir.path().join("buddy.json"), "{}").unwrap();
    fs::write(dir.path().join("buddy.toml"), "").unwrap();
    assert_eq!(
        AppConfig::discover(dir.path()),
        Some(dir.path().join("buddy.toml"))
    );
}

#[test]
fn test_explicit_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = AppConfig::load_in(dir.path(), Some(Path::new("nope.toml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_manager_loads_env_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.env");
    fs::write(&path, "QUEUE_NAME=mail\n").unwrap();

    let manager = ConfigManager::new();
    manager.load_file(&path, FileFormat::Env).unwrap();
    assert_eq!(manager.get_string("QUEUE_NAME").unwrap(), "mail");
}
