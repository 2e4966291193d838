//! Layered configuration for Stacks.
//!
//! [`ConfigManager`] is a key/value store over JSON values that can be fed
//! from TOML, JSON and `.env` files and from prefixed environment variables.
//! Nested keys are addressed with dots (`queue.concurrency`).
//!
//! [`AppConfig`] is the typed settings tree the `buddy` binary runs on.
//!
//! ```
//! use stacks_config::ConfigManager;
//!
//! let manager = ConfigManager::new();
//! manager.set("queue.concurrency", 4).unwrap();
//!
//! let concurrency: u32 = manager.get("queue.concurrency").unwrap();
//! assert_eq!(concurrency, 4);
//! assert!(manager.has("queue"));
//! ```

pub mod app;
pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use app::{AppConfig, QueueSettings, SchedulerSettings, DEFAULT_CONFIG_FILES, ENV_PREFIX};
pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Main configuration manager
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<Map<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only environment variables starting with `PREFIX_` are loaded by
    /// [`load_env`](Self::load_env).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy environment variables in as top-level string values.
    pub fn load_env(&self) -> Result<()> {
        let vars = EnvLoader::new(self.env_prefix.clone()).load();

        let mut config = self.write();
        for (key, value) in vars {
            config.insert(key, Value::String(value));
        }

        Ok(())
    }

    /// Load a `.env` file into the process environment, then call
    /// [`load_env`](Self::load_env). Without a path a missing `.env` is ignored.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        self.load_env()
    }

    /// Merge a file into the current values. Nested tables are merged key
    /// by key; later files win.
    pub fn load_file(&self, path: &Path, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).load_file(path)?;
        self.merge_value(data)
    }

    /// Like [`load_file`](Self::load_file) with the format taken from the
    /// extension.
    pub fn load_path(&self, path: &Path) -> Result<()> {
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.merge_value(data)
    }

    fn merge_value(&self, data: Value) -> Result<()> {
        let Value::Object(map) = data else {
            return Err(ConfigError::ParseError(
                "configuration root must be a table".to_string(),
            ));
        };
        let mut config = self.write();
        for (key, value) in map {
            merge_into(config.entry(key).or_insert(Value::Null), value);
        }
        Ok(())
    }

    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        insert_path(&mut self.write(), key, value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let config = self.read();
        let value = lookup(&config, key).ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        lookup(&self.read(), key).is_some()
    }

    /// Top-level keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Merge another manager's values over this one's.
    pub fn merge(&self, other: &ConfigManager) -> Result<()> {
        let snapshot = other.snapshot();
        self.merge_value(snapshot)
    }

    /// All values as one JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.read().clone())
    }

    /// Deserialize every value into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.snapshot())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let config: T = self.deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

fn merge_into(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                merge_into(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, incoming) => *target = incoming,
    }
}

fn insert_path(map: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    let (head, rest) = key.split_once('.')?;
    match map.get(head)? {
        Value::Object(child) => lookup(child, rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("scheduler.timezone", "UTC").unwrap();

        let value: String = manager.get("scheduler.timezone").unwrap();
        assert_eq!(value, "UTC");
        assert_eq!(manager.keys(), vec!["scheduler"]);
    }

    #[test]
    fn test_get_or_default() {
        let manager = ConfigManager::new();
        let value: String = manager.get_or("queue.name", "default".to_string());
        assert_eq!(value, "default");
        assert!(matches!(
            manager.get::<String>("queue.name"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_type_conversions() {
        let manager = ConfigManager::new();
        manager.set("name", "mail").unwrap();
        manager.set("concurrency", 4i64).unwrap();
        manager.set("run_on_start", true).unwrap();

        assert_eq!(manager.get_string("name").unwrap(), "mail");
        assert_eq!(manager.get_int("concurrency").unwrap(), 4);
        assert!(manager.get_bool("run_on_start").unwrap());
        assert!(manager.get_int("name").is_err());
    }

    #[test]
    fn test_merge_is_deep() {
        let base = ConfigManager::new();
        base.set("queue.name", "default").unwrap();
        base.set("queue.concurrency", 1).unwrap();

        let overlay = ConfigManager::new();
        overlay.set("queue.concurrency", 8).unwrap();

        base.merge(&overlay).unwrap();
        assert_eq!(base.get_string("queue.name").unwrap(), "default");
        assert_eq!(base.get_int("queue.concurrency").unwrap(), 8);
    }

    #[test]
    fn test_scalar_replaced_by_table() {
        let manager = ConfigManager::new();
        manager.set("queue", "flat").unwrap();
        manager.set("queue.name", "mail").unwrap();
        assert_eq!(manager.get_string("queue.name").unwrap(), "mail");
    }
}
