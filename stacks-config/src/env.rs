// Environment variable loading

use std::collections::HashMap;
use std::env;

/// Reads `PREFIX_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Some(prefix.into()))
    }

    /// Full variable name for `key`, e.g. `QUEUE_NAME` -> `STACKS_QUEUE_NAME`.
    pub fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    /// All matching variables, keyed by lower-cased name without the prefix.
    pub fn load(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(key, value)| match &self.prefix {
                Some(prefix) => key
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| (rest.to_lowercase(), value)),
                None => Some((key.to_lowercase(), value)),
            })
            .collect()
    }

    /// A single variable; empty values count as unset.
    pub fn var(&self, key: &str) -> Option<String> {
        env::var(self.var_name(key)).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn var_or(&self, key: &str, default: &str) -> String {
        self.var(key).unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name() {
        let loader = EnvLoader::with_prefix("STACKS");
        assert_eq!(loader.var_name("queue_name"), "STACKS_QUEUE_NAME");
        assert_eq!(EnvLoader::default().var_name("path"), "PATH");
    }

    #[test]
    fn test_missing_var_falls_back() {
        let loader = EnvLoader::with_prefix("STACKS_TEST_UNSET");
        assert!(loader.var("NOTHING_HERE_4821").is_none());
        assert_eq!(loader.var_or("NOTHING_HERE_4821", "fallback"), "fallback");
    }

    #[test]
    fn test_path_is_visible_without_prefix() {
        let loader = EnvLoader::default();
        if env::var("PATH").is_ok_and(|p| !p.is_empty()) {
            assert!(loader.var("PATH").is_some());
            assert!(loader.load().contains_key("path"));
        }
    }
}
