// Configuration validation

use crate::{ConfigError, Result};
use chrono_tz::Tz;
use std::fmt::Display;

/// Implemented by configuration structs that check themselves after loading.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable field checks.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of the allowed values, got {}",
                field, value
            )));
        }
        Ok(())
    }

    /// IANA timezone name such as `America/Los_Angeles`.
    pub fn is_timezone(value: &str, field: &str) -> Result<()> {
        value.trim().parse::<Tz>().map(|_| ()).map_err(|_| {
            ConfigError::ValidationError(format!("{} is not a known timezone: {}", field, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("default", "queue.name").is_ok());
        assert!(ConfigValidator::not_empty("  ", "queue.name").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        let err = ConfigValidator::in_range(11, 1, 10, "field").unwrap_err();
        assert!(err.to_string().contains("between 1 and 10"));
    }

    #[test]
    fn test_positive_validation() {
        assert!(ConfigValidator::positive(1, "queue.concurrency").is_ok());
        assert!(ConfigValidator::positive(0, "queue.concurrency").is_err());
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["json", "toml"];
        assert!(ConfigValidator::one_of(&"toml", &allowed, "format").is_ok());
        assert!(ConfigValidator::one_of(&"yaml", &allowed, "format").is_err());
    }

    #[test]
    fn test_timezone_validation() {
        assert!(ConfigValidator::is_timezone("America/Los_Angeles", "tz").is_ok());
        assert!(ConfigValidator::is_timezone("UTC", "tz").is_ok());
        assert!(ConfigValidator::is_timezone("Mars/Olympus_Mons", "tz").is_err());
    }
}
