//! Configuration validation, run once at startup to catch common
//! misconfiguration before any listener is bound.

use super::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bus.url must not be empty")]
    MissingBusUrl,
    #[error("history.sqlite_path must not be empty")]
    MissingSqlitePath,
    #[error("history.redb_path must not be empty")]
    MissingRedbPath,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bus.url.trim().is_empty() {
        errors.push(ValidationError::MissingBusUrl);
    }
    if config.history.sqlite_path.trim().is_empty() {
        errors.push(ValidationError::MissingSqlitePath);
    }
    if config.history.redb_path.trim().is_empty() {
        errors.push(ValidationError::MissingRedbPath);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
