//! Configuration validation

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Pattern every target name must match
pub const TARGET_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$";

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating plan configuration");
    validate_scheduler(config)?;
    validate_cache(config)?;
    validate_targets(config)?;
    debug!("plan configuration validation passed");
    Ok(())
}

static TARGET_NAME_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(TARGET_NAME_PATTERN).ok());

/// Check a single target name against [`TARGET_NAME_PATTERN`]
pub fn is_valid_target_name(name: &str) -> bool {
    TARGET_NAME_RE.as_ref().is_some_and(|re| re.is_match(name))
}

fn validate_scheduler(config: &Config) -> Result<()> {
    if config.scheduler.concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.cache.dir.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "cache.dir".to_string(),
            message: "cache directory cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_targets(config: &Config) -> Result<()> {
    for (i, target) in config.targets.iter().enumerate() {
        if !is_valid_target_name(&target.name) {
            return Err(ConfigError::InvalidValue {
                field: format!("targets[{}].name", i),
                message: format!(
                    "'{}' must start with a letter, digit or underscore and contain only letters, digits, '_', '.', '-'",
                    target.name
                ),
            }
            .into());
        }

        if target.command.kind.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("targets[{}].command.kind", i),
                message: "command kind cannot be empty".to_string(),
            }
            .into());
        }
    }

    Ok(())
}
