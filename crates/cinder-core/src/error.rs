//! Error types for Cinder

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CinderError
pub type Result<T> = std::result::Result<T, CinderError>;

/// Main error type for Cinder core operations
#[derive(Debug, Error)]
pub enum CinderError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Plan file not found in {0} or any parent directory")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl CinderError {
    /// Whether this error means no plan file could be located
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Config(ConfigError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err: CinderError = ConfigError::InvalidValue {
            field: "scheduler.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: scheduler.concurrency - must be at least 1"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        let err: CinderError = ConfigError::NotFound(PathBuf::from("/work")).into();
        assert!(err.is_not_found());
    }
}
