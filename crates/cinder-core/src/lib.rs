//! Cinder Core - Core library for incremental target builds
//!
//! This crate provides the error types and plan-file configuration shared by
//! the target engine and the command-line interface.

pub mod config;
pub mod error;

pub use config::{CacheConfig, CommandConfig, Config, SchedulerConfig, TargetConfig, Trigger};
pub use error::{CinderError, ConfigError, Result};
