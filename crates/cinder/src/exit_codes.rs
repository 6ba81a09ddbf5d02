//! Exit codes for the CLI

use cinder_core::{CinderError, ConfigError};
use cinder_targets::{GraphError, PlanError, ScheduleError, StoreError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error, or every executed target failed
pub const ERROR: i32 = 1;

/// Plan file or graph error
pub const CONFIG_ERROR: i32 = 2;

/// Some targets failed, others completed
pub const PARTIAL_FAILURE: i32 = 3;

/// The cache store could not be reached
pub const STORE_UNAVAILABLE: i32 = 4;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// A failure that has already been reported, carrying its exit code
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExitStatus {
    pub code: i32,
    pub message: String,
}

impl ExitStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Map an error to the process exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(status) = cause.downcast_ref::<ExitStatus>() {
            return status.code;
        }
        if cause.is::<ConfigError>() || cause.is::<PlanError>() || cause.is::<GraphError>() {
            return CONFIG_ERROR;
        }
        if let Some(CinderError::Config(_)) = cause.downcast_ref::<CinderError>() {
            return CONFIG_ERROR;
        }
        match cause.downcast_ref::<ScheduleError>() {
            Some(ScheduleError::Graph(_)) => return CONFIG_ERROR,
            Some(ScheduleError::Store(StoreError::Unavailable { .. })) => return STORE_UNAVAILABLE,
            _ => {}
        }
        if let Some(StoreError::Unavailable { .. }) = cause.downcast_ref::<StoreError>() {
            return STORE_UNAVAILABLE;
        }
    }
    ERROR
}
