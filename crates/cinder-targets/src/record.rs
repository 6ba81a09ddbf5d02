//! Run records: what happened to each target in one build

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fingerprint::StaleReason;

/// Why a target failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    /// The executor reported an error
    Executor(String),
    /// An upstream target failed, so this one never ran
    Upstream(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executor(message) => write!(f, "{}", message),
            Self::Upstream(name) => write!(f, "upstream target '{}' failed", name),
        }
    }
}

/// A target failure, scoped to one target
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("target '{target}' failed: {cause}")]
pub struct ExecutionFailure {
    /// The failed target
    pub target: String,
    /// Underlying cause
    pub cause: FailureCause,
}

/// Final status of a target within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    /// Executed and its result cached
    Succeeded,
    /// Up to date; cached result reused
    Skipped,
    /// Executor failed, or an upstream target did
    Failed { cause: FailureCause },
    /// Never dispatched because the run was cancelled or halted
    Cancelled,
}

impl TargetStatus {
    /// Whether the target ended with a usable result
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Per-target entry of a run record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    /// Target name
    pub name: String,
    /// Whether the target needed (re)execution
    pub stale: bool,
    /// Why it was stale, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<StaleReason>,
    /// Wall-clock time spent on the target
    pub duration_ms: u64,
    /// Final status
    #[serde(flatten)]
    pub status: TargetStatus,
}

impl TargetReport {
    /// Wall-clock time spent on the target
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No target failed
    Success,
    /// Some targets failed, others completed
    PartialFailure,
    /// Targets failed and none completed
    Failure,
    /// Nothing failed but some targets were never dispatched
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialFailure => write!(f, "partial failure"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything one build did, in topological order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the run started (RFC 3339)
    pub started_at: String,
    /// Total wall-clock time
    pub duration_ms: u64,
    /// Whether the caller cancelled the run
    pub cancelled: bool,
    /// Per-target reports
    pub targets: Vec<TargetReport>,
}

impl RunRecord {
    /// Start an empty record
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 0,
            cancelled: false,
            targets: Vec::new(),
        }
    }

    /// Report for a target
    pub fn get(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Names of targets that were found stale
    pub fn stale_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.stale)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Names of targets that were (re)executed successfully
    pub fn executed_targets(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, TargetStatus::Succeeded))
    }

    /// Names of targets whose cached results were reused
    pub fn skipped_targets(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, TargetStatus::Skipped))
    }

    /// Names of targets that were never dispatched
    pub fn cancelled_targets(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, TargetStatus::Cancelled))
    }

    fn with_status(&self, pred: impl Fn(&TargetStatus) -> bool) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| pred(&t.status))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Every failed target and why
    pub fn failures(&self) -> Vec<ExecutionFailure> {
        self.targets
            .iter()
            .filter_map(|t| match &t.status {
                TargetStatus::Failed { cause } => Some(ExecutionFailure {
                    target: t.name.clone(),
                    cause: cause.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Overall outcome
    pub fn outcome(&self) -> RunOutcome {
        let failed = self
            .targets
            .iter()
            .filter(|t| matches!(t.status, TargetStatus::Failed { .. }))
            .count();
        let completed = self.targets.iter().filter(|t| t.status.is_success()).count();
        let dropped = self
            .targets
            .iter()
            .any(|t| matches!(t.status, TargetStatus::Cancelled));

        match (failed, completed) {
            (0, _) if dropped => RunOutcome::Cancelled,
            (0, _) => RunOutcome::Success,
            (_, 0) => RunOutcome::Failure,
            _ => RunOutcome::PartialFailure,
        }
    }

    /// Total wall-clock time
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}
