//! Cinder Targets - incremental target engine
//!
//! This crate provides the target graph, the fingerprint store that decides
//! staleness, persistent result caching, and a tokio scheduler that executes
//! only what changed and reports per-target outcomes.

pub mod cache;
pub mod command;
pub mod executor;
pub mod fingerprint;
pub mod graph;
pub mod plan;
pub mod record;
pub mod reporter;
pub mod scheduler;
pub mod store;
pub mod target;

pub use cache::{BuildCache, CacheEntry, CacheStats, PruneStats, ResultCache};
pub use command::{Command, CommandError, CommandRegistry};
pub use executor::{BoxError, CommandExecutor, Executor, FnExecutor};
pub use fingerprint::{Fingerprint, FingerprintStore, StaleReason};
pub use graph::{GraphError, TargetGraph};
pub use plan::{build_graph, PlanError};
pub use record::{ExecutionFailure, FailureCause, RunOutcome, RunRecord, TargetReport, TargetStatus};
pub use reporter::{TargetEvent, TargetReporter, TargetReporterRegistry};
pub use scheduler::{CancelHandle, ScheduleError, Scheduler, SchedulerOptions};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use target::{Target, TargetInputs};
