//! Target execution reporting

use std::sync::Arc;
use std::time::Duration;

use crate::fingerprint::StaleReason;

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum TargetEvent {
    /// A run is starting
    RunStarted {
        targets: usize,
        concurrency: usize,
    },
    /// A stale target is starting execution
    Started {
        name: String,
        kind: String,
        reason: StaleReason,
    },
    /// A target executed successfully
    Completed {
        name: String,
        duration: Duration,
    },
    /// A target was up to date and its cached result reused
    Skipped {
        name: String,
    },
    /// A target failed (directly or because of an upstream failure)
    Failed {
        name: String,
        duration: Duration,
        error: String,
    },
    /// A target was never dispatched
    Cancelled {
        name: String,
    },
    /// All targets are accounted for
    AllCompleted {
        total: usize,
        executed: usize,
        skipped: usize,
        failed: usize,
        duration: Duration,
    },
}

/// Trait for reporting run progress
pub trait TargetReporter: Send + Sync {
    /// Handle an event
    fn report(&self, event: &TargetEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TargetReporter for TracingReporter {
    fn report(&self, event: &TargetEvent) {
        match event {
            TargetEvent::RunStarted {
                targets,
                concurrency,
            } => {
                tracing::info!("Starting run of {} targets (concurrency {})", targets, concurrency);
            }
            TargetEvent::Started { name, kind, reason } => {
                tracing::info!("Building {} [{}]: {}", name, kind, reason);
            }
            TargetEvent::Completed { name, duration } => {
                tracing::info!("{} built in {:.1}s", name, duration.as_secs_f64());
            }
            TargetEvent::Skipped { name } => {
                tracing::info!("{} up to date", name);
            }
            TargetEvent::Failed {
                name,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", name, duration.as_secs_f64(), error);
            }
            TargetEvent::Cancelled { name } => {
                tracing::warn!("{} cancelled", name);
            }
            TargetEvent::AllCompleted {
                total,
                executed,
                skipped,
                failed,
                duration,
            } => {
                tracing::info!(
                    "Run complete: {} built, {} up to date, {} failed of {} ({:.1}s)",
                    executed,
                    skipped,
                    failed,
                    total,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TargetEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TargetEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TargetReporter for CollectingReporter {
    fn report(&self, event: &TargetEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Fan-out to several reporters
pub struct TargetReporterRegistry {
    reporters: Vec<Arc<dyn TargetReporter>>,
}

impl TargetReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TargetReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TargetReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TargetReporter>] {
        &self.reporters
    }
}

impl TargetReporter for TargetReporterRegistry {
    fn report(&self, event: &TargetEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TargetReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
