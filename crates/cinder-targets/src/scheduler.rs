//! Target scheduler using tokio
//!
//! Targets are visited in topological order. Each one is either skipped
//! (fingerprint and cached result are current) or handed to the executor.
//! Independent branches run concurrently up to `concurrency`; a target is
//! dispatched only once all of its upstream targets completed successfully.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use cinder_core::config::{SchedulerConfig, Trigger};

use crate::cache::{BuildCache, CacheEntry};
use crate::executor::Executor;
use crate::fingerprint::{
    code_identity, file_identity, file_input_id, upstream_input_id, StaleReason,
};
use crate::graph::{GraphError, TargetGraph};
use crate::record::{FailureCause, RunRecord, TargetReport, TargetStatus};
use crate::reporter::{TargetEvent, TargetReporter};
use crate::store::StoreError;
use crate::target::{DeclaredFile, Target, TargetInputs};

/// Placeholder identity for an upstream result not yet produced
const PENDING_RESULT: &str = "pending";

/// Options for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum targets executing at once (1 = sequential)
    pub concurrency: usize,
    /// Keep dispatching independent targets after a failure
    pub keep_going: bool,
    /// Directory declared files and commands resolve against
    pub root_dir: PathBuf,
    /// Targets to rebuild regardless of fingerprints
    pub force: BTreeSet<String>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            keep_going: true,
            root_dir: std::env::current_dir().unwrap_or_default(),
            force: BTreeSet::new(),
        }
    }
}

impl SchedulerOptions {
    /// Options from the plan's scheduler section
    pub fn from_config(config: &SchedulerConfig, root_dir: PathBuf) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            keep_going: config.keep_going,
            root_dir,
            force: BTreeSet::new(),
        }
    }

    /// Mark targets to rebuild unconditionally
    pub fn with_force<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Stops dispatch of targets that have not started yet.
///
/// In-flight executions finish normally and recorded fingerprints stay.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The graph cannot be ordered
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The persistence collaborator failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Current identities of a target and the staleness verdict
#[derive(Debug)]
struct Evaluation {
    code_id: String,
    upstream_ids: Vec<String>,
    read_ids: Vec<String>,
    write_ids: Vec<String>,
    reads: Vec<DeclaredFile>,
    writes: Vec<DeclaredFile>,
    reason: Option<StaleReason>,
    cached: Option<CacheEntry>,
}

impl Evaluation {
    fn input_ids(&self) -> Vec<String> {
        self.upstream_ids
            .iter()
            .chain(&self.read_ids)
            .chain(&self.write_ids)
            .cloned()
            .collect()
    }
}

/// Outcome of one spawned execution
struct Finished {
    name: String,
    result: Result<Value, String>,
    duration: Duration,
}

fn file_ids(files: &[DeclaredFile]) -> Vec<String> {
    files
        .iter()
        .map(|f| file_input_id(&f.display, &file_identity(&f.path)))
        .collect()
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Target scheduler
pub struct Scheduler {
    options: SchedulerOptions,
    reporter: Arc<dyn TargetReporter>,
    cancel: CancelHandle,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(options: SchedulerOptions, reporter: Arc<dyn TargetReporter>) -> Self {
        Self {
            options,
            reporter,
            cancel: CancelHandle::default(),
        }
    }

    /// Handle that cancels runs of this scheduler
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Scheduler options
    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    fn evaluate(
        &self,
        target: &Target,
        results: &HashMap<String, CacheEntry>,
        upstream_rebuilt: bool,
        cache: &BuildCache,
    ) -> Result<Evaluation, StoreError> {
        let code_id = code_identity(target.command.as_ref());
        let upstream_ids = target
            .depends_on
            .iter()
            .map(|dep| {
                let result_id = results
                    .get(dep)
                    .map(|entry| entry.result_id.as_str())
                    .unwrap_or(PENDING_RESULT);
                upstream_input_id(dep, result_id)
            })
            .collect();
        let reads = target.resolved_reads(&self.options.root_dir);
        let writes = target.resolved_writes(&self.options.root_dir);
        let read_ids = file_ids(&reads);
        let write_ids = file_ids(&writes);
        let cached = cache.results().get(&target.name)?;

        let mut evaluation = Evaluation {
            code_id,
            upstream_ids,
            read_ids,
            write_ids,
            reads,
            writes,
            reason: None,
            cached,
        };

        evaluation.reason = if self.options.force.contains(&target.name) {
            Some(StaleReason::Forced)
        } else {
            match target.trigger {
                Trigger::Always => Some(StaleReason::Always),
                Trigger::Missing if evaluation.cached.is_none() => Some(StaleReason::ResultMissing),
                Trigger::Missing if upstream_rebuilt => Some(StaleReason::UpstreamChanged),
                Trigger::Missing => None,
                Trigger::Fingerprint => {
                    let input_ids = evaluation.input_ids();
                    match cache
                        .fingerprints()
                        .staleness(&target.name, &evaluation.code_id, &input_ids)?
                    {
                        Some(StaleReason::NeverBuilt) => Some(StaleReason::NeverBuilt),
                        _ if upstream_rebuilt => Some(StaleReason::UpstreamChanged),
                        Some(reason) => Some(reason),
                        None if evaluation.cached.is_none() => Some(StaleReason::ResultMissing),
                        None => None,
                    }
                }
            }
        };

        Ok(evaluation)
    }

    /// Targets a run would execute, with the reason, without executing
    /// anything. Staleness propagates to descendants as it would in a run.
    #[instrument(skip_all, fields(targets = graph.len()))]
    pub fn outdated(
        &self,
        graph: &TargetGraph,
        cache: &BuildCache,
    ) -> Result<Vec<(String, StaleReason)>, ScheduleError> {
        let order = graph.topological_order()?;
        let mut stale: HashSet<&str> = HashSet::new();
        let mut results: HashMap<String, CacheEntry> = HashMap::new();
        let mut outdated = Vec::new();

        for name in &order {
            let Some(target) = graph.get(name) else {
                continue;
            };
            let upstream_rebuilt = target.depends_on.iter().any(|d| stale.contains(d.as_str()));
            let evaluation = self.evaluate(target, &results, upstream_rebuilt, cache)?;

            match (evaluation.reason, evaluation.cached) {
                (None, Some(entry)) => {
                    results.insert(name.clone(), entry);
                }
                (reason, _) => {
                    stale.insert(name.as_str());
                    outdated.push((name.clone(), reason.unwrap_or(StaleReason::ResultMissing)));
                }
            }
        }

        debug!(outdated = outdated.len(), "outdated targets computed");
        Ok(outdated)
    }

    /// Build every stale target in `graph`.
    ///
    /// Executor failures are contained in the returned [`RunRecord`]: the
    /// failed target and its descendants are marked failed and independent
    /// branches continue. Only graph and persistence errors abort the run.
    #[instrument(skip_all, fields(targets = graph.len(), concurrency = self.options.concurrency))]
    pub async fn run(
        &self,
        graph: &TargetGraph,
        cache: &BuildCache,
        executor: Arc<dyn Executor>,
    ) -> Result<RunRecord, ScheduleError> {
        let start = Instant::now();
        let mut record = RunRecord::new();
        let order = graph.topological_order()?;
        let concurrency = self.options.concurrency.max(1);

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        let mut waiting: HashMap<&str, usize> = order
            .iter()
            .map(|name| (name.as_str(), graph.upstream(name).len()))
            .collect();
        let mut ready: BTreeSet<usize> = order
            .iter()
            .enumerate()
            .filter(|(_, name)| graph.upstream(name).is_empty())
            .map(|(i, _)| i)
            .collect();

        let mut results: HashMap<String, CacheEntry> = HashMap::new();
        let mut rebuilt: HashSet<String> = HashSet::new();
        let mut reports: HashMap<String, TargetReport> = HashMap::new();
        let mut pending: HashMap<String, Evaluation> = HashMap::new();
        let mut in_flight: JoinSet<Finished> = JoinSet::new();
        let mut halted = false;

        self.reporter.report(&TargetEvent::RunStarted {
            targets: order.len(),
            concurrency,
        });

        loop {
            while in_flight.len() < concurrency {
                let Some(pos) = ready.pop_first() else {
                    break;
                };
                let name = &order[pos];
                let Some(target) = graph.get(name) else {
                    continue;
                };

                if halted || self.cancel.is_cancelled() {
                    self.mark_cancelled(name, &mut reports);
                    continue;
                }

                let evaluated_at = Instant::now();
                let upstream_rebuilt = target.depends_on.iter().any(|d| rebuilt.contains(d));
                let evaluation = self.evaluate(target, &results, upstream_rebuilt, cache)?;

                if let (None, Some(entry)) = (&evaluation.reason, &evaluation.cached) {
                    debug!(target_name = %name, "up to date");
                    reports.insert(
                        name.clone(),
                        TargetReport {
                            name: name.clone(),
                            stale: false,
                            reason: None,
                            duration_ms: millis(evaluated_at.elapsed()),
                            status: TargetStatus::Skipped,
                        },
                    );
                    self.reporter.report(&TargetEvent::Skipped { name: name.clone() });
                    results.insert(name.clone(), entry.clone());
                    release(graph, name, &position, &mut waiting, &mut ready);
                    continue;
                }

                let reason = evaluation
                    .reason
                    .clone()
                    .unwrap_or(StaleReason::ResultMissing);
                let inputs = TargetInputs {
                    target: name.clone(),
                    upstream: target
                        .depends_on
                        .iter()
                        .filter_map(|d| results.get(d).map(|e| (d.clone(), e.value.clone())))
                        .collect(),
                    reads: evaluation.reads.iter().map(|f| f.path.clone()).collect(),
                    writes: evaluation.writes.iter().map(|f| f.path.clone()).collect(),
                    root_dir: self.options.root_dir.clone(),
                };

                info!(target_name = %name, reason = %reason, "executing target");
                self.reporter.report(&TargetEvent::Started {
                    name: name.clone(),
                    kind: target.command.kind().to_string(),
                    reason,
                });
                pending.insert(name.clone(), evaluation);

                let executor = executor.clone();
                let target = target.clone();
                in_flight.spawn(async move {
                    let started = Instant::now();
                    let name = target.name.clone();
                    // Run on its own task so a panicking executor surfaces as a JoinError
                    let handle = tokio::spawn(async move {
                        executor
                            .execute(&target, &inputs)
                            .await
                            .map_err(|e| e.to_string())
                    });
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(format!("executor panicked: {}", e)),
                    };
                    Finished {
                        name,
                        result,
                        duration: started.elapsed(),
                    }
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let finished = match in_flight.join_next().await {
                Some(Ok(finished)) => finished,
                Some(Err(e)) => {
                    error!(error = %e, "scheduler task failed");
                    continue;
                }
                None => break,
            };
            let name = finished.name;
            let Some(evaluation) = pending.remove(&name) else {
                continue;
            };
            let reason = evaluation.reason.clone();

            match finished.result {
                Ok(value) => {
                    let entry = cache.results().put(&name, value, finished.duration)?;
                    let input_ids: Vec<String> = evaluation
                        .upstream_ids
                        .iter()
                        .chain(&evaluation.read_ids)
                        .cloned()
                        .chain(file_ids(&evaluation.writes))
                        .collect();
                    cache
                        .fingerprints()
                        .record_fingerprint(&name, &evaluation.code_id, &input_ids)?;

                    reports.insert(
                        name.clone(),
                        TargetReport {
                            name: name.clone(),
                            stale: true,
                            reason,
                            duration_ms: millis(finished.duration),
                            status: TargetStatus::Succeeded,
                        },
                    );
                    self.reporter.report(&TargetEvent::Completed {
                        name: name.clone(),
                        duration: finished.duration,
                    });
                    results.insert(name.clone(), entry);
                    rebuilt.insert(name.clone());
                    release(graph, &name, &position, &mut waiting, &mut ready);
                }
                Err(message) => {
                    self.reporter.report(&TargetEvent::Failed {
                        name: name.clone(),
                        duration: finished.duration,
                        error: message.clone(),
                    });
                    reports.insert(
                        name.clone(),
                        TargetReport {
                            name: name.clone(),
                            stale: true,
                            reason,
                            duration_ms: millis(finished.duration),
                            status: TargetStatus::Failed {
                                cause: FailureCause::Executor(message),
                            },
                        },
                    );
                    self.fail_descendants(graph, &name, &mut reports);

                    if !self.options.keep_going {
                        info!(target_name = %name, "halting dispatch after failure");
                        halted = true;
                    }
                }
            }
        }

        // Anything never reached was blocked behind a cancelled target
        for name in &order {
            if !reports.contains_key(name) {
                self.mark_cancelled(name, &mut reports);
            }
        }

        record.targets = order.iter().filter_map(|name| reports.remove(name)).collect();
        record.cancelled = self.cancel.is_cancelled();
        record.duration_ms = millis(start.elapsed());

        self.reporter.report(&TargetEvent::AllCompleted {
            total: record.targets.len(),
            executed: record.executed_targets().len(),
            skipped: record.skipped_targets().len(),
            failed: record.failures().len(),
            duration: start.elapsed(),
        });
        info!(outcome = %record.outcome(), duration_ms = record.duration_ms, "run finished");

        cache.save_run_record(&record)?;
        cache.flush()?;
        Ok(record)
    }

    fn mark_cancelled(&self, name: &str, reports: &mut HashMap<String, TargetReport>) {
        reports.insert(
            name.to_string(),
            TargetReport {
                name: name.to_string(),
                stale: false,
                reason: None,
                duration_ms: 0,
                status: TargetStatus::Cancelled,
            },
        );
        self.reporter.report(&TargetEvent::Cancelled {
            name: name.to_string(),
        });
    }

    fn fail_descendants(
        &self,
        graph: &TargetGraph,
        failed: &str,
        reports: &mut HashMap<String, TargetReport>,
    ) {
        for descendant in graph.descendants(failed) {
            if reports.contains_key(&descendant) {
                continue;
            }
            let cause = FailureCause::Upstream(failed.to_string());
            self.reporter.report(&TargetEvent::Failed {
                name: descendant.clone(),
                duration: Duration::ZERO,
                error: cause.to_string(),
            });
            reports.insert(
                descendant.clone(),
                TargetReport {
                    name: descendant,
                    stale: true,
                    reason: None,
                    duration_ms: 0,
                    status: TargetStatus::Failed { cause },
                },
            );
        }
    }
}

/// Unblock the dependents of a target that completed successfully
fn release(
    graph: &TargetGraph,
    name: &str,
    position: &HashMap<&str, usize>,
    waiting: &mut HashMap<&str, usize>,
    ready: &mut BTreeSet<usize>,
) {
    for dependent in graph.dependents(name) {
        if let Some(count) = waiting.get_mut(dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                if let Some(&pos) = position.get(dependent) {
                    ready.insert(pos);
                }
            }
        }
    }
}
