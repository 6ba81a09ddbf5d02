//! Target types and definitions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use cinder_core::config::Trigger;

use crate::command::Command;

/// A named, cacheable computation step
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique target name
    pub name: String,
    /// Command producing the target's result
    pub command: Arc<dyn Command>,
    /// Upstream targets whose results this target reads
    pub depends_on: Vec<String>,
    /// Declared external files (or glob patterns) read by the command
    pub reads: Vec<String>,
    /// Declared external files written by the command
    pub writes: Vec<String>,
    /// When the target is considered stale
    pub trigger: Trigger,
}

impl Target {
    /// Create a new target. Files the command always reads start out as
    /// declared reads.
    pub fn new(name: impl Into<String>, command: Arc<dyn Command>) -> Self {
        let reads = command.implicit_reads();
        Self {
            name: name.into(),
            command,
            depends_on: Vec::new(),
            reads,
            writes: Vec::new(),
            trigger: Trigger::default(),
        }
    }

    /// Add an upstream dependency
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
        self
    }

    /// Add a declared file read
    pub fn with_read(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !self.reads.contains(&path) {
            self.reads.push(path);
        }
        self
    }

    /// Add a declared file write
    pub fn with_write(mut self, path: impl Into<String>) -> Self {
        self.writes.push(path.into());
        self
    }

    /// Set the trigger policy
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Resolve declared reads against `root`, expanding glob patterns
    pub fn resolved_reads(&self, root: &Path) -> Vec<DeclaredFile> {
        resolve_files(root, &self.reads)
    }

    /// Resolve declared writes against `root`
    pub fn resolved_writes(&self, root: &Path) -> Vec<DeclaredFile> {
        resolve_files(root, &self.writes)
    }
}

/// A declared file after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFile {
    /// Path as shown in fingerprints (relative to the plan root when possible)
    pub display: String,
    /// Absolute path
    pub path: PathBuf,
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand declared file entries. Plain paths are kept even when missing so
/// that their absence is part of the fingerprint; glob matches are sorted.
pub fn resolve_files(root: &Path, entries: &[String]) -> Vec<DeclaredFile> {
    let mut files = Vec::new();

    for entry in entries {
        if !is_glob(entry) {
            files.push(DeclaredFile {
                display: entry.clone(),
                path: root.join(entry),
            });
            continue;
        }

        let full_pattern = root.join(entry).to_string_lossy().to_string();
        let mut matched: Vec<PathBuf> = match glob::glob(&full_pattern) {
            Ok(paths) => paths.flatten().filter(|p| p.is_file()).collect(),
            Err(e) => {
                tracing::warn!(pattern = %entry, error = %e, "invalid glob pattern in declared files");
                Vec::new()
            }
        };
        matched.sort();

        for path in matched {
            let display = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            files.push(DeclaredFile { display, path });
        }
    }

    files
}

/// Everything a command sees when it runs
#[derive(Debug, Clone, Default)]
pub struct TargetInputs {
    /// Name of the target being built
    pub target: String,
    /// Results of upstream targets, by name
    pub upstream: BTreeMap<String, Value>,
    /// Resolved declared reads
    pub reads: Vec<PathBuf>,
    /// Resolved declared writes
    pub writes: Vec<PathBuf>,
    /// Directory relative paths resolve against
    pub root_dir: PathBuf,
}

impl TargetInputs {
    /// Get an upstream result by target name
    pub fn upstream(&self, name: &str) -> Option<&Value> {
        self.upstream.get(name)
    }
}
