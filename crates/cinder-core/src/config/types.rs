//! Configuration types

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root plan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Fingerprint and result cache configuration
    pub cache: CacheConfig,

    /// Target declarations, in declaration order
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Resolve the cache directory against the directory holding the plan
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        if self.cache.dir.is_absolute() {
            self.cache.dir.clone()
        } else {
            root.join(&self.cache.dir)
        }
    }

    /// Look up a target declaration by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of targets executing at once (1 = sequential)
    pub concurrency: usize,

    /// Keep dispatching independent targets after a failure
    pub keep_going: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            keep_going: true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether fingerprints and results persist across runs
    pub enabled: bool,

    /// Cache directory
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cinder/cache"),
        }
    }
}

/// A target declaration in the plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique target name
    pub name: String,

    /// Command producing the target's result
    pub command: CommandConfig,

    /// Upstream targets whose results this target reads
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// External files (or glob patterns) this target reads
    #[serde(default)]
    pub reads: Vec<String>,

    /// External files this target writes
    #[serde(default)]
    pub writes: Vec<String>,

    /// When the target is considered stale
    #[serde(default)]
    pub trigger: Trigger,
}

impl TargetConfig {
    /// Create a target declaration with the given command
    pub fn new(name: impl Into<String>, command: CommandConfig) -> Self {
        Self {
            name: name.into(),
            command,
            depends_on: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            trigger: Trigger::default(),
        }
    }

    /// Add an upstream dependency
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Add a declared file read
    pub fn with_read(mut self, path: impl Into<String>) -> Self {
        self.reads.push(path.into());
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
}

/// Command declaration: a registered variant `kind` plus its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Registered command variant (e.g. "shell", "value")
    pub kind: String,

    /// Variant-specific parameters
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl CommandConfig {
    /// Create a command declaration of the given kind with no parameters
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Shorthand for a shell command
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("shell").with_param("run", serde_json::Value::String(script.into()))
    }

    /// Set a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// Policy deciding when a target must be re-executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Re-execute when the code or input fingerprint changes
    #[default]
    Fingerprint,
    /// Re-execute on every run
    Always,
    /// Re-execute only when no cached result exists
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.concurrency, 1);
        assert!(config.scheduler.keep_going);
        assert!(config.cache.enabled);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_cache_dir_relative_and_absolute() {
        let mut config = Config::default();
        assert_eq!(
            config.cache_dir(Path::new("/work")),
            PathBuf::from("/work/.cinder/cache")
        );

        config.cache.dir = PathBuf::from("/var/cache/cinder");
        assert_eq!(
            config.cache_dir(Path::new("/work")),
            PathBuf::from("/var/cache/cinder")
        );
    }

    #[test]
    fn test_command_params_flatten_from_yaml() {
        let yaml = "name: train\ncommand:\n  kind: shell\n  run: python train.py\ndepends_on: [prepare]\ntrigger: always\n";
        let target: TargetConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(target.command.kind, "shell");
        assert_eq!(target.command.param_str("run"), Some("python train.py"));
        assert_eq!(target.depends_on, vec!["prepare"]);
        assert_eq!(target.trigger, Trigger::Always);
        assert!(target.reads.is_empty());
    }

    #[test]
    fn test_target_builder() {
        let target = TargetConfig::new("report", CommandConfig::new("collect"))
            .with_depends_on("train")
            .with_read("data/churn.csv")
            .with_write("out/report.json")
            .with_trigger(Trigger::Missing);

        assert_eq!(target.depends_on, vec!["train"]);
        assert_eq!(target.reads, vec!["data/churn.csv"]);
        assert_eq!(target.writes, vec!["out/report.json"]);
        assert_eq!(target.trigger, Trigger::Missing);
    }
}
