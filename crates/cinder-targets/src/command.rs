//! Typed commands and the registry of command variants
//!
//! A target's computation is a [`Command`]: it describes itself through
//! [`Command::definition`] (which feeds the code identity) and produces a JSON
//! result from its resolved inputs. Plan files pick a variant by `kind`; the
//! [`CommandRegistry`] maps kinds to constructors.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command as Process;
use tracing::debug;

use cinder_core::config::CommandConfig;

use crate::target::TargetInputs;

/// A polymorphic target computation
#[async_trait]
pub trait Command: fmt::Debug + Send + Sync {
    /// Registered variant name (e.g. "shell")
    fn kind(&self) -> &str;

    /// Serialisable description of the command; any change to it changes the
    /// target's code identity
    fn definition(&self) -> Value;

    /// Files the command reads regardless of what the plan declares. These
    /// join the target's declared reads so their content feeds its inputs.
    fn implicit_reads(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the target's result
    async fn run(&self, inputs: &TargetInputs) -> Result<Value, CommandError>;
}

/// Errors from building or running commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No variant registered under this kind
    #[error("Unknown command kind '{0}'")]
    UnknownKind(String),

    /// The declaration is missing or has malformed parameters
    #[error("Invalid '{kind}' command: {message}")]
    InvalidDefinition { kind: String, message: String },

    /// Process could not be started
    #[error("Failed to spawn: {0}")]
    Spawn(std::io::Error),

    /// Process exited unsuccessfully
    #[error("Command exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    /// IO error while running the command
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs a script through `sh -c`.
///
/// Upstream results are exported as `CINDER_DEP_<NAME>` (strings verbatim,
/// anything else as JSON).
#[derive(Debug, Clone, PartialEq)]
pub struct ShellCommand {
    /// Script passed to the shell
    pub script: String,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl ShellCommand {
    /// Create a shell command
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            env: BTreeMap::new(),
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn from_config(config: &CommandConfig) -> Result<Self, CommandError> {
        let script = config
            .param_str("run")
            .ok_or_else(|| invalid(config, "missing string parameter 'run'"))?;

        let mut command = Self::new(script);
        if let Some(env) = config.params.get("env") {
            let map = env
                .as_object()
                .ok_or_else(|| invalid(config, "'env' must be a map of strings"))?;
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                command.env.insert(key.clone(), value);
            }
        }
        Ok(command)
    }
}

/// Environment variable name under which an upstream result is exported
pub fn dependency_env_var(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CINDER_DEP_{}", suffix)
}

#[async_trait]
impl Command for ShellCommand {
    fn kind(&self) -> &str {
        "shell"
    }

    fn definition(&self) -> Value {
        json!({ "run": self.script, "env": self.env })
    }

    async fn run(&self, inputs: &TargetInputs) -> Result<Value, CommandError> {
        debug!(target_name = %inputs.target, script = %self.script, "running shell command");
        let mut process = Process::new("sh");
        process
            .arg("-c")
            .arg(&self.script)
            .current_dir(&inputs.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("CINDER_TARGET", &inputs.target);

        for (name, value) in &inputs.upstream {
            let exported = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            process.env(dependency_env_var(name), exported);
        }
        for (key, value) in &self.env {
            process.env(key, value);
        }

        let output = process.output().await.map_err(CommandError::Spawn)?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if output.status.success() {
            Ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "status": output.status.code().unwrap_or(0),
            }))
        } else {
            Err(CommandError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

/// Produces a constant value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCommand {
    /// The value produced
    pub value: Value,
}

impl ValueCommand {
    /// Create a constant command
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

#[async_trait]
impl Command for ValueCommand {
    fn kind(&self) -> &str {
        "value"
    }

    fn definition(&self) -> Value {
        json!({ "value": self.value })
    }

    async fn run(&self, _inputs: &TargetInputs) -> Result<Value, CommandError> {
        Ok(self.value.clone())
    }
}

/// Reads a text file relative to the plan root
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCommand {
    /// File path relative to the plan root
    pub path: String,
}

impl ReadCommand {
    /// Create a read command
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Command for ReadCommand {
    fn kind(&self) -> &str {
        "read"
    }

    fn definition(&self) -> Value {
        json!({ "path": self.path })
    }

    fn implicit_reads(&self) -> Vec<String> {
        vec![self.path.clone()]
    }

    async fn run(&self, inputs: &TargetInputs) -> Result<Value, CommandError> {
        let contents = tokio::fs::read_to_string(inputs.root_dir.join(&self.path)).await?;
        Ok(Value::String(contents))
    }
}

/// Gathers upstream results into one object keyed by target name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectCommand;

#[async_trait]
impl Command for CollectCommand {
    fn kind(&self) -> &str {
        "collect"
    }

    fn definition(&self) -> Value {
        json!({})
    }

    async fn run(&self, inputs: &TargetInputs) -> Result<Value, CommandError> {
        let object = inputs
            .upstream
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(Value::Object(object))
    }
}

fn invalid(config: &CommandConfig, message: &str) -> CommandError {
    CommandError::InvalidDefinition {
        kind: config.kind.clone(),
        message: message.to_string(),
    }
}

/// Constructor for a command variant
pub type CommandFactory =
    Box<dyn Fn(&CommandConfig) -> Result<Arc<dyn Command>, CommandError> + Send + Sync>;

/// Registry of command variants available to plan files
pub struct CommandRegistry {
    factories: BTreeMap<String, CommandFactory>,
}

impl CommandRegistry {
    /// Registry with the built-in variants: shell, value, read, collect
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("shell", |config| {
            Ok(Arc::new(ShellCommand::from_config(config)?) as Arc<dyn Command>)
        });
        registry.register("value", |config| {
            let value = config
                .params
                .get("value")
                .cloned()
                .ok_or_else(|| invalid(config, "missing parameter 'value'"))?;
            Ok(Arc::new(ValueCommand::new(value)) as Arc<dyn Command>)
        });
        registry.register("read", |config| {
            let path = config
                .param_str("path")
                .ok_or_else(|| invalid(config, "missing string parameter 'path'"))?;
            Ok(Arc::new(ReadCommand::new(path)) as Arc<dyn Command>)
        });
        registry.register("collect", |_| Ok(Arc::new(CollectCommand) as Arc<dyn Command>));
        registry
    }

    /// Registry with no variants
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) a variant
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&CommandConfig) -> Result<Arc<dyn Command>, CommandError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Build a command from its declaration
    pub fn build(&self, config: &CommandConfig) -> Result<Arc<dyn Command>, CommandError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| CommandError::UnknownKind(config.kind.clone()))?;
        factory(config)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inputs_in(dir: &std::path::Path) -> TargetInputs {
        TargetInputs {
            target: "t".to_string(),
            root_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dependency_env_var() {
        assert_eq!(dependency_env_var("model_1"), "CINDER_DEP_MODEL_1");
        assert_eq!(dependency_env_var("conf.matrix-v2"), "CINDER_DEP_CONF_MATRIX_V2");
    }

    #[test]
    fn test_registry_builtins() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.kinds(), vec!["collect", "read", "shell", "value"]);

        let command = registry.build(&CommandConfig::shell("echo hi")).unwrap();
        assert_eq!(command.kind(), "shell");
        assert_eq!(command.definition()["run"], "echo hi");
    }

    #[test]
    fn test_registry_unknown_kind() {
        let registry = CommandRegistry::new();
        let err = registry.build(&CommandConfig::new("keras")).unwrap_err();
        assert!(matches!(err, CommandError::UnknownKind(ref k) if k == "keras"));
    }

    #[test]
    fn test_registry_invalid_definition() {
        let registry = CommandRegistry::new();
        let err = registry.build(&CommandConfig::new("shell")).unwrap_err();
        assert!(matches!(err, CommandError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_register_custom_variant() {
        let mut registry = CommandRegistry::empty();
        registry.register("answer", |_| {
            Ok(Arc::new(ValueCommand::new(json!(42))) as Arc<dyn Command>)
        });

        let command = registry.build(&CommandConfig::new("answer")).unwrap();
        assert_eq!(command.definition(), json!({ "value": 42 }));
    }

    #[test]
    fn test_shell_env_from_config() {
        let config = CommandConfig::shell("echo $EPOCHS")
            .with_param("env", json!({ "EPOCHS": 35, "OPT": "adam" }));
        let command = ShellCommand::from_config(&config).unwrap();

        assert_eq!(command.env.get("EPOCHS").map(String::as_str), Some("35"));
        assert_eq!(command.env.get("OPT").map(String::as_str), Some("adam"));
    }

    #[tokio::test]
    async fn test_value_and_collect() {
        let temp = TempDir::new().unwrap();
        let mut inputs = inputs_in(temp.path());

        let value = ValueCommand::new(json!([1, 2])).run(&inputs).await.unwrap();
        assert_eq!(value, json!([1, 2]));

        inputs.upstream.insert("a".to_string(), json!(1));
        inputs.upstream.insert("b".to_string(), json!("x"));
        let collected = CollectCommand.run(&inputs).await.unwrap();
        assert_eq!(collected, json!({ "a": 1, "b": "x" }));
    }

    #[tokio::test]
    async fn test_read_command() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("churn.csv"), "id,churn\n1,no\n").unwrap();

        let value = ReadCommand::new("churn.csv")
            .run(&inputs_in(temp.path()))
            .await
            .unwrap();
        assert_eq!(value, Value::String("id,churn\n1,no\n".to_string()));

        let missing = ReadCommand::new("absent.csv")
            .run(&inputs_in(temp.path()))
            .await;
        assert!(matches!(missing, Err(CommandError::Io(_))));
    }

    #[test]
    fn test_implicit_reads() {
        assert_eq!(ReadCommand::new("churn.csv").implicit_reads(), vec!["churn.csv"]);
        assert!(ShellCommand::new("echo hi").implicit_reads().is_empty());
        assert!(CollectCommand.implicit_reads().is_empty());
    }

    #[tokio::test]
    async fn test_shell_command_success_and_env() {
        let temp = TempDir::new().unwrap();
        let mut inputs = inputs_in(temp.path());
        inputs
            .upstream
            .insert("recipe".to_string(), Value::String("scaled".to_string()));

        let command =
            ShellCommand::new("echo \"$CINDER_DEP_RECIPE $MODE\"").with_env("MODE", "fit");
        let result = command.run(&inputs).await.unwrap();

        assert_eq!(result["stdout"], "scaled fit");
        assert_eq!(result["status"], 0);
    }

    #[tokio::test]
    async fn test_shell_command_failure() {
        let temp = TempDir::new().unwrap();
        let command = ShellCommand::new("echo boom >&2; exit 3");

        let err = command.run(&inputs_in(temp.path())).await.unwrap_err();
        match err {
            CommandError::Exit { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected exit error, got {other:?}"),
        }
    }
}
