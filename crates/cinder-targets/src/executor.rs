//! Executors: the caller-supplied step that turns a stale target into a result

use async_trait::async_trait;
use serde_json::Value;

use crate::target::{Target, TargetInputs};

/// Arbitrary caller-defined failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Performs a target's computation
#[async_trait]
pub trait Executor: Send + Sync {
    /// Produce a result for `target` from its resolved inputs
    async fn execute(&self, target: &Target, inputs: &TargetInputs) -> Result<Value, BoxError>;
}

/// Runs each target's own [`Command`](crate::command::Command)
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExecutor;

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(&self, target: &Target, inputs: &TargetInputs) -> Result<Value, BoxError> {
        target.command.run(inputs).await.map_err(Into::into)
    }
}

/// Adapts a synchronous closure into an executor
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&Target, &TargetInputs) -> Result<Value, BoxError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Executor for FnExecutor<F>
where
    F: Fn(&Target, &TargetInputs) -> Result<Value, BoxError> + Send + Sync,
{
    async fn execute(&self, target: &Target, inputs: &TargetInputs) -> Result<Value, BoxError> {
        (self.f)(target, inputs)
    }
}
