//! Step executor trait and supporting context types.

use std::collections::HashMap;

use async_trait::async_trait;
use pcore_domain::{AppId, CallerIdentity, StepRunId, WorkflowRunId};
use thiserror::Error;

use crate::cancellation::CancellationToken;
use crate::interpolation::ResourceView;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("execution failed: {0}")]
    Failed(String),

    #[error("step cancelled")]
    Cancelled,
}

/// Outputs a step leaves behind for later steps via
/// `${steps.<name>.outputs.<key>}`.
pub type StepOutputs = HashMap<String, String>;

/// Sink a step executor writes its output to; backed by the `LogStream`.
#[async_trait]
pub trait StepLogWriter: Send + Sync {
    async fn write(&self, bytes: &[u8]);
}

/// Everything a `StepExecutor` needs to do its job, fully resolved by the
/// engine before the executor ever runs: no executor resolves interpolation
/// expressions or reads the `Store` itself.
pub struct StepContext<'a> {
    pub app_id: AppId,
    pub workflow_run_id: WorkflowRunId,
    pub step_run_id: StepRunId,
    pub step_name: &'a str,
    /// Step config with every `${...}` expression already resolved.
    pub config: serde_json::Value,
    pub resources: &'a HashMap<String, ResourceView>,
    pub prior_outputs: &'a HashMap<String, StepOutputs>,
    pub caller: &'a CallerIdentity,
    pub log: &'a dyn StepLogWriter,
    pub cancellation: CancellationToken,
}

/// An executor handles exactly one step type and is idempotent: executing
/// the same resolved config twice must be safe, since a crash between
/// "step succeeded" and "run transitioned" can replay it.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutputs, ExecutorError>;

    fn step_type(&self) -> &'static str;
}
