//! Step executors: the contract every infrastructure action satisfies, a
//! set of built-in stand-ins, and the registry the engine dispatches
//! through.

pub mod builtins;
pub mod registry;
pub mod traits;

pub use registry::ExecutorRegistry;
pub use traits::{ExecutorError, StepContext, StepExecutor, StepLogWriter, StepOutputs};

pub(crate) fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::collections::HashMap;

    use pcore_domain::{AppId, CallerIdentity, StepRunId, WorkflowRunId};

    use crate::cancellation::cancellation_pair;
    use crate::interpolation::ResourceView;

    use super::traits::{StepContext, StepLogWriter};

    pub struct NoopLogWriter;

    #[async_trait]
    impl StepLogWriter for NoopLogWriter {
        async fn write(&self, _bytes: &[u8]) {}
    }

    pub fn noop_context<'a>(config: serde_json::Value, log: &'a NoopLogWriter) -> StepContext<'a> {
        static RESOURCES: std::sync::OnceLock<HashMap<String, ResourceView>> = std::sync::OnceLock::new();
        static PRIOR: std::sync::OnceLock<HashMap<String, super::StepOutputs>> = std::sync::OnceLock::new();
        static CALLER: std::sync::OnceLock<CallerIdentity> = std::sync::OnceLock::new();

        let (_handle, token) = cancellation_pair();
        StepContext {
            app_id: AppId::new(),
            workflow_run_id: WorkflowRunId::new(),
            step_run_id: StepRunId::new(),
            step_name: "test-step",
            config,
            resources: RESOURCES.get_or_init(HashMap::new),
            prior_outputs: PRIOR.get_or_init(HashMap::new),
            caller: CALLER.get_or_init(CallerIdentity::system),
            log,
            cancellation: token,
        }
    }
}
