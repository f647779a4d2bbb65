//! Workflow and step declarations: the manifest shape the engine
//! interprets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enums::{OnFailureAction, ParameterType};

/// Default per-step timeout: 30 minutes.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30 * 60;
/// Workflow-level max timeout: 60 minutes.
pub const MAX_WORKFLOW_TIMEOUT_SECS: u64 = 60 * 60;
/// Default per-workflow parallelism cap.
pub const DEFAULT_PARALLELISM_CAP: usize = 8;

/// The manifest the engine interprets to drive a `WorkflowRun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDecl {
    pub name: String,
    pub steps: Vec<StepDecl>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSchema>,
    /// Workflow-level timeout in seconds; capped at `MAX_WORKFLOW_TIMEOUT_SECS`.
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// One step in a [`WorkflowDecl`]. `name` is unique within the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Explicit dependencies. An empty list means "depends on the previous
    /// step in declaration order" unless this step shares a `parallel_group`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub parallel_group: Option<String>,
    pub retry: Option<RetryPolicy>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub on_failure: OnFailureAction,
}

/// Exponential backoff retry policy for a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Initial backoff in seconds. Default 2s.
    #[serde(default = "RetryPolicy::default_initial_secs")]
    pub initial_secs: u64,
    /// Backoff multiplier. Default 2.0.
    #[serde(default = "RetryPolicy::default_factor")]
    pub factor: f64,
    /// Backoff ceiling in seconds. Default 60s.
    #[serde(default = "RetryPolicy::default_max_secs")]
    pub max_secs: u64,
}

impl RetryPolicy {
    const fn default_initial_secs() -> u64 {
        2
    }

    const fn default_factor() -> f64 {
        2.0
    }

    const fn default_max_secs() -> u64 {
        60
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            initial_secs: Self::default_initial_secs(),
            factor: Self::default_factor(),
            max_secs: Self::default_max_secs(),
        }
    }
}

/// Typed parameter schema entry, shared by inline workflow parameters and
/// golden-path parameter schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
    #[serde(rename = "allowedValues")]
    pub allowed_values: Option<Vec<serde_json::Value>>,
    pub pattern: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decl_defaults_on_failure_to_fail_workflow() {
        let json = serde_json::json!({"name": "s1", "type": "wait"});
        let step: StepDecl = serde_json::from_value(json).unwrap();
        assert_eq!(step.on_failure, OnFailureAction::FailWorkflow);
    }
}
