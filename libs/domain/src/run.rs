//! WorkflowRun and StepRun: persistent execution records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{StepRunStatus, WorkflowRunStatus, WorkflowTrigger};
use crate::ids::{AppId, ResourceId, StepRunId, WorkflowRunId};

/// One execution of a [`crate::WorkflowDecl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: WorkflowRunId,
    pub app_id: AppId,
    pub workflow_name: String,
    pub trigger: WorkflowTrigger,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub status: WorkflowRunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_steps: u32,
    /// The Resource this run provisions, when it's a reconciler-triggered
    /// provisioning run. `None` for golden-path and inline-workflow runs
    /// that aren't scoped to exactly one Resource.
    pub resource_id: Option<ResourceId>,
}

impl WorkflowRun {
    #[must_use]
    pub fn new(
        app_id: AppId,
        workflow_name: String,
        trigger: WorkflowTrigger,
        parameters: serde_json::Map<String, serde_json::Value>,
        total_steps: u32,
        resource_id: Option<ResourceId>,
    ) -> Self {
        Self {
            id: WorkflowRunId::new(),
            app_id,
            workflow_name,
            trigger,
            parameters,
            status: WorkflowRunStatus::Pending,
            started_at: None,
            completed_at: None,
            error_message: None,
            total_steps,
            resource_id,
        }
    }
}

/// One execution of a [`crate::StepDecl`] within a [`WorkflowRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub workflow_run_id: WorkflowRunId,
    pub step_name: String,
    /// Position within the run's declaration order.
    pub index: u32,
    pub step_type: String,
    pub config: serde_json::Value,
    pub status: StepRunStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    /// Visible to later steps via `${steps.<name>.outputs.<key>}`.
    pub outputs: HashMap<String, String>,
    /// Opaque handle into the LogStream's backing store.
    pub log_ref: String,
}

impl StepRun {
    #[must_use]
    pub fn pending(
        workflow_run_id: WorkflowRunId,
        step_name: String,
        index: u32,
        step_type: String,
        config: serde_json::Value,
    ) -> Self {
        let log_ref = format!("{workflow_run_id}/{step_name}");
        Self {
            id: StepRunId::new(),
            workflow_run_id,
            step_name,
            index,
            step_type,
            config,
            status: StepRunStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            outputs: HashMap::new(),
            log_ref,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workflow_run_starts_pending() {
        let run = WorkflowRun::new(
            AppId::new(),
            "provision-postgres".to_string(),
            WorkflowTrigger::Reconciler,
            serde_json::Map::new(),
            1,
            None,
        );
        assert_eq!(run.status, WorkflowRunStatus::Pending);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn pending_step_run_has_zero_attempts() {
        let step = StepRun::pending(
            WorkflowRunId::new(),
            "provision".to_string(),
            0,
            "terraform".to_string(),
            serde_json::Value::Null,
        );
        assert_eq!(step.attempts, 0);
        assert_eq!(step.status, StepRunStatus::Pending);
    }
}
