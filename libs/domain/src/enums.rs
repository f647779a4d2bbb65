//! Status and classification enums for the domain model.
//!
//! These enums are the source of truth for every state machine the core
//! drives and must match the SQL enum types used by `pcore-store` exactly.

use serde::{Deserialize, Serialize};

/// Lifecycle of a persisted [`crate::Resource`].
///
/// ```text
/// requested → provisioning → active → {deprovisioning, degraded, failed}
///                            ↑                           │
///                            └──────── reconcile ────────┘
/// terminal: terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Requested,
    Provisioning,
    Active,
    Deprovisioning,
    Degraded,
    Failed,
    Terminated,
}

impl ResourceState {
    /// Whether this state has no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Guards the resource lifecycle's legal state transitions.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        use ResourceState::{
            Active, Degraded, Deprovisioning, Failed, Provisioning, Requested, Terminated,
        };
        matches!(
            (self, target),
            (Requested, Provisioning)
                | (Provisioning, Active)
                | (Provisioning, Failed)
                | (Active, Deprovisioning)
                | (Active, Degraded)
                | (Active, Failed)
                | (Degraded, Active)
                | (Degraded, Deprovisioning)
                | (Degraded, Failed)
                | (Failed, Requested)
                | (Deprovisioning, Terminated)
        )
    }
}

/// Status machine of a [`crate::WorkflowRun`]: `pending → running → {succeeded, failed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowRunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        use WorkflowRunStatus::{Cancelled, Failed, Pending, Running, Succeeded};
        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Status machine of a [`crate::StepRun`]: `pending → running → {succeeded, failed, skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepRunStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        use StepRunStatus::{Failed, Pending, Running, Skipped, Succeeded};
        matches!(
            (self, target),
            // retry re-enters running with a bumped attempt count
            (Pending, Running) | (Running, Running) | (Running, Succeeded) | (Running, Failed)
                | (Pending, Skipped)
                | (Failed, Skipped)
        )
    }
}

/// What triggered a [`crate::WorkflowRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    Reconciler,
    Goldenpath,
    Manual,
}

/// `GraphNode.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNodeType {
    Spec,
    Workflow,
    Step,
    Resource,
}

/// `GraphEdge.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphEdgeType {
    Contains,
    DependsOn,
    Provisions,
    Produces,
    Binds,
}

/// `onFailure` routing for a [`crate::StepDecl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action", content = "target")]
pub enum OnFailureAction {
    FailWorkflow,
    Continue,
    RunStep(String),
}

impl Default for OnFailureAction {
    fn default() -> Self {
        Self::FailWorkflow
    }
}

/// `kind` of a provider manifest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ManifestKind {
    Platform,
    Provider,
}

/// `category` of a workflow listed in a provider manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowCategory {
    Provisioner,
    Goldenpath,
}

/// Typed kind of a golden-path or workflow parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Int,
    Bool,
    Duration,
    Enum,
}

/// Environment kind declared in a Spec's `environment` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    Ephemeral,
    Dev,
    Staging,
    Production,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_state_requested_cannot_skip_to_active() {
        assert!(!ResourceState::Requested.can_transition_to(ResourceState::Active));
        assert!(ResourceState::Requested.can_transition_to(ResourceState::Provisioning));
    }

    #[test]
    fn resource_state_terminated_is_terminal() {
        assert!(ResourceState::Terminated.is_terminal());
        assert!(!ResourceState::Terminated.can_transition_to(ResourceState::Requested));
    }

    #[test]
    fn workflow_run_status_no_transition_out_of_terminal() {
        for terminal in [
            WorkflowRunStatus::Succeeded,
            WorkflowRunStatus::Failed,
            WorkflowRunStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(WorkflowRunStatus::Running));
        }
    }

    #[test]
    fn step_run_status_retry_reenters_running() {
        assert!(StepRunStatus::Running.can_transition_to(StepRunStatus::Running));
    }

    #[test]
    fn on_failure_default_is_fail_workflow() {
        assert_eq!(OnFailureAction::default(), OnFailureAction::FailWorkflow);
    }
}
