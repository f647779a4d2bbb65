//! The `Store` trait: sole authority for persisted state.
//!
//! Every transition takes the expected current state and fails with
//! `StoreError::StateConflict` if it has already moved; `claim_resource_for_provisioning`
//! is the one atomic compare-and-set the reconciler and manual triggers both
//! rely on to prevent double provisioning.

use async_trait::async_trait;

use pcore_domain::{
    App, AppId, GraphEdge, GraphEdgeType, GraphNode, GraphNodeType, PropertyMap, Resource, ResourceId,
    ResourceState, Spec, SpecId, StepRun, StepRunId, StepRunStatus, WorkflowRun, WorkflowRunId,
    WorkflowRunStatus,
};

use crate::errors::StoreError;

/// A transaction handle. Concrete stores decide what this wraps (a SQL
/// transaction for `PgStore`, a no-op guard for `InMemoryStore`); callers
/// only ever pass it back to `commit`/`rollback`.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn create_app(&self, app_name: &str) -> Result<App, StoreError>;
    async fn get_app(&self, id: AppId) -> Result<App, StoreError>;
    async fn get_app_by_name(&self, app_name: &str) -> Result<Option<App>, StoreError>;
    /// Every App with a current Spec, for the reconciler's per-App sweep.
    async fn list_apps(&self) -> Result<Vec<App>, StoreError>;

    /// Persists a new Spec revision and updates the App's `latest_spec_id`.
    async fn upsert_spec(&self, spec: Spec) -> Result<SpecId, StoreError>;
    async fn get_latest_spec(&self, app_id: AppId) -> Result<Spec, StoreError>;

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError>;

    async fn get_resource(&self, id: ResourceId) -> Result<Resource, StoreError>;

    /// Optimistic transition: fails with `StateConflict` if the resource's
    /// current state is not `expected`.
    async fn transition_resource(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
    ) -> Result<Resource, StoreError>;

    /// Atomic CAS of `state=requested ∧ current_workflow_run_id=None` →
    /// `state=provisioning ∧ current_workflow_run_id=Some(run_id)`. The
    /// linchpin preventing double provisioning across reconciler ticks and
    /// manual triggers. Idempotent: applying it twice for the same
    /// `(resource_id, run_id)` succeeds once and is a no-op thereafter.
    async fn claim_resource_for_provisioning(
        &self,
        resource_id: ResourceId,
        run_id: WorkflowRunId,
    ) -> Result<bool, StoreError>;

    /// Terminal half of the provisioning lifecycle `claim_resource_for_provisioning`
    /// opens: moves `state=expected` to `new_state`, merges `outputs` into the
    /// resource's recorded outputs, and clears `current_workflow_run_id`.
    /// Fails with `StateConflict` if the resource already moved past `expected`.
    async fn complete_resource_provisioning(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
        outputs: PropertyMap,
    ) -> Result<Resource, StoreError>;

    async fn list_resources_for_app(&self, app_id: AppId) -> Result<Vec<Resource>, StoreError>;
    async fn list_pending_resources(&self) -> Result<Vec<Resource>, StoreError>;

    /// Records that a health check ran (or was skipped) for `id` at `checked_at`,
    /// without touching `state`. Used by the reconciler's health-check sweep.
    async fn touch_resource_health_check(
        &self,
        id: ResourceId,
        checked_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError>;

    async fn create_workflow_run(&self, run: WorkflowRun) -> Result<WorkflowRun, StoreError>;
    async fn get_workflow_run(&self, id: WorkflowRunId) -> Result<WorkflowRun, StoreError>;

    async fn transition_workflow_run(
        &self,
        id: WorkflowRunId,
        expected: WorkflowRunStatus,
        new_status: WorkflowRunStatus,
        error_message: Option<String>,
    ) -> Result<WorkflowRun, StoreError>;

    async fn list_active_runs(&self) -> Result<Vec<WorkflowRun>, StoreError>;

    async fn create_step_run(&self, step: StepRun) -> Result<StepRun, StoreError>;
    async fn get_step_run(&self, id: StepRunId) -> Result<StepRun, StoreError>;
    async fn list_step_runs(&self, workflow_run_id: WorkflowRunId) -> Result<Vec<StepRun>, StoreError>;

    async fn transition_step_run(
        &self,
        id: StepRunId,
        expected: StepRunStatus,
        new_status: StepRunStatus,
        update: StepRunTransition,
    ) -> Result<StepRun, StoreError>;

    async fn append_log(&self, step_run_id: StepRunId, bytes: &[u8]) -> Result<(), StoreError>;
    async fn read_log(&self, step_run_id: StepRunId, from_offset: usize) -> Result<Vec<u8>, StoreError>;

    async fn add_graph_node(&self, node: GraphNode) -> Result<GraphNode, StoreError>;
    async fn update_graph_node_state(&self, id: pcore_domain::GraphNodeId, state: String) -> Result<(), StoreError>;
    async fn add_graph_edge(&self, edge: GraphEdge) -> Result<GraphEdge, StoreError>;
    async fn get_graph_nodes(&self, app_id: AppId, node_type: Option<GraphNodeType>) -> Result<Vec<GraphNode>, StoreError>;
    async fn get_graph_edges(&self, app_id: AppId, edge_type: Option<GraphEdgeType>) -> Result<Vec<GraphEdge>, StoreError>;

    /// Row-level compare-and-set lease for the single-writer reconciler
    ///. Returns `true` if the caller now holds the lease.
    async fn try_acquire_reconciler_lease(&self, holder: &str, ttl_secs: i64) -> Result<bool, StoreError>;
}

/// Fields updated alongside a [`StepRun`] status transition.
#[derive(Debug, Clone, Default)]
pub struct StepRunTransition {
    pub attempts: Option<u32>,
    pub error_message: Option<String>,
    pub outputs: Option<std::collections::HashMap<String, String>>,
    pub duration_ms: Option<i64>,
}
