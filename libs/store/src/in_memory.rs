//! In-memory `Store` implementation, used by engine/scheduler/reconciler
//! tests so they don't need a live Postgres instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use pcore_domain::{
    App, AppId, GraphEdge, GraphEdgeId, GraphEdgeType, GraphNode, GraphNodeId, GraphNodeType,
    Resource, ResourceId, ResourceState, Spec, SpecId, StepRun, StepRunId, StepRunStatus,
    WorkflowRun, WorkflowRunId, WorkflowRunStatus,
};

use crate::errors::StoreError;
use crate::traits::{Store, StepRunTransition, Transaction};

#[derive(Default)]
struct Inner {
    apps: HashMap<AppId, App>,
    apps_by_name: HashMap<String, AppId>,
    specs: HashMap<SpecId, Spec>,
    latest_spec_by_app: HashMap<AppId, SpecId>,
    resources: HashMap<ResourceId, Resource>,
    runs: HashMap<WorkflowRunId, WorkflowRun>,
    steps: HashMap<StepRunId, StepRun>,
    steps_by_run: HashMap<WorkflowRunId, Vec<StepRunId>>,
    logs: HashMap<StepRunId, Vec<u8>>,
    nodes: HashMap<GraphNodeId, GraphNode>,
    edges: HashMap<GraphEdgeId, GraphEdge>,
    reconciler_lease: Option<(String, chrono::DateTime<Utc>)>,
}

/// A no-op transaction guard; the in-memory store has no rollback log, so
/// `begin_tx` exists only to satisfy the trait for code shared with `PgStore`.
struct NoopTransaction;

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(NoopTransaction))
    }

    async fn create_app(&self, app_name: &str) -> Result<App, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.apps_by_name.contains_key(app_name) {
            return Err(StoreError::Duplicate(format!("app {app_name}")));
        }
        let now = Utc::now();
        let app = App {
            id: AppId::new(),
            app_name: app_name.to_string(),
            latest_spec_id: SpecId::new(),
            created_at: now,
            updated_at: now,
        };
        inner.apps_by_name.insert(app_name.to_string(), app.id);
        inner.apps.insert(app.id, app.clone());
        Ok(app)
    }

    async fn get_app(&self, id: AppId) -> Result<App, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .apps
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("app {id}")))
    }

    async fn get_app_by_name(&self, app_name: &str) -> Result<Option<App>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .apps_by_name
            .get(app_name)
            .and_then(|id| inner.apps.get(id))
            .cloned())
    }

    async fn list_apps(&self) -> Result<Vec<App>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.apps.values().cloned().collect())
    }

    async fn upsert_spec(&self, spec: Spec) -> Result<SpecId, StoreError> {
        let mut inner = self.inner.lock().await;
        let spec_id = spec.id;
        let app_id = spec.app_id;
        inner.specs.insert(spec_id, spec);
        inner.latest_spec_by_app.insert(app_id, spec_id);
        if let Some(app) = inner.apps.get_mut(&app_id) {
            app.latest_spec_id = spec_id;
            app.updated_at = Utc::now();
        }
        Ok(spec_id)
    }

    async fn get_latest_spec(&self, app_id: AppId) -> Result<Spec, StoreError> {
        let inner = self.inner.lock().await;
        let spec_id = inner
            .latest_spec_by_app
            .get(&app_id)
            .ok_or_else(|| StoreError::NotFound(format!("spec for app {app_id}")))?;
        inner
            .specs
            .get(spec_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("spec {spec_id}")))
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner
            .resources
            .values()
            .any(|r| r.app_id == resource.app_id && r.name == resource.name)
        {
            return Err(StoreError::Duplicate(format!("resource {}", resource.name)));
        }
        inner.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .resources
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))
    }

    async fn transition_resource(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
    ) -> Result<Resource, StoreError> {
        let mut inner = self.inner.lock().await;
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        if resource.state != expected {
            return Err(StoreError::StateConflict {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", resource.state),
            });
        }
        resource.state = new_state;
        resource.updated_at = Utc::now();
        Ok(resource.clone())
    }

    async fn claim_resource_for_provisioning(
        &self,
        resource_id: ResourceId,
        run_id: WorkflowRunId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let resource = inner
            .resources
            .get_mut(&resource_id)
            .ok_or_else(|| StoreError::NotFound(format!("resource {resource_id}")))?;

        if resource.current_workflow_run_id == Some(run_id)
            && resource.state == ResourceState::Provisioning
        {
            return Ok(false); // already claimed by this exact run, idempotent no-op
        }

        if resource.state != ResourceState::Requested || resource.current_workflow_run_id.is_some() {
            return Ok(false);
        }

        resource.state = ResourceState::Provisioning;
        resource.current_workflow_run_id = Some(run_id);
        resource.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_resource_provisioning(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
        outputs: pcore_domain::PropertyMap,
    ) -> Result<Resource, StoreError> {
        let mut inner = self.inner.lock().await;
        let resource = inner
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        if resource.state != expected {
            return Err(StoreError::StateConflict {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", resource.state),
            });
        }
        resource.state = new_state;
        resource.outputs.extend(outputs);
        resource.current_workflow_run_id = None;
        resource.updated_at = Utc::now();
        Ok(resource.clone())
    }

    async fn list_resources_for_app(&self, app_id: AppId) -> Result<Vec<Resource>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .resources
            .values()
            .filter(|r| r.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn list_pending_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .resources
            .values()
            .filter(|r| r.state == ResourceState::Requested)
            .cloned()
            .collect())
    }

    async fn touch_resource_health_check(
        &self,
        id: ResourceId,
        checked_at: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let resource = inner.resources.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        resource.health_checked_at = Some(checked_at);
        Ok(())
    }

    async fn create_workflow_run(&self, run: WorkflowRun) -> Result<WorkflowRun, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_workflow_run(&self, id: WorkflowRunId) -> Result<WorkflowRun, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
    }

    async fn transition_workflow_run(
        &self,
        id: WorkflowRunId,
        expected: WorkflowRunStatus,
        new_status: WorkflowRunStatus,
        error_message: Option<String>,
    ) -> Result<WorkflowRun, StoreError> {
        let mut inner = self.inner.lock().await;
        let run = inner
            .runs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        if run.status != expected {
            return Err(StoreError::StateConflict {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", run.status),
            });
        }
        let now = Utc::now();
        if run.status == WorkflowRunStatus::Pending && new_status == WorkflowRunStatus::Running {
            run.started_at = Some(now);
        }
        if new_status.is_terminal() {
            run.completed_at = Some(now);
        }
        run.status = new_status;
        if error_message.is_some() {
            run.error_message = error_message;
        }
        Ok(run.clone())
    }

    async fn list_active_runs(&self) -> Result<Vec<WorkflowRun>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .runs
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn create_step_run(&self, step: StepRun) -> Result<StepRun, StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .steps_by_run
            .entry(step.workflow_run_id)
            .or_default()
            .push(step.id);
        inner.steps.insert(step.id, step.clone());
        Ok(step)
    }

    async fn get_step_run(&self, id: StepRunId) -> Result<StepRun, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .steps
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("step {id}")))
    }

    async fn list_step_runs(&self, workflow_run_id: WorkflowRunId) -> Result<Vec<StepRun>, StoreError> {
        let inner = self.inner.lock().await;
        let ids = inner.steps_by_run.get(&workflow_run_id).cloned().unwrap_or_default();
        let mut steps: Vec<StepRun> = ids.iter().filter_map(|id| inner.steps.get(id).cloned()).collect();
        steps.sort_by_key(|s| s.index);
        Ok(steps)
    }

    async fn transition_step_run(
        &self,
        id: StepRunId,
        expected: StepRunStatus,
        new_status: StepRunStatus,
        update: StepRunTransition,
    ) -> Result<StepRun, StoreError> {
        let mut inner = self.inner.lock().await;
        let step = inner
            .steps
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("step {id}")))?;
        if step.status != expected {
            return Err(StoreError::StateConflict {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", step.status),
            });
        }
        let now = Utc::now();
        if step.status == StepRunStatus::Pending && new_status == StepRunStatus::Running {
            step.started_at = Some(now);
        }
        if new_status.is_terminal() {
            step.completed_at = Some(now);
        }
        step.status = new_status;
        if let Some(attempts) = update.attempts {
            step.attempts = attempts;
        }
        if let Some(outputs) = update.outputs {
            step.outputs = outputs;
        }
        if update.error_message.is_some() {
            step.error_message = update.error_message;
        }
        if let Some(duration_ms) = update.duration_ms {
            step.duration_ms = Some(duration_ms);
        }
        Ok(step.clone())
    }

    async fn append_log(&self, step_run_id: StepRunId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.logs.entry(step_run_id).or_default().extend_from_slice(bytes);
        Ok(())
    }

    async fn read_log(&self, step_run_id: StepRunId, from_offset: usize) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .get(&step_run_id)
            .map(|buf| buf.get(from_offset..).unwrap_or_default().to_vec())
            .unwrap_or_default())
    }

    async fn add_graph_node(&self, node: GraphNode) -> Result<GraphNode, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update_graph_node_state(&self, id: GraphNodeId, state: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("graph node {id}")))?;
        node.state = state;
        Ok(())
    }

    async fn add_graph_edge(&self, edge: GraphEdge) -> Result<GraphEdge, StoreError> {
        let mut inner = self.inner.lock().await;
        if edge.from == edge.to {
            return Err(StoreError::Duplicate("self-edge rejected".to_string()));
        }
        inner.edges.insert(edge.id, edge.clone());
        Ok(edge)
    }

    async fn get_graph_nodes(
        &self,
        app_id: AppId,
        node_type: Option<GraphNodeType>,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .nodes
            .values()
            .filter(|n| n.app_id == app_id)
            .filter(|n| node_type.map_or(true, |t| n.node_type == t))
            .cloned()
            .collect())
    }

    async fn get_graph_edges(
        &self,
        app_id: AppId,
        edge_type: Option<GraphEdgeType>,
    ) -> Result<Vec<GraphEdge>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .edges
            .values()
            .filter(|e| e.app_id == app_id)
            .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
            .cloned()
            .collect())
    }

    async fn try_acquire_reconciler_lease(&self, holder: &str, ttl_secs: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let expired = inner
            .reconciler_lease
            .as_ref()
            .map_or(true, |(_, expires_at)| *expires_at <= now);
        if expired || inner.reconciler_lease.as_ref().is_some_and(|(h, _)| h == holder) {
            inner.reconciler_lease = Some((holder.to_string(), now + chrono::Duration::seconds(ttl_secs)));
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_domain::PropertyMap;

    #[tokio::test]
    async fn claim_resource_for_provisioning_is_idempotent() {
        let store = InMemoryStore::new();
        let app = store.create_app("svc-a").await.unwrap();
        let resource = Resource::requested(app.id, "db".to_string(), "postgres".to_string(), PropertyMap::new());
        let resource = store.create_resource(resource).await.unwrap();
        let run_id = WorkflowRunId::new();

        assert!(store.claim_resource_for_provisioning(resource.id, run_id).await.unwrap());
        assert!(!store.claim_resource_for_provisioning(resource.id, run_id).await.unwrap());

        let other_run = WorkflowRunId::new();
        assert!(!store.claim_resource_for_provisioning(resource.id, other_run).await.unwrap());
    }

    #[tokio::test]
    async fn transition_resource_rejects_mismatched_expected_state() {
        let store = InMemoryStore::new();
        let app = store.create_app("svc-a").await.unwrap();
        let resource = Resource::requested(app.id, "db".to_string(), "postgres".to_string(), PropertyMap::new());
        let resource = store.create_resource(resource).await.unwrap();

        let result = store
            .transition_resource(resource.id, ResourceState::Active, ResourceState::Failed)
            .await;
        assert!(matches!(result, Err(StoreError::StateConflict { .. })));
    }

    #[tokio::test]
    async fn reconciler_lease_is_single_writer() {
        let store = InMemoryStore::new();
        assert!(store.try_acquire_reconciler_lease("a", 30).await.unwrap());
        assert!(!store.try_acquire_reconciler_lease("b", 30).await.unwrap());
        assert!(store.try_acquire_reconciler_lease("a", 30).await.unwrap());
    }

    #[tokio::test]
    async fn create_app_rejects_duplicate_name() {
        let store = InMemoryStore::new();
        store.create_app("svc-a").await.unwrap();
        let result = store.create_app("svc-a").await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }
}
