//! `PlatformCore`: the single entry point every caller (the server, the
//! CLI, the reconciler's own bootstrap) goes through.
//!
//! RBAC is not this crate's job: every read-boundary method takes a
//! [`CallerIdentity`] and a [`PermissionPredicate`] supplied by the caller
//! and denies with [`CoreErrorKind::Validation`] before touching the Store
//! if the predicate says no. The core never evaluates permission logic
//! itself, only calls out to it.

use std::collections::HashMap;
use std::sync::Arc;

use pcore_domain::{
    App, AppId, CallerIdentity, GraphEdge, GraphEdgeType, GraphNode, GraphNodeType, NodeTiming,
    PermissionPredicate, PropertyMap, ResourceDecl, StepRun, WorkflowRun, WorkflowRunId,
    WorkflowTrigger,
};
use pcore_graph::{GraphModel, GraphSnapshot};
use pcore_providers::{validate_params, ProviderRegistry};
use pcore_store::Store;
use pcore_workflow_engine::{cancellation_pair, CancellationRegistry, LogChunk, LogStream, ResourceView, StepOutputs, WorkflowEngine};
use tokio::sync::broadcast;

use crate::errors::{CoreError, CoreErrorKind};
use crate::ingest::{self, ParsedSpec};

/// Knobs `PlatformCore` needs beyond what the engine/reconciler already
/// carry in their own configs.
#[derive(Debug, Clone)]
pub struct PlatformCoreConfig {
    pub known_step_types: Vec<String>,
    pub strict_properties: bool,
}

pub struct PlatformCore {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    engine: Arc<WorkflowEngine>,
    graph: Arc<GraphModel>,
    log_stream: Arc<LogStream>,
    cancellations: Arc<CancellationRegistry>,
    config: PlatformCoreConfig,
}

fn require_permission(
    caller: &CallerIdentity,
    permission: &dyn PermissionPredicate,
    action: &str,
) -> Result<(), CoreError> {
    if permission.allows(caller, action) {
        Ok(())
    } else {
        Err(CoreError::new(CoreErrorKind::Validation, format!("caller '{caller}' is not permitted to {action}")))
    }
}

impl PlatformCore {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        engine: Arc<WorkflowEngine>,
        graph: Arc<GraphModel>,
        log_stream: Arc<LogStream>,
        cancellations: Arc<CancellationRegistry>,
        config: PlatformCoreConfig,
    ) -> Self {
        Self { store, registry, engine, graph, log_stream, cancellations, config }
    }

    fn known_step_types(&self) -> Vec<&str> {
        self.config.known_step_types.iter().map(String::as_str).collect()
    }

    /// Ingests a Score-style Spec document. The App it belongs to is
    /// resolved from the document's own `metadata.name`, creating it on
    /// first sight.
    ///
    /// If the Spec carries an inline workflow, it runs to completion before
    /// this call returns, so the reconciler's first resource-provisioning
    /// pass for this App never races an in-flight app-level setup step.
    pub async fn ingest_spec(&self, caller: CallerIdentity, spec_yaml: &str) -> Result<AppId, CoreError> {
        let app_name = ingest::peek_app_name(spec_yaml)?;
        let app = match self.store.get_app_by_name(&app_name).await? {
            Some(app) => app,
            None => self.store.create_app(&app_name).await?,
        };

        let ParsedSpec { spec, used_legacy_params } =
            ingest::parse_spec(app.id, &app.app_name, spec_yaml, &self.known_step_types(), self.config.strict_properties)?;
        if used_legacy_params {
            tracing::warn!(app = %app.app_name, caller = %caller, "spec used the legacy 'params' alias; rewritten to 'properties'");
        }

        self.populate_graph(&app, &spec.resources, spec.workflow.is_some()).await?;

        let workflow = spec.workflow.clone();
        self.store.upsert_spec(spec).await?;

        if let Some(decl) = workflow {
            let params = validate_params(&decl.parameters, &serde_json::Map::new())?;
            let run = WorkflowRun::new(app.id, decl.name.clone(), WorkflowTrigger::Manual, params.clone(), decl.steps.len() as u32, None);
            let run_id = run.id;
            self.store.create_workflow_run(run.clone()).await?;

            let (handle, token) = cancellation_pair();
            self.cancellations.register(run_id, handle).await;
            let resources = Arc::new(HashMap::new());
            let result = self.engine.execute(&decl, run, resources, Arc::new(params), token).await;
            self.cancellations.remove(run_id).await;
            result?;
        }

        Ok(app.id)
    }

    /// Best-effort graph population for an ingested Spec: one `Spec` node,
    /// a `Resource` node per declared resource, and a `Workflow` placeholder
    /// node if one is inline. Idempotent across re-ingests of the same App:
    /// an existing node of the same type and name is reused rather than
    /// duplicated. Failures here do not fail the ingest: the graph is an
    /// observability surface, not the system of record.
    async fn populate_graph(&self, app: &App, resources: &[ResourceDecl], has_inline_workflow: bool) -> Result<(), CoreError> {
        self.graph.load_graph(app.id).await.ok();
        let (existing_nodes, _) = self.graph.get_graph(app.id).await;
        let find = |node_type: GraphNodeType, name: &str| {
            existing_nodes.iter().find(|n| n.node_type == node_type && n.name == name).map(|n| n.id)
        };

        let spec_node_id = match find(GraphNodeType::Spec, &app.app_name) {
            Some(id) => id,
            None => {
                let node = GraphNode {
                    id: pcore_domain::GraphNodeId::new(),
                    app_id: app.id,
                    node_type: GraphNodeType::Spec,
                    name: app.app_name.clone(),
                    state: "active".to_string(),
                    timing: NodeTiming::default(),
                    properties: PropertyMap::new(),
                };
                self.graph.add_node(node).await?
            }
        };

        for decl in resources {
            if find(GraphNodeType::Resource, &decl.name).is_some() {
                continue;
            }
            let node = GraphNode {
                id: pcore_domain::GraphNodeId::new(),
                app_id: app.id,
                node_type: GraphNodeType::Resource,
                name: decl.name.clone(),
                state: "requested".to_string(),
                timing: NodeTiming::default(),
                properties: decl.properties.clone(),
            };
            let node_id = self.graph.add_node(node).await?;
            self.graph
                .add_edge(GraphEdge { id: pcore_domain::GraphEdgeId::new(), app_id: app.id, from: spec_node_id, to: node_id, edge_type: GraphEdgeType::Contains })
                .await?;
        }

        let workflow_name = format!("{}-inline", app.app_name);
        if has_inline_workflow && find(GraphNodeType::Workflow, &workflow_name).is_none() {
            let node = GraphNode {
                id: pcore_domain::GraphNodeId::new(),
                app_id: app.id,
                node_type: GraphNodeType::Workflow,
                name: workflow_name,
                state: "pending".to_string(),
                timing: NodeTiming::default(),
                properties: PropertyMap::new(),
            };
            let node_id = self.graph.add_node(node).await?;
            self.graph
                .add_edge(GraphEdge { id: pcore_domain::GraphEdgeId::new(), app_id: app.id, from: spec_node_id, to: node_id, edge_type: GraphEdgeType::Contains })
                .await?;
        }

        Ok(())
    }

    /// Resolves and launches a named golden path. Returns the new run's id
    /// immediately; the run executes on a detached task, same as a
    /// reconciler-triggered one, and can be cancelled through
    /// [`Self::cancel_run`].
    pub async fn run_golden_path(
        &self,
        caller: CallerIdentity,
        app_id: AppId,
        path_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<WorkflowRunId, CoreError> {
        let (_provider, workflow, _entry) = self.registry.resolve_golden_path(path_name)?;
        let workflow = workflow.clone();
        let effective_params = validate_params(&workflow.parameters, &params)?;

        let run = WorkflowRun::new(app_id, workflow.name.clone(), WorkflowTrigger::Goldenpath, effective_params.clone(), workflow.steps.len() as u32, None);
        let run = self.store.create_workflow_run(run).await?;
        let run_id = run.id;

        let resources = self.resource_views(app_id).await?;

        let engine = Arc::clone(&self.engine);
        let cancellations = Arc::clone(&self.cancellations);
        let (handle, token) = cancellation_pair();
        tracing::info!(%caller, %run_id, golden_path = %path_name, "launching golden path run");
        tokio::spawn(async move {
            cancellations.register(run_id, handle).await;
            let resources = Arc::new(resources);
            let params = Arc::new(effective_params);
            if let Err(err) = engine.execute(&workflow, run, resources, params, token).await {
                tracing::error!(error = %err, %run_id, "golden path run failed to complete");
            }
            cancellations.remove(run_id).await;
        });

        Ok(run_id)
    }

    async fn resource_views(&self, app_id: AppId) -> Result<HashMap<String, ResourceView>, CoreError> {
        let resources = self.store.list_resources_for_app(app_id).await?;
        Ok(resources
            .into_iter()
            .map(|r| (r.name.clone(), ResourceView { properties: r.properties, outputs: r.outputs }))
            .collect())
    }

    /// Requests cancellation of a live run. A no-op (but not an error) if
    /// the run has already reached a terminal status.
    pub async fn cancel_run(&self, caller: CallerIdentity, run_id: WorkflowRunId) -> Result<(), CoreError> {
        tracing::info!(%caller, %run_id, "cancellation requested");
        self.cancellations.cancel(run_id).await;
        Ok(())
    }

    /// Retries a failed run: a fresh `WorkflowRun` that begins at the first
    /// failed step, reusing every prior succeeded step's outputs verbatim
    ///. Returns the new run's id.
    pub async fn retry_run(&self, caller: CallerIdentity, run_id: WorkflowRunId) -> Result<WorkflowRunId, CoreError> {
        let failed_run = self.store.get_workflow_run(run_id).await?;
        if failed_run.status != pcore_domain::WorkflowRunStatus::Failed {
            return Err(CoreError::new(CoreErrorKind::Validation, format!("run {run_id} is not in a failed state")));
        }

        let prior_steps = self.store.list_step_runs(run_id).await?;
        let decl = self.workflow_decl_for(&failed_run).await?;

        let mut resume: HashMap<String, StepOutputs> = HashMap::new();
        for step in &prior_steps {
            if step.status == pcore_domain::StepRunStatus::Succeeded {
                resume.insert(step.step_name.clone(), step.outputs.clone());
            }
        }

        let new_run = WorkflowRun::new(
            failed_run.app_id,
            failed_run.workflow_name.clone(),
            failed_run.trigger,
            failed_run.parameters.clone(),
            decl.steps.len() as u32,
            failed_run.resource_id,
        );
        let new_run = self.store.create_workflow_run(new_run).await?;
        let new_run_id = new_run.id;
        let resources = self.resource_views(failed_run.app_id).await?;

        let engine = Arc::clone(&self.engine);
        let cancellations = Arc::clone(&self.cancellations);
        let (handle, token) = cancellation_pair();
        tracing::info!(%caller, original_run = %run_id, %new_run_id, "retrying failed run");
        tokio::spawn(async move {
            cancellations.register(new_run_id, handle).await;
            let resources = Arc::new(resources);
            let params = Arc::new(new_run.parameters.clone());
            if let Err(err) = engine.execute_resuming(&decl, new_run, resources, params, &resume, token).await {
                tracing::error!(error = %err, %new_run_id, "retried run failed to complete");
            }
            cancellations.remove(new_run_id).await;
        });

        Ok(new_run_id)
    }

    /// Looks up the `WorkflowDecl` a prior run executed, so a retry can
    /// rebuild the same step sequence. `Reconciler`- and `Goldenpath`-
    /// triggered runs resolve through the provider registry; a `Manual` run
    /// resolves through the owning App's current Spec's inline workflow.
    async fn workflow_decl_for(&self, run: &WorkflowRun) -> Result<pcore_domain::WorkflowDecl, CoreError> {
        if run.trigger == WorkflowTrigger::Manual {
            let spec = self.store.get_latest_spec(run.app_id).await?;
            if let Some(decl) = spec.workflow {
                if decl.name == run.workflow_name {
                    return Ok(decl);
                }
            }
        }

        for provider_name in self.registry.list_providers() {
            if let Some(provider) = self.registry.get_provider(provider_name) {
                if let Some(workflow) = provider.workflows.get(&run.workflow_name) {
                    return Ok(workflow.clone());
                }
            }
        }
        Err(CoreError::new(CoreErrorKind::Resolution, format!("no known workflow named '{}' to retry", run.workflow_name)))
    }

    pub async fn get_app(&self, caller: CallerIdentity, permission: &dyn PermissionPredicate, app_id: AppId) -> Result<App, CoreError> {
        require_permission(&caller, permission, "get_app")?;
        Ok(self.store.get_app(app_id).await?)
    }

    pub async fn get_run(&self, caller: CallerIdentity, permission: &dyn PermissionPredicate, run_id: WorkflowRunId) -> Result<WorkflowRun, CoreError> {
        require_permission(&caller, permission, "get_run")?;
        Ok(self.store.get_workflow_run(run_id).await?)
    }

    pub async fn list_step_runs(&self, caller: CallerIdentity, permission: &dyn PermissionPredicate, run_id: WorkflowRunId) -> Result<Vec<StepRun>, CoreError> {
        require_permission(&caller, permission, "list_step_runs")?;
        Ok(self.store.list_step_runs(run_id).await?)
    }

    /// Tails a step's log from `from_offset`: the bytes already written plus
    /// a receiver for everything appended afterward.
    pub async fn tail_log(
        &self,
        caller: CallerIdentity,
        permission: &dyn PermissionPredicate,
        step_run_id: pcore_domain::StepRunId,
        from_offset: usize,
    ) -> Result<(Vec<u8>, broadcast::Receiver<LogChunk>), CoreError> {
        require_permission(&caller, permission, "tail_log")?;
        Ok(self.log_stream.tail(step_run_id, from_offset).await?)
    }

    pub async fn subscribe_graph(
        &self,
        caller: CallerIdentity,
        permission: &dyn PermissionPredicate,
        app_id: AppId,
    ) -> Result<broadcast::Receiver<GraphSnapshot>, CoreError> {
        require_permission(&caller, permission, "subscribe_graph")?;
        Ok(self.graph.subscribe(app_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_domain::AllowAll;
    use pcore_store::InMemoryStore;
    use pcore_workflow_engine::{EngineConfig, ExecutorRegistry, LogStream, Scheduler, SchedulerConfig};

    fn test_core(store: Arc<dyn Store>) -> PlatformCore {
        let log_stream = Arc::new(LogStream::new(Arc::clone(&store)));
        let engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&store),
            Arc::new(ExecutorRegistry::with_builtins()),
            Arc::new(Scheduler::new(SchedulerConfig::default())),
            Arc::clone(&log_stream),
            EngineConfig::default(),
        ));
        let graph = Arc::new(GraphModel::new(Arc::clone(&store)));
        let registry = Arc::new(ProviderRegistry::new());
        let cancellations = Arc::new(CancellationRegistry::new());
        let config = PlatformCoreConfig { known_step_types: vec!["terraform".to_string()], strict_properties: false };
        PlatformCore::new(store, registry, engine, graph, log_stream, cancellations, config)
    }

    const MINIMAL_SPEC: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
resources:
  db:
    type: postgres
    properties:
      size: small
"#;

    const SPEC_WITH_INLINE_WORKFLOW: &str = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
workflow:
  steps:
    - name: apply
      type: terraform
      config: {}
"#;

    #[tokio::test]
    async fn ingest_spec_creates_the_app_and_its_graph() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));

        let app_id = core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();
        let app = core.get_app(CallerIdentity::system(), &AllowAll, app_id).await.unwrap();
        assert_eq!(app.app_name, "checkout");

        let spec = store.get_latest_spec(app_id).await.unwrap();
        assert_eq!(spec.resources.len(), 1);

        let (nodes, _edges) = core.graph.get_graph(app_id).await;
        assert!(nodes.iter().any(|n| n.node_type == GraphNodeType::Spec));
        assert!(nodes.iter().any(|n| n.node_type == GraphNodeType::Resource && n.name == "db"));
    }

    #[tokio::test]
    async fn re_ingesting_the_same_app_does_not_duplicate_graph_nodes() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));

        let app_id = core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();
        core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();

        let (nodes, _edges) = core.graph.get_graph(app_id).await;
        assert_eq!(nodes.iter().filter(|n| n.node_type == GraphNodeType::Spec).count(), 1);
        assert_eq!(nodes.iter().filter(|n| n.node_type == GraphNodeType::Resource).count(), 1);
    }

    #[tokio::test]
    async fn ingest_spec_runs_an_inline_workflow_to_completion_before_returning() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));

        let app_id = core.ingest_spec(CallerIdentity::system(), SPEC_WITH_INLINE_WORKFLOW).await.unwrap();
        let runs = store.list_active_runs().await.unwrap();
        assert!(runs.is_empty(), "inline workflow must already be terminal once ingest returns");

        let (nodes, _) = core.graph.get_graph(app_id).await;
        assert!(nodes.iter().any(|n| n.node_type == GraphNodeType::Workflow));
    }

    #[tokio::test]
    async fn cancel_run_on_an_unknown_run_is_not_an_error() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(store);
        core.cancel_run(CallerIdentity::system(), WorkflowRunId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn read_boundary_denies_a_caller_the_permission_predicate_rejects() {
        struct DenyAll;
        impl PermissionPredicate for DenyAll {
            fn allows(&self, _caller: &CallerIdentity, _action: &str) -> bool {
                false
            }
        }

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));
        let app_id = core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();

        let err = core.get_app(CallerIdentity::new("someone"), &DenyAll, app_id).await.unwrap_err();
        assert_eq!(err.kind, CoreErrorKind::Validation);
    }

    #[tokio::test]
    async fn run_golden_path_surfaces_resolution_errors_for_an_unknown_path() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));
        let app_id = core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();

        let err = core.run_golden_path(CallerIdentity::system(), app_id, "provision-new-service", serde_json::Map::new()).await.unwrap_err();
        assert_eq!(err.kind, CoreErrorKind::Resolution);
    }

    #[tokio::test]
    async fn retry_run_rejects_a_run_that_is_not_failed() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let core = test_core(Arc::clone(&store));
        let app_id = core.ingest_spec(CallerIdentity::system(), MINIMAL_SPEC).await.unwrap();

        let run = WorkflowRun::new(app_id, "apply".to_string(), WorkflowTrigger::Manual, serde_json::Map::new(), 1, None);
        let run = store.create_workflow_run(run).await.unwrap();

        let err = core.retry_run(CallerIdentity::system(), run.id).await.unwrap_err();
        assert_eq!(err.kind, CoreErrorKind::Validation);
    }
}
