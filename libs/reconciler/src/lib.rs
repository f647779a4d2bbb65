//! Continuously brings persisted `Resource` state in line with each App's
//! current Spec.
//!
//! One instance runs per process, serialized by [`run`]; horizontal scaling
//! requires the caller to guard with `TryAcquireReconcilerLease` first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pcore_common::Clock;
use pcore_domain::{PropertyMap, Resource, ResourceState, WorkflowRun, WorkflowTrigger};
use pcore_providers::ProviderRegistry;
use pcore_store::{Store, StoreError};
use pcore_workflow_engine::{cancellation_pair, CancellationRegistry, ResourceView, WorkflowEngine};
use thiserror::Error;

/// Default tick pacing and health-check cadence.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: i64 = 5 * 60;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub tick_interval: Duration,
    pub health_check_interval_secs: i64,
    pub lease_holder: String,
    pub lease_ttl_secs: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            lease_holder: format!("reconciler-{}", std::process::id()),
            lease_ttl_secs: 15,
        }
    }
}

/// Summary of the work a single tick performed, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub created: usize,
    pub claimed: usize,
    pub deprovisioned: usize,
    pub health_checked: usize,
}

pub struct ResourceReconciler {
    store: Arc<dyn Store>,
    registry: Arc<ProviderRegistry>,
    engine: Arc<WorkflowEngine>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    cancellations: Arc<CancellationRegistry>,
}

impl ResourceReconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProviderRegistry>,
        engine: Arc<WorkflowEngine>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self { store, registry, engine, clock, config, cancellations }
    }

    /// Runs the tick loop until `shutdown` resolves. Ticks are serial: a tick
    /// that overruns `tick_interval` delays the next one rather than overlap.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.try_acquire_reconciler_lease(&self.config.lease_holder, self.config.lease_ttl_secs).await {
                        Ok(true) => {
                            match self.tick().await {
                                Ok(summary) => tracing::debug!(?summary, "reconciler tick completed"),
                                Err(err) => tracing::error!(error = %err, "reconciler tick failed"),
                            }
                        }
                        Ok(false) => tracing::trace!("reconciler lease held elsewhere, skipping tick"),
                        Err(err) => tracing::error!(error = %err, "failed to acquire reconciler lease"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Runs one sweep of the 5-step algorithm across every App.
    pub async fn tick(&self) -> Result<TickSummary, ReconcilerError> {
        let mut summary = TickSummary::default();
        for app in self.store.list_apps().await? {
            let Ok(spec) = self.store.get_latest_spec(app.id).await else {
                continue;
            };
            let persisted = self.store.list_resources_for_app(app.id).await?;
            let persisted_by_name: HashMap<&str, &Resource> =
                persisted.iter().map(|r| (r.name.as_str(), r)).collect();
            let declared_names: HashSet<&str> = spec.resources.iter().map(|r| r.name.as_str()).collect();

            // Step 2: create newly declared resources.
            for decl in &spec.resources {
                if !persisted_by_name.contains_key(decl.name.as_str()) {
                    self.store
                        .create_resource(Resource::requested(
                            app.id,
                            decl.name.clone(),
                            decl.resource_type.clone(),
                            decl.properties.clone(),
                        ))
                        .await?;
                    summary.created += 1;
                }
            }

            // Step 3: claim and provision unclaimed requested resources.
            for resource in persisted.iter().filter(|r| r.state == ResourceState::Requested && r.current_workflow_run_id.is_none()) {
                if self.claim_and_provision(resource).await? {
                    summary.claimed += 1;
                }
            }

            // Step 4: deprovision resources no longer declared.
            for resource in &persisted {
                if declared_names.contains(resource.name.as_str()) {
                    continue;
                }
                if matches!(resource.state, ResourceState::Deprovisioning | ResourceState::Terminated) {
                    continue;
                }
                self.deprovision(resource).await?;
                summary.deprovisioned += 1;
            }

            // Step 5: health-check stale active resources.
            let now = self.clock.now();
            for resource in persisted.iter().filter(|r| r.needs_health_check(now, self.config.health_check_interval_secs)) {
                self.health_check(resource).await?;
                summary.health_checked += 1;
            }
        }
        Ok(summary)
    }

    /// Resolves `resource.resource_type` to a provisioner workflow, claims
    /// the resource, and spawns the run on the engine. Returns `false` if
    /// another writer won the claim race in the meantime (not an error).
    async fn claim_and_provision(&self, resource: &Resource) -> Result<bool, ReconcilerError> {
        let Ok((_, workflow)) = self.registry.resolve_resource_type(&resource.resource_type) else {
            tracing::warn!(resource_type = %resource.resource_type, "no provider for declared resource type");
            return Ok(false);
        };
        let workflow = workflow.clone();

        let mut params = serde_json::Map::new();
        params.insert("resourceName".to_string(), serde_json::Value::String(resource.name.clone()));
        params.insert("resourceProperties".to_string(), serde_json::Value::Object(resource.properties.clone()));

        let run = WorkflowRun::new(
            resource.app_id,
            workflow.name.clone(),
            WorkflowTrigger::Reconciler,
            params.clone(),
            workflow.steps.len() as u32,
            Some(resource.id),
        );

        if !self.store.claim_resource_for_provisioning(resource.id, run.id).await? {
            return Ok(false);
        }
        self.store.create_workflow_run(run.clone()).await?;

        let mut resources = HashMap::new();
        resources.insert(resource.name.clone(), ResourceView { properties: resource.properties.clone(), outputs: PropertyMap::new() });

        self.spawn_run(workflow, run, resources, params);
        Ok(true)
    }

    /// Marks a resource no longer in the Spec `deprovisioning`, running the
    /// provider's `deprovision-<resourceType>` workflow if one is declared;
    /// otherwise moves straight to `terminated`.
    async fn deprovision(&self, resource: &Resource) -> Result<(), ReconcilerError> {
        self.store.transition_resource(resource.id, resource.state, ResourceState::Deprovisioning).await?;

        let deprovision_workflow = self
            .registry
            .resolve_resource_type(&resource.resource_type)
            .ok()
            .and_then(|(provider, _)| provider.workflows.get(&format!("deprovision-{}", resource.resource_type)).cloned());

        let Some(workflow) = deprovision_workflow else {
            self.store.transition_resource(resource.id, ResourceState::Deprovisioning, ResourceState::Terminated).await?;
            return Ok(());
        };

        let mut params = serde_json::Map::new();
        params.insert("resourceName".to_string(), serde_json::Value::String(resource.name.clone()));
        params.insert("resourceProperties".to_string(), serde_json::Value::Object(resource.properties.clone()));

        let run = WorkflowRun::new(resource.app_id, workflow.name.clone(), WorkflowTrigger::Reconciler, params.clone(), workflow.steps.len() as u32, None);
        self.store.create_workflow_run(run.clone()).await?;

        let mut resources = HashMap::new();
        resources.insert(resource.name.clone(), ResourceView { properties: resource.properties.clone(), outputs: resource.outputs.clone() });

        self.spawn_run(workflow, run, resources, params);
        Ok(())
    }

    /// Runs the provider's `health-check-<resourceType>` step sequence if one
    /// is declared; always records that the check ran so the resource is not
    /// re-selected before the next interval elapses.
    async fn health_check(&self, resource: &Resource) -> Result<(), ReconcilerError> {
        let now = self.clock.now();
        self.store.touch_resource_health_check(resource.id, now).await?;

        let health_check_workflow = self
            .registry
            .resolve_resource_type(&resource.resource_type)
            .ok()
            .and_then(|(provider, _)| provider.workflows.get(&format!("health-check-{}", resource.resource_type)).cloned());

        let Some(workflow) = health_check_workflow else {
            return Ok(());
        };

        let mut params = serde_json::Map::new();
        params.insert("resourceName".to_string(), serde_json::Value::String(resource.name.clone()));
        params.insert("resourceProperties".to_string(), serde_json::Value::Object(resource.properties.clone()));

        let run = WorkflowRun::new(resource.app_id, workflow.name.clone(), WorkflowTrigger::Reconciler, params.clone(), workflow.steps.len() as u32, None);
        self.store.create_workflow_run(run.clone()).await?;

        let mut resources = HashMap::new();
        resources.insert(resource.name.clone(), ResourceView { properties: resource.properties.clone(), outputs: resource.outputs.clone() });

        self.spawn_run(workflow, run, resources, params);
        Ok(())
    }

    /// Hands a run to the engine on a detached task; the engine persists
    /// every transition to the Store, so the reconciler does not await
    /// completion and a crash mid-run is picked up by the engine's own
    /// recovery on next startup.
    fn spawn_run(
        &self,
        workflow: pcore_domain::WorkflowDecl,
        run: WorkflowRun,
        resources: HashMap<String, ResourceView>,
        params: serde_json::Map<String, serde_json::Value>,
    ) {
        let engine = Arc::clone(&self.engine);
        let cancellations = Arc::clone(&self.cancellations);
        let (handle, token) = cancellation_pair();
        let run_id = run.id;
        tokio::spawn(async move {
            cancellations.register(run_id, handle).await;
            let resources = Arc::new(resources);
            let params = Arc::new(params);
            if let Err(err) = engine.execute(&workflow, run, resources, params, token).await {
                tracing::error!(error = %err, "reconciler-triggered run failed to complete");
            }
            cancellations.remove(run_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_common::FixedClock;
    use pcore_store::InMemoryStore;
    use pcore_workflow_engine::{EngineConfig, ExecutorRegistry, LogStream, Scheduler, SchedulerConfig};

    fn test_engine(store: Arc<dyn Store>) -> Arc<WorkflowEngine> {
        Arc::new(WorkflowEngine::new(
            Arc::clone(&store),
            Arc::new(ExecutorRegistry::with_builtins()),
            Arc::new(Scheduler::new(SchedulerConfig::default())),
            Arc::new(LogStream::new(store)),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn tick_creates_requested_resources_for_newly_declared_resources() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let app = store.create_app("svc-a").await.unwrap();
        let spec = pcore_domain::Spec {
            id: pcore_domain::SpecId::new(),
            app_id: app.id,
            app_name: "svc-a".to_string(),
            api_version: "score.dev/v1b1".to_string(),
            metadata: std::collections::HashMap::new(),
            containers: vec![],
            resources: vec![pcore_domain::ResourceDecl { name: "db".to_string(), resource_type: "postgres".to_string(), properties: PropertyMap::new() }],
            workflow: None,
            environment: None,
            created_at: chrono::Utc::now(),
        };
        store.upsert_spec(spec).await.unwrap();

        let registry = Arc::new(ProviderRegistry::new());
        let engine = test_engine(Arc::clone(&store));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let cancellations = Arc::new(pcore_workflow_engine::CancellationRegistry::new());
        let reconciler = ResourceReconciler::new(store, registry, engine, clock, ReconcilerConfig::default(), cancellations);

        let summary = reconciler.tick().await.unwrap();
        assert_eq!(summary.created, 1);
    }

    #[tokio::test]
    async fn tick_is_a_no_op_for_an_app_with_no_spec() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store.create_app("svc-b").await.unwrap();

        let registry = Arc::new(ProviderRegistry::new());
        let engine = test_engine(Arc::clone(&store));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        let cancellations = Arc::new(pcore_workflow_engine::CancellationRegistry::new());
        let reconciler = ResourceReconciler::new(store, registry, engine, clock, ReconcilerConfig::default(), cancellations);

        let summary = reconciler.tick().await.unwrap();
        assert_eq!(summary, TickSummary::default());
    }
}
