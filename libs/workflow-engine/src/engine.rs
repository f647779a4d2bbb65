//! Drives one `WorkflowRun` to completion.
//!
//! Computes a dependency order from `dependsOn`/`parallelGroup`, runs ready
//! steps concurrently (gated by the [`Scheduler`]), retries failed steps
//! with backoff, routes terminal step failures through `onFailure`, and
//! honors cooperative cancellation with a grace period.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use pcore_domain::{
    AppId, CallerIdentity, OnFailureAction, PropertyMap, ResourceState, StepDecl, StepRun, StepRunId,
    StepRunStatus, WorkflowDecl, WorkflowRun, WorkflowRunId, WorkflowRunStatus, DEFAULT_STEP_TIMEOUT_SECS,
    MAX_WORKFLOW_TIMEOUT_SECS,
};
use pcore_store::{Store, StepRunTransition};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::cancellation::CancellationToken;
use crate::executor::{ExecutorRegistry, StepContext, StepExecutor, StepOutputs};
use crate::interpolation::{self, InterpolationContext, ResourceView};
use crate::log_stream::{LogStream, StepLogHandle};
use crate::scheduler::Scheduler;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] pcore_store::StoreError),
}

pub struct EngineConfig {
    pub default_step_timeout: Duration,
    pub default_workflow_timeout: Duration,
    pub cancellation_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            default_workflow_timeout: Duration::from_secs(MAX_WORKFLOW_TIMEOUT_SECS),
            cancellation_grace: Duration::from_secs(10),
        }
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    executors: Arc<ExecutorRegistry>,
    scheduler: Arc<Scheduler>,
    log_stream: Arc<LogStream>,
    config: EngineConfig,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Skipped,
    FailedContinue,
    FailedFatal,
}

impl Outcome {
    const fn satisfies_dependents(self) -> bool {
        !matches!(self, Self::FailedFatal)
    }
}

type StepTaskResult = Result<StepOutputs, String>;

impl WorkflowEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        executors: Arc<ExecutorRegistry>,
        scheduler: Arc<Scheduler>,
        log_stream: Arc<LogStream>,
        config: EngineConfig,
    ) -> Self {
        Self { store, executors, scheduler, log_stream, config }
    }

    /// Runs `decl` to completion against an already-persisted, `Pending`
    /// `WorkflowRun`. Returns the run in its final terminal status.
    ///
    /// A workflow with zero steps succeeds immediately with no side effects.
    pub async fn execute(
        &self,
        decl: &WorkflowDecl,
        run: WorkflowRun,
        resources: Arc<HashMap<String, ResourceView>>,
        params: Arc<serde_json::Map<String, serde_json::Value>>,
        cancellation: CancellationToken,
    ) -> Result<WorkflowRun, EngineError> {
        self.execute_resuming(decl, run, resources, params, &HashMap::new(), cancellation).await
    }

    /// Like [`Self::execute`], but steps named in `resume` are treated as
    /// already `Succeeded` with the given outputs instead of being run: their
    /// `StepRun`s are recreated against the new run id in `Succeeded` status
    /// so downstream interpolation and the run's history both see them, but
    /// no executor is invoked and no attempt is spent. Used by a retry that
    /// begins at the first failed step and reuses prior succeeded outputs
    /// verbatim.
    pub async fn execute_resuming(
        &self,
        decl: &WorkflowDecl,
        run: WorkflowRun,
        resources: Arc<HashMap<String, ResourceView>>,
        params: Arc<serde_json::Map<String, serde_json::Value>>,
        resume: &HashMap<String, StepOutputs>,
        cancellation: CancellationToken,
    ) -> Result<WorkflowRun, EngineError> {
        self.store
            .transition_workflow_run(run.id, WorkflowRunStatus::Pending, WorkflowRunStatus::Running, None)
            .await?;

        if decl.steps.is_empty() {
            let run = self
                .store
                .transition_workflow_run(run.id, WorkflowRunStatus::Running, WorkflowRunStatus::Succeeded, None)
                .await?;
            if let Some(resource_id) = run.resource_id {
                self.close_out_resource(resource_id, run.status, &[], &HashMap::new()).await;
            }
            return Ok(run);
        }

        let mut step_runs: HashMap<String, StepRun> = HashMap::new();
        let mut outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut step_outputs: HashMap<String, StepOutputs> = HashMap::new();
        for (idx, step) in decl.steps.iter().enumerate() {
            if let Some(outputs) = resume.get(&step.name) {
                let mut resumed =
                    StepRun::pending(run.id, step.name.clone(), idx as u32, step.step_type.clone(), step.config.clone());
                resumed.status = StepRunStatus::Succeeded;
                resumed.outputs = outputs.clone();
                let created = self.store.create_step_run(resumed).await?;
                step_runs.insert(step.name.clone(), created);
                outcomes.insert(step.name.clone(), Outcome::Succeeded);
                step_outputs.insert(step.name.clone(), outputs.clone());
                continue;
            }
            let created = self
                .store
                .create_step_run(StepRun::pending(run.id, step.name.clone(), idx as u32, step.step_type.clone(), step.config.clone()))
                .await?;
            step_runs.insert(step.name.clone(), created);
        }

        let deps = resolve_dependencies(&decl.steps);
        let steps_by_name: HashMap<&str, &StepDecl> = decl.steps.iter().map(|s| (s.name.as_str(), s)).collect();

        let workflow_timeout = decl
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_workflow_timeout)
            .min(self.config.default_workflow_timeout);
        let deadline = tokio::time::Instant::now() + workflow_timeout;

        let mut remaining: HashSet<String> =
            decl.steps.iter().map(|s| s.name.clone()).filter(|name| !resume.contains_key(name)).collect();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut force_ready: HashSet<String> = HashSet::new();
        let mut joins: JoinSet<(String, StepTaskResult)> = JoinSet::new();
        let mut abort_reason: Option<String> = None;
        let mut cancel_deadline: Option<tokio::time::Instant> = None;

        loop {
            if abort_reason.is_none() && cancel_deadline.is_none() {
                let ready_names: Vec<String> = decl
                    .steps
                    .iter()
                    .map(|s| &s.name)
                    .filter(|name| remaining.contains(*name) && !in_flight.contains(*name))
                    .filter(|name| {
                        force_ready.remove(*name)
                            || deps[*name].iter().all(|d| outcomes.get(d).is_some_and(|o| o.satisfies_dependents()))
                    })
                    .cloned()
                    .collect();

                for name in ready_names {
                    let step = steps_by_name[name.as_str()];
                    in_flight.insert(name.clone());
                    let step_run_id = step_runs[&name].id;
                    let resource_name = step.config.get("resource").and_then(|v| v.as_str()).map(str::to_string);

                    let scheduler = Arc::clone(&self.scheduler);
                    let executor = self.executors.get(&step.step_type);
                    let log_stream = Arc::clone(&self.log_stream);
                    let resources = Arc::clone(&resources);
                    let params = Arc::clone(&params);
                    let store = Arc::clone(&self.store);
                    let step_type = step.step_type.clone();
                    let step_config = step.config.clone();
                    let retry = step.retry;
                    let timeout = Duration::from_secs(step.timeout_secs.unwrap_or(self.config.default_step_timeout.as_secs()));
                    let outputs_so_far = step_outputs.clone();
                    let app_id = run.app_id;
                    let workflow_run_id = run.id;
                    let cancellation = cancellation.clone();

                    joins.spawn(async move {
                        let Some(executor) = executor else {
                            return (name, Err(format!("no executor registered for step type '{step_type}'")));
                        };
                        let permit = match scheduler.admit(app_id, resource_name.as_deref()).await {
                            Ok(p) => p,
                            Err(err) => return (name, Err(err.to_string())),
                        };
                        let result = run_step_with_retries(
                            executor.as_ref(),
                            &store,
                            &log_stream,
                            app_id,
                            workflow_run_id,
                            step_run_id,
                            &name,
                            step_config,
                            &resources,
                            &outputs_so_far,
                            &params,
                            retry,
                            timeout,
                            cancellation,
                        )
                        .await;
                        drop(permit);
                        (name, result)
                    });
                }
            }

            if remaining.is_empty() && in_flight.is_empty() {
                break;
            }

            if cancellation.is_cancelled() && cancel_deadline.is_none() {
                cancel_deadline = Some(tokio::time::Instant::now() + self.config.cancellation_grace);
            }
            let wake_at = [Some(deadline), cancel_deadline]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(1));

            tokio::select! {
                joined = joins.join_next(), if !in_flight.is_empty() => {
                    let Some(joined) = joined else { continue };
                    let (name, result) = match joined {
                        Ok(pair) => pair,
                        Err(_) => continue,
                    };
                    in_flight.remove(&name);
                    remaining.remove(&name);
                    let step = steps_by_name[name.as_str()];

                    match result {
                        Ok(outputs) => {
                            outcomes.insert(name.clone(), Outcome::Succeeded);
                            step_outputs.insert(name, outputs);
                        }
                        Err(error) => match &step.on_failure {
                            OnFailureAction::FailWorkflow => {
                                outcomes.insert(name, Outcome::FailedFatal);
                                abort_reason.get_or_insert(error);
                            }
                            OnFailureAction::Continue => {
                                outcomes.insert(name, Outcome::FailedContinue);
                            }
                            OnFailureAction::RunStep(target) => {
                                outcomes.insert(name, Outcome::FailedContinue);
                                if remaining.contains(target) {
                                    force_ready.insert(target.clone());
                                }
                            }
                        },
                    }
                }
                () = tokio::time::sleep_until(wake_at) => {
                    if tokio::time::Instant::now() >= deadline {
                        abort_reason.get_or_insert_with(|| "workflow timed out".to_string());
                    }
                }
            }

            if let Some(cancel_deadline) = cancel_deadline {
                if tokio::time::Instant::now() >= cancel_deadline {
                    joins.abort_all();
                    in_flight.clear();
                    abort_reason.get_or_insert_with(|| "workflow cancelled".to_string());
                    break;
                }
            }

            if abort_reason.is_some() && in_flight.is_empty() {
                break;
            }
        }

        for name in remaining.drain().collect::<Vec<_>>() {
            outcomes.insert(name.clone(), Outcome::Skipped);
            let step_run = &step_runs[&name];
            if step_run.status == StepRunStatus::Pending {
                let _ = self
                    .store
                    .transition_step_run(step_run.id, StepRunStatus::Pending, StepRunStatus::Skipped, StepRunTransition::default())
                    .await;
            }
        }

        let final_status = if cancellation.is_cancelled() {
            WorkflowRunStatus::Cancelled
        } else if abort_reason.is_some() {
            WorkflowRunStatus::Failed
        } else {
            WorkflowRunStatus::Succeeded
        };

        let run = self
            .store
            .transition_workflow_run(run.id, WorkflowRunStatus::Running, final_status, abort_reason)
            .await?;

        if let Some(resource_id) = run.resource_id {
            self.close_out_resource(resource_id, final_status, &decl.steps, &step_outputs).await;
        }

        Ok(run)
    }

    /// Closes the provisioning lifecycle a run opened via
    /// `claim_resource_for_provisioning`: moves the Resource from
    /// `provisioning` to `active`/`failed` and records the run's step
    /// outputs (`host`, `port`, `connection_string`, ...) onto it. A no-op
    /// if the resource already moved past `provisioning` (e.g. a retry's
    /// resumed run racing the original).
    async fn close_out_resource(
        &self,
        resource_id: pcore_domain::ResourceId,
        final_status: WorkflowRunStatus,
        steps: &[StepDecl],
        step_outputs: &HashMap<String, StepOutputs>,
    ) {
        let resource = match self.store.get_resource(resource_id).await {
            Ok(resource) => resource,
            Err(err) => {
                tracing::error!(error = %err, %resource_id, "could not load resource to close out provisioning");
                return;
            }
        };
        if resource.state != ResourceState::Provisioning {
            return;
        }

        let target = if final_status == WorkflowRunStatus::Succeeded { ResourceState::Active } else { ResourceState::Failed };
        let mut outputs = PropertyMap::new();
        for step in steps {
            if let Some(step_output) = step_outputs.get(&step.name) {
                outputs.extend(step_output.iter().map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone()))));
            }
        }

        if let Err(err) = self
            .store
            .complete_resource_provisioning(resource_id, ResourceState::Provisioning, target, outputs)
            .await
        {
            tracing::error!(error = %err, %resource_id, "failed to close out resource provisioning");
        }
    }

    /// Crash recovery: any `StepRun`/`WorkflowRun` left `Running` when the
    /// engine last stopped cannot be safely resumed: the engine persists no
    /// execution checkpoint finer than per-step, so a replayed executor could
    /// double-apply a side effect whose first attempt actually succeeded. Both
    /// are marked `Failed`; nothing is retried automatically (`maxRetries=0`
    /// on restart).
    pub async fn recover_in_flight_runs(&self) -> Result<usize, EngineError> {
        let mut recovered = 0;
        for run in self.store.list_active_runs().await? {
            let mut any_running = false;
            for step in self.store.list_step_runs(run.id).await? {
                if step.status == StepRunStatus::Running {
                    any_running = true;
                    let _ = self
                        .store
                        .transition_step_run(
                            step.id,
                            StepRunStatus::Running,
                            StepRunStatus::Failed,
                            StepRunTransition { error_message: Some("engine restarted mid-execution".to_string()), ..Default::default() },
                        )
                        .await;
                }
            }
            if any_running {
                let _ = self
                    .store
                    .transition_workflow_run(
                        run.id,
                        WorkflowRunStatus::Running,
                        WorkflowRunStatus::Failed,
                        Some("engine restarted mid-execution".to_string()),
                    )
                    .await;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_step_with_retries(
    executor: &dyn StepExecutor,
    store: &Arc<dyn Store>,
    log_stream: &Arc<LogStream>,
    app_id: AppId,
    workflow_run_id: WorkflowRunId,
    step_run_id: StepRunId,
    step_name: &str,
    raw_config: serde_json::Value,
    resources: &HashMap<String, ResourceView>,
    prior_outputs: &HashMap<String, StepOutputs>,
    params: &serde_json::Map<String, serde_json::Value>,
    retry: Option<pcore_domain::RetryPolicy>,
    timeout: Duration,
    cancellation: CancellationToken,
) -> StepTaskResult {
    let max_attempts = retry.map_or(1, |r| r.attempts.max(1));
    let ictx = InterpolationContext { resources, step_outputs: prior_outputs, params };
    let config = interpolation::resolve(&raw_config, &ictx).map_err(|e| e.to_string())?;
    let caller = CallerIdentity::system();
    let mut schedule = retry.map(retry_schedule);

    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        let expected = if attempt == 1 { StepRunStatus::Pending } else { StepRunStatus::Running };
        let started = Utc::now();
        let _ = store
            .transition_step_run(
                step_run_id,
                expected,
                StepRunStatus::Running,
                StepRunTransition { attempts: Some(attempt), ..Default::default() },
            )
            .await;

        let log = StepLogHandle { stream: Arc::clone(log_stream), step_run_id };
        let ctx = StepContext {
            app_id,
            workflow_run_id,
            step_run_id,
            step_name,
            config: config.clone(),
            resources,
            prior_outputs,
            caller: &caller,
            log: &log,
            cancellation: cancellation.clone(),
        };

        let outcome = tokio::time::timeout(timeout, executor.execute(&ctx)).await;
        let duration_ms = (Utc::now() - started).num_milliseconds();

        match outcome {
            Ok(Ok(outputs)) => {
                let _ = store
                    .transition_step_run(
                        step_run_id,
                        StepRunStatus::Running,
                        StepRunStatus::Succeeded,
                        StepRunTransition { outputs: Some(outputs.clone()), duration_ms: Some(duration_ms), ..Default::default() },
                    )
                    .await;
                let _ = log_stream.close(step_run_id).await;
                return Ok(outputs);
            }
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_) => last_error = format!("step timed out after {}s", timeout.as_secs()),
        }

        if attempt < max_attempts {
            let delay = schedule.as_mut().and_then(Backoff::next_backoff).unwrap_or_default();
            tokio::time::sleep(delay).await;
        }
    }

    let _ = store
        .transition_step_run(
            step_run_id,
            StepRunStatus::Running,
            StepRunStatus::Failed,
            StepRunTransition { error_message: Some(last_error.clone()), ..Default::default() },
        )
        .await;
    let _ = log_stream.close(step_run_id).await;
    Err(last_error)
}

/// Builds the delay schedule for a step's retries from its `RetryPolicy`.
/// `randomization_factor` is pinned to zero so the schedule is the exact
/// `initial * factor^n` sequence the policy declares, with no jitter.
fn retry_schedule(retry: pcore_domain::RetryPolicy) -> ExponentialBackoff {
    let mut schedule = ExponentialBackoff {
        initial_interval: Duration::from_secs(retry.initial_secs),
        multiplier: retry.factor,
        max_interval: Duration::from_secs(retry.max_secs),
        max_elapsed_time: None,
        randomization_factor: 0.0,
        ..Default::default()
    };
    schedule.reset();
    schedule
}

/// Groups consecutive steps sharing the same `parallel_group` into one
/// "stage" that runs concurrently; a step with an explicit non-empty
/// `depends_on` uses that instead of the stage's inferred predecessor.
fn resolve_dependencies(steps: &[StepDecl]) -> HashMap<String, Vec<String>> {
    let mut stages: Vec<Vec<&StepDecl>> = Vec::new();
    for step in steps {
        let same_group_as_last = step.parallel_group.is_some()
            && stages.last().and_then(|stage| stage.first()).map(|s| &s.parallel_group) == Some(&step.parallel_group);
        if same_group_as_last {
            stages.last_mut().unwrap().push(step);
        } else {
            stages.push(vec![step]);
        }
    }

    let mut deps = HashMap::new();
    let mut previous_stage_names: Vec<String> = Vec::new();
    for stage in &stages {
        let current_names: Vec<String> = stage.iter().map(|s| s.name.clone()).collect();
        for step in stage {
            let resolved = if step.depends_on.is_empty() { previous_stage_names.clone() } else { step.depends_on.clone() };
            deps.insert(step.name.clone(), resolved);
        }
        previous_stage_names = current_names;
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, depends_on: Vec<&str>, group: Option<&str>) -> StepDecl {
        StepDecl {
            name: name.to_string(),
            step_type: "wait".to_string(),
            config: serde_json::Value::Null,
            depends_on: depends_on.into_iter().map(str::to_string).collect(),
            parallel_group: group.map(str::to_string),
            retry: None,
            timeout_secs: None,
            on_failure: OnFailureAction::FailWorkflow,
        }
    }

    #[test]
    fn sequential_steps_chain_by_declaration_order() {
        let steps = vec![step("a", vec![], None), step("b", vec![], None)];
        let deps = resolve_dependencies(&steps);
        assert_eq!(deps["a"], Vec::<String>::new());
        assert_eq!(deps["b"], vec!["a".to_string()]);
    }

    #[test]
    fn parallel_group_members_share_the_same_predecessor() {
        let steps = vec![step("a", vec![], None), step("b", vec![], Some("g")), step("c", vec![], Some("g")), step("d", vec![], None)];
        let deps = resolve_dependencies(&steps);
        assert_eq!(deps["b"], vec!["a".to_string()]);
        assert_eq!(deps["c"], vec!["a".to_string()]);
        assert_eq!(deps["d"], vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn explicit_depends_on_overrides_stage_inference() {
        let steps = vec![step("a", vec![], None), step("b", vec![], None), step("c", vec!["a"], None)];
        let deps = resolve_dependencies(&steps);
        assert_eq!(deps["c"], vec!["a".to_string()]);
    }

    #[test]
    fn retry_schedule_follows_initial_times_factor_to_the_n() {
        let policy = pcore_domain::RetryPolicy { attempts: 3, initial_secs: 1, factor: 2.0, max_secs: 60 };
        let mut schedule = retry_schedule(policy);
        assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn retry_schedule_caps_at_max_interval() {
        let policy = pcore_domain::RetryPolicy { attempts: 10, initial_secs: 10, factor: 2.0, max_secs: 30 };
        let mut schedule = retry_schedule(policy);
        for _ in 0..4 {
            schedule.next_backoff();
        }
        assert_eq!(schedule.next_backoff(), Some(Duration::from_secs(30)));
    }
}
