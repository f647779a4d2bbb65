//! PostgreSQL-backed `Store`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use pcore_domain::{
    App, AppId, GraphEdge, GraphEdgeId, GraphEdgeType, GraphNode, GraphNodeId, GraphNodeType,
    PropertyMap, Resource, ResourceId, ResourceState, Spec, SpecId, StepRun, StepRunId,
    StepRunStatus, WorkflowRun, WorkflowRunId, WorkflowRunStatus,
};

use crate::errors::StoreError;
use crate::pg::rows::{
    AppRow, GraphEdgeRow, GraphNodeRow, ResourceRow, SpecRow, StepRunRow, WorkflowRunRow,
};
use crate::traits::{StepRunTransition, Store, Transaction};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct PgTransaction(SqlxTransaction<'static, Postgres>);

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.0.commit().await.map_err(StoreError::from)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.0.rollback().await.map_err(StoreError::from)
    }
}

fn status_str(s: impl std::fmt::Debug) -> String {
    format!("{s:?}").to_lowercase()
}

#[async_trait]
impl Store for PgStore {
    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx: SqlxTransaction<'static, Postgres> = self.pool.begin().await?;
        Ok(Box::new(PgTransaction(tx)))
    }

    async fn create_app(&self, app_name: &str) -> Result<App, StoreError> {
        let app_id = uuid::Uuid::now_v7();
        let spec_id = uuid::Uuid::now_v7();
        let row = sqlx::query_as::<_, AppRow>(
            r#"
            INSERT INTO apps (app_id, app_name, latest_spec_id)
            VALUES ($1, $2, $3)
            RETURNING app_id, app_name, latest_spec_id, created_at, updated_at
            "#,
        )
        .bind(app_id)
        .bind(app_name)
        .bind(spec_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.constraint() == Some("apps_app_name_key") {
                    return StoreError::Duplicate(format!("app {app_name}"));
                }
            }
            StoreError::from(e)
        })?;
        Ok(row.into())
    }

    async fn get_app(&self, id: AppId) -> Result<App, StoreError> {
        let row = sqlx::query_as::<_, AppRow>(
            "SELECT app_id, app_name, latest_spec_id, created_at, updated_at FROM apps WHERE app_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("app {id}")))?;
        Ok(row.into())
    }

    async fn get_app_by_name(&self, app_name: &str) -> Result<Option<App>, StoreError> {
        let row = sqlx::query_as::<_, AppRow>(
            "SELECT app_id, app_name, latest_spec_id, created_at, updated_at FROM apps WHERE app_name = $1",
        )
        .bind(app_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_apps(&self) -> Result<Vec<App>, StoreError> {
        let rows = sqlx::query_as::<_, AppRow>(
            "SELECT app_id, app_name, latest_spec_id, created_at, updated_at FROM apps",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_spec(&self, spec: Spec) -> Result<SpecId, StoreError> {
        let document = serde_json::json!({
            "metadata": spec.metadata,
            "containers": spec.containers,
            "resources": spec.resources,
            "workflow": spec.workflow,
            "environment": spec.environment,
        });

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO spec_revisions (spec_id, app_id, app_name, api_version, document, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(spec.id.as_uuid())
        .bind(spec.app_id.as_uuid())
        .bind(&spec.app_name)
        .bind(&spec.api_version)
        .bind(&document)
        .bind(spec.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE apps SET latest_spec_id = $2, updated_at = NOW() WHERE app_id = $1")
            .bind(spec.app_id.as_uuid())
            .bind(spec.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(spec.id)
    }

    async fn get_latest_spec(&self, app_id: AppId) -> Result<Spec, StoreError> {
        let row = sqlx::query_as::<_, SpecRow>(
            r#"
            SELECT s.spec_id, s.app_id, s.app_name, s.api_version, s.document, s.created_at
            FROM spec_revisions s
            JOIN apps a ON a.latest_spec_id = s.spec_id
            WHERE a.app_id = $1
            "#,
        )
        .bind(app_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("spec for app {app_id}")))?;
        row.try_into()
            .map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e)))
    }

    async fn create_resource(&self, resource: Resource) -> Result<Resource, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            INSERT INTO resources (
                resource_id, app_id, name, resource_type, properties, state,
                current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING resource_id, app_id, name, resource_type, properties, state,
                      current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            "#,
        )
        .bind(resource.id.as_uuid())
        .bind(resource.app_id.as_uuid())
        .bind(&resource.name)
        .bind(&resource.resource_type)
        .bind(serde_json::Value::Object(resource.properties.clone()))
        .bind(status_str(resource.state))
        .bind(resource.current_workflow_run_id.map(|id| *id.as_uuid()))
        .bind(serde_json::Value::Object(resource.outputs.clone()))
        .bind(resource.health_checked_at)
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.constraint() == Some("resources_app_id_name_key") {
                    return StoreError::Duplicate(format!("resource {}", resource.name));
                }
            }
            StoreError::from(e)
        })?;
        row.try_into()
            .map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e)))
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT resource_id, app_id, name, resource_type, properties, state,
                   current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            FROM resources WHERE resource_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("resource {id}")))?;
        row.try_into()
            .map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e)))
    }

    async fn transition_resource(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
    ) -> Result<Resource, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            UPDATE resources
            SET state = $3, updated_at = NOW()
            WHERE resource_id = $1 AND state = $2
            RETURNING resource_id, app_id, name, resource_type, properties, state,
                      current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(status_str(expected))
        .bind(status_str(new_state))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row
                .try_into()
                .map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e))),
            None => {
                let current = self.get_resource(id).await?;
                Err(StoreError::StateConflict {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", current.state),
                })
            }
        }
    }

    async fn claim_resource_for_provisioning(
        &self,
        resource_id: ResourceId,
        run_id: WorkflowRunId,
    ) -> Result<bool, StoreError> {
        let claimed = sqlx::query(
            r#"
            UPDATE resources
            SET state = 'provisioning', current_workflow_run_id = $2, updated_at = NOW()
            WHERE resource_id = $1 AND state = 'requested' AND current_workflow_run_id IS NULL
            "#,
        )
        .bind(resource_id.as_uuid())
        .bind(run_id.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        Ok(claimed)
    }

    async fn complete_resource_provisioning(
        &self,
        id: ResourceId,
        expected: ResourceState,
        new_state: ResourceState,
        outputs: PropertyMap,
    ) -> Result<Resource, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            UPDATE resources
            SET state = $3, outputs = outputs || $4, current_workflow_run_id = NULL, updated_at = NOW()
            WHERE resource_id = $1 AND state = $2
            RETURNING resource_id, app_id, name, resource_type, properties, state,
                      current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(status_str(expected))
        .bind(status_str(new_state))
        .bind(serde_json::Value::Object(outputs))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row
                .try_into()
                .map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e))),
            None => {
                let current = self.get_resource(id).await?;
                Err(StoreError::StateConflict {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", current.state),
                })
            }
        }
    }

    async fn list_resources_for_app(&self, app_id: AppId) -> Result<Vec<Resource>, StoreError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT resource_id, app_id, name, resource_type, properties, state,
                   current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            FROM resources WHERE app_id = $1
            "#,
        )
        .bind(app_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| r.try_into().map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e))))
            .collect()
    }

    async fn list_pending_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT resource_id, app_id, name, resource_type, properties, state,
                   current_workflow_run_id, outputs, health_checked_at, created_at, updated_at
            FROM resources WHERE state = 'requested'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| r.try_into().map_err(|e: serde_json::Error| StoreError::StorageUnavailable(Box::new(e))))
            .collect()
    }

    async fn touch_resource_health_check(
        &self,
        id: ResourceId,
        checked_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE resources SET health_checked_at = $2 WHERE resource_id = $1")
            .bind(id.as_uuid())
            .bind(checked_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("resource {id}")));
        }
        Ok(())
    }

    async fn create_workflow_run(&self, run: WorkflowRun) -> Result<WorkflowRun, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            INSERT INTO workflow_runs (
                run_id, app_id, workflow_name, trigger, parameters, status, total_steps, resource_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING run_id, app_id, workflow_name, trigger, parameters, status,
                      started_at, completed_at, error_message, total_steps, resource_id
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(run.app_id.as_uuid())
        .bind(&run.workflow_name)
        .bind(status_str(run.trigger))
        .bind(serde_json::Value::Object(run.parameters.clone()))
        .bind(status_str(run.status))
        .bind(i32::try_from(run.total_steps).unwrap_or(i32::MAX))
        .bind(run.resource_id.map(|id| id.as_uuid()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_workflow_run(&self, id: WorkflowRunId) -> Result<WorkflowRun, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            SELECT run_id, app_id, workflow_name, trigger, parameters, status,
                   started_at, completed_at, error_message, total_steps, resource_id
            FROM workflow_runs WHERE run_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        Ok(row.into())
    }

    async fn transition_workflow_run(
        &self,
        id: WorkflowRunId,
        expected: WorkflowRunStatus,
        new_status: WorkflowRunStatus,
        error_message: Option<String>,
    ) -> Result<WorkflowRun, StoreError> {
        let is_terminal = new_status.is_terminal();
        let starting = expected == WorkflowRunStatus::Pending && new_status == WorkflowRunStatus::Running;
        let row = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            UPDATE workflow_runs
            SET status = $3,
                error_message = COALESCE($4, error_message),
                started_at = CASE WHEN $5 THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $6 THEN NOW() ELSE completed_at END
            WHERE run_id = $1 AND status = $2
            RETURNING run_id, app_id, workflow_name, trigger, parameters, status,
                      started_at, completed_at, error_message, total_steps, resource_id
            "#,
        )
        .bind(id.as_uuid())
        .bind(status_str(expected))
        .bind(status_str(new_status))
        .bind(error_message)
        .bind(starting)
        .bind(is_terminal)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.get_workflow_run(id).await?;
                Err(StoreError::StateConflict {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", current.status),
                })
            }
        }
    }

    async fn list_active_runs(&self) -> Result<Vec<WorkflowRun>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRunRow>(
            r#"
            SELECT run_id, app_id, workflow_name, trigger, parameters, status,
                   started_at, completed_at, error_message, total_steps, resource_id
            FROM workflow_runs WHERE status IN ('pending', 'running')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_step_run(&self, step: StepRun) -> Result<StepRun, StoreError> {
        let row = sqlx::query_as::<_, StepRunRow>(
            r#"
            INSERT INTO step_runs (
                step_run_id, workflow_run_id, step_name, index, step_type, config,
                status, attempts, outputs, log_ref
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING step_run_id, workflow_run_id, step_name, index, step_type, config,
                      status, attempts, started_at, completed_at, duration_ms,
                      error_message, outputs, log_ref
            "#,
        )
        .bind(step.id.as_uuid())
        .bind(step.workflow_run_id.as_uuid())
        .bind(&step.step_name)
        .bind(i32::try_from(step.index).unwrap_or(i32::MAX))
        .bind(&step.step_type)
        .bind(&step.config)
        .bind(status_str(step.status))
        .bind(i32::try_from(step.attempts).unwrap_or(i32::MAX))
        .bind(serde_json::to_value(&step.outputs).unwrap_or_default())
        .bind(&step.log_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_step_run(&self, id: StepRunId) -> Result<StepRun, StoreError> {
        let row = sqlx::query_as::<_, StepRunRow>(
            r#"
            SELECT step_run_id, workflow_run_id, step_name, index, step_type, config,
                   status, attempts, started_at, completed_at, duration_ms,
                   error_message, outputs, log_ref
            FROM step_runs WHERE step_run_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("step {id}")))?;
        Ok(row.into())
    }

    async fn list_step_runs(&self, workflow_run_id: WorkflowRunId) -> Result<Vec<StepRun>, StoreError> {
        let rows = sqlx::query_as::<_, StepRunRow>(
            r#"
            SELECT step_run_id, workflow_run_id, step_name, index, step_type, config,
                   status, attempts, started_at, completed_at, duration_ms,
                   error_message, outputs, log_ref
            FROM step_runs WHERE workflow_run_id = $1 ORDER BY index
            "#,
        )
        .bind(workflow_run_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn transition_step_run(
        &self,
        id: StepRunId,
        expected: StepRunStatus,
        new_status: StepRunStatus,
        update: StepRunTransition,
    ) -> Result<StepRun, StoreError> {
        let outputs_json = update.outputs.map(|o| serde_json::to_value(o).unwrap_or_default());
        let starting = expected == StepRunStatus::Pending && new_status == StepRunStatus::Running;
        let completing = new_status.is_terminal();
        let row = sqlx::query_as::<_, StepRunRow>(
            r#"
            UPDATE step_runs
            SET status = $3,
                attempts = COALESCE($4, attempts),
                error_message = COALESCE($5, error_message),
                outputs = COALESCE($6, outputs),
                duration_ms = COALESCE($7, duration_ms),
                started_at = CASE WHEN $8 THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $9 THEN NOW() ELSE completed_at END
            WHERE step_run_id = $1 AND status = $2
            RETURNING step_run_id, workflow_run_id, step_name, index, step_type, config,
                      status, attempts, started_at, completed_at, duration_ms,
                      error_message, outputs, log_ref
            "#,
        )
        .bind(id.as_uuid())
        .bind(status_str(expected))
        .bind(status_str(new_status))
        .bind(update.attempts.and_then(|a| i32::try_from(a).ok()))
        .bind(update.error_message)
        .bind(outputs_json)
        .bind(update.duration_ms)
        .bind(starting)
        .bind(completing)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.get_step_run(id).await?;
                Err(StoreError::StateConflict {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", current.status),
                })
            }
        }
    }

    async fn append_log(&self, step_run_id: StepRunId, bytes: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO step_logs (step_run_id, seq, data)
            VALUES ($1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM step_logs WHERE step_run_id = $1), $2)
            "#,
        )
        .bind(step_run_id.as_uuid())
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_log(&self, step_run_id: StepRunId, from_offset: usize) -> Result<Vec<u8>, StoreError> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            "SELECT data FROM step_logs WHERE step_run_id = $1 ORDER BY seq",
        )
        .bind(step_run_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        let all: Vec<u8> = rows.into_iter().flat_map(|(d,)| d).collect();
        Ok(all.get(from_offset..).unwrap_or_default().to_vec())
    }

    async fn add_graph_node(&self, node: GraphNode) -> Result<GraphNode, StoreError> {
        let row = sqlx::query_as::<_, GraphNodeRow>(
            r#"
            INSERT INTO graph_nodes (node_id, app_id, node_type, name, state, properties)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING node_id, app_id, node_type, name, state, started_at, completed_at, duration_ms, properties
            "#,
        )
        .bind(node.id.as_uuid())
        .bind(node.app_id.as_uuid())
        .bind(status_str(node.node_type))
        .bind(&node.name)
        .bind(&node.state)
        .bind(serde_json::Value::Object(node.properties.clone()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_graph_node_state(&self, id: GraphNodeId, state: String) -> Result<(), StoreError> {
        let affected = sqlx::query("UPDATE graph_nodes SET state = $2 WHERE node_id = $1")
            .bind(id.as_uuid())
            .bind(state)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("graph node {id}")));
        }
        Ok(())
    }

    async fn add_graph_edge(&self, edge: GraphEdge) -> Result<GraphEdge, StoreError> {
        if edge.from == edge.to {
            return Err(StoreError::Duplicate("self-edge rejected".to_string()));
        }
        let row = sqlx::query_as::<_, GraphEdgeRow>(
            r#"
            INSERT INTO graph_edges (edge_id, app_id, from_node, to_node, edge_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING edge_id, app_id, from_node, to_node, edge_type
            "#,
        )
        .bind(edge.id.as_uuid())
        .bind(edge.app_id.as_uuid())
        .bind(edge.from.as_uuid())
        .bind(edge.to.as_uuid())
        .bind(status_str(edge.edge_type))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_graph_nodes(
        &self,
        app_id: AppId,
        node_type: Option<GraphNodeType>,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let rows = sqlx::query_as::<_, GraphNodeRow>(
            r#"
            SELECT node_id, app_id, node_type, name, state, started_at, completed_at, duration_ms, properties
            FROM graph_nodes
            WHERE app_id = $1 AND ($2::text IS NULL OR node_type = $2)
            "#,
        )
        .bind(app_id.as_uuid())
        .bind(node_type.map(status_str))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_graph_edges(
        &self,
        app_id: AppId,
        edge_type: Option<GraphEdgeType>,
    ) -> Result<Vec<GraphEdge>, StoreError> {
        let rows = sqlx::query_as::<_, GraphEdgeRow>(
            r#"
            SELECT edge_id, app_id, from_node, to_node, edge_type
            FROM graph_edges
            WHERE app_id = $1 AND ($2::text IS NULL OR edge_type = $2)
            "#,
        )
        .bind(app_id.as_uuid())
        .bind(edge_type.map(status_str))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn try_acquire_reconciler_lease(&self, holder: &str, ttl_secs: i64) -> Result<bool, StoreError> {
        let acquired = sqlx::query(
            r#"
            INSERT INTO reconciler_leases (id, holder, expires_at)
            VALUES (1, $1, NOW() + make_interval(secs => $2))
            ON CONFLICT (id) DO UPDATE
            SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
            WHERE reconciler_leases.expires_at <= NOW() OR reconciler_leases.holder = EXCLUDED.holder
            "#,
        )
        .bind(holder)
        .bind(ttl_secs as f64)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        Ok(acquired)
    }
}
