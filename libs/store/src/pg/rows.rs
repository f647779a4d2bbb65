//! `sqlx::FromRow` row shapes and their conversion into domain types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use pcore_domain::{
    App, AppId, GraphEdge, GraphEdgeId, GraphEdgeType, GraphNode, GraphNodeId, GraphNodeType,
    NodeTiming, PropertyMap, Resource, ResourceId, ResourceState, Spec, SpecId, StepRun,
    StepRunId, StepRunStatus, WorkflowRun, WorkflowRunId, WorkflowRunStatus, WorkflowTrigger,
};

#[derive(FromRow)]
pub struct AppRow {
    pub app_id: uuid::Uuid,
    pub app_name: String,
    pub latest_spec_id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppRow> for App {
    fn from(row: AppRow) -> Self {
        Self {
            id: AppId::from_uuid(row.app_id),
            app_name: row.app_name,
            latest_spec_id: SpecId::from_uuid(row.latest_spec_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
pub struct SpecRow {
    pub spec_id: uuid::Uuid,
    pub app_id: uuid::Uuid,
    pub app_name: String,
    pub api_version: String,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SpecRow> for Spec {
    type Error = serde_json::Error;

    fn try_from(row: SpecRow) -> Result<Self, Self::Error> {
        #[derive(serde::Deserialize)]
        struct Document {
            metadata: HashMap<String, String>,
            containers: Vec<pcore_domain::ContainerDecl>,
            resources: Vec<pcore_domain::ResourceDecl>,
            workflow: Option<pcore_domain::WorkflowDecl>,
            environment: Option<pcore_domain::EnvironmentDecl>,
        }
        let doc: Document = serde_json::from_value(row.document)?;
        Ok(Self {
            id: SpecId::from_uuid(row.spec_id),
            app_id: AppId::from_uuid(row.app_id),
            app_name: row.app_name,
            api_version: row.api_version,
            metadata: doc.metadata,
            containers: doc.containers,
            resources: doc.resources,
            workflow: doc.workflow,
            environment: doc.environment,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
pub struct ResourceRow {
    pub resource_id: uuid::Uuid,
    pub app_id: uuid::Uuid,
    pub name: String,
    pub resource_type: String,
    pub properties: serde_json::Value,
    pub state: String,
    pub current_workflow_run_id: Option<uuid::Uuid>,
    pub outputs: serde_json::Value,
    pub health_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = serde_json::Error;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ResourceId::from_uuid(row.resource_id),
            app_id: AppId::from_uuid(row.app_id),
            name: row.name,
            resource_type: row.resource_type,
            properties: as_object(row.properties),
            state: parse_resource_state(&row.state),
            current_workflow_run_id: row.current_workflow_run_id.map(WorkflowRunId::from_uuid),
            outputs: as_object(row.outputs),
            health_checked_at: row.health_checked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct WorkflowRunRow {
    pub run_id: uuid::Uuid,
    pub app_id: uuid::Uuid,
    pub workflow_name: String,
    pub trigger: String,
    pub parameters: serde_json::Value,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub total_steps: i32,
    pub resource_id: Option<uuid::Uuid>,
}

impl From<WorkflowRunRow> for WorkflowRun {
    fn from(row: WorkflowRunRow) -> Self {
        Self {
            id: WorkflowRunId::from_uuid(row.run_id),
            app_id: AppId::from_uuid(row.app_id),
            workflow_name: row.workflow_name,
            trigger: parse_trigger(&row.trigger),
            parameters: as_object(row.parameters),
            status: parse_run_status(&row.status),
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            total_steps: row.total_steps.max(0) as u32,
            resource_id: row.resource_id.map(ResourceId::from_uuid),
        }
    }
}

#[derive(FromRow)]
pub struct StepRunRow {
    pub step_run_id: uuid::Uuid,
    pub workflow_run_id: uuid::Uuid,
    pub step_name: String,
    pub index: i32,
    pub step_type: String,
    pub config: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub outputs: serde_json::Value,
    pub log_ref: String,
}

impl From<StepRunRow> for StepRun {
    fn from(row: StepRunRow) -> Self {
        let outputs = serde_json::from_value(row.outputs).unwrap_or_default();
        Self {
            id: StepRunId::from_uuid(row.step_run_id),
            workflow_run_id: WorkflowRunId::from_uuid(row.workflow_run_id),
            step_name: row.step_name,
            index: row.index.max(0) as u32,
            step_type: row.step_type,
            config: row.config,
            status: parse_step_status(&row.status),
            attempts: row.attempts.max(0) as u32,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
            outputs,
            log_ref: row.log_ref,
        }
    }
}

#[derive(FromRow)]
pub struct GraphNodeRow {
    pub node_id: uuid::Uuid,
    pub app_id: uuid::Uuid,
    pub node_type: String,
    pub name: String,
    pub state: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub properties: serde_json::Value,
}

impl From<GraphNodeRow> for GraphNode {
    fn from(row: GraphNodeRow) -> Self {
        Self {
            id: GraphNodeId::from_uuid(row.node_id),
            app_id: AppId::from_uuid(row.app_id),
            node_type: parse_node_type(&row.node_type),
            name: row.name,
            state: row.state,
            timing: NodeTiming {
                started_at: row.started_at,
                completed_at: row.completed_at,
                duration_ms: row.duration_ms,
            },
            properties: as_object(row.properties),
        }
    }
}

#[derive(FromRow)]
pub struct GraphEdgeRow {
    pub edge_id: uuid::Uuid,
    pub app_id: uuid::Uuid,
    pub from_node: uuid::Uuid,
    pub to_node: uuid::Uuid,
    pub edge_type: String,
}

impl From<GraphEdgeRow> for GraphEdge {
    fn from(row: GraphEdgeRow) -> Self {
        Self {
            id: GraphEdgeId::from_uuid(row.edge_id),
            app_id: AppId::from_uuid(row.app_id),
            from: GraphNodeId::from_uuid(row.from_node),
            to: GraphNodeId::from_uuid(row.to_node),
            edge_type: parse_edge_type(&row.edge_type),
        }
    }
}

fn as_object(value: serde_json::Value) -> PropertyMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => PropertyMap::new(),
    }
}

fn parse_resource_state(s: &str) -> ResourceState {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(ResourceState::Failed)
}

fn parse_run_status(s: &str) -> WorkflowRunStatus {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(WorkflowRunStatus::Failed)
}

fn parse_step_status(s: &str) -> StepRunStatus {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(StepRunStatus::Failed)
}

fn parse_trigger(s: &str) -> WorkflowTrigger {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(WorkflowTrigger::Manual)
}

fn parse_node_type(s: &str) -> GraphNodeType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(GraphNodeType::Resource)
}

fn parse_edge_type(s: &str) -> GraphEdgeType {
    serde_json::from_value(serde_json::Value::String(s.to_string())).unwrap_or(GraphEdgeType::Contains)
}
