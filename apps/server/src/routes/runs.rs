//! Golden-path/retry launches, cancellation, and run/step reads.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pcore_domain::{AppId, StepRun, StepRunId, WorkflowRun, WorkflowRunId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::CallerContext;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunGoldenPathRequest {
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct RunIdResponse {
    pub run_id: WorkflowRunId,
}

async fn run_golden_path(
    State(state): State<AppState>,
    caller: CallerContext,
    Path((app_id, path_name)): Path<(AppId, String)>,
    Json(request): Json<RunGoldenPathRequest>,
) -> Result<Json<RunIdResponse>, ApiError> {
    let run_id = state.core.run_golden_path(caller.identity, app_id, &path_name, request.params).await?;
    Ok(Json(RunIdResponse { run_id }))
}

async fn retry_run(State(state): State<AppState>, caller: CallerContext, Path(run_id): Path<WorkflowRunId>) -> Result<Json<RunIdResponse>, ApiError> {
    let new_run_id = state.core.retry_run(caller.identity, run_id).await?;
    Ok(Json(RunIdResponse { run_id: new_run_id }))
}

async fn cancel_run(State(state): State<AppState>, caller: CallerContext, Path(run_id): Path<WorkflowRunId>) -> Result<(), ApiError> {
    state.core.cancel_run(caller.identity, run_id).await?;
    Ok(())
}

async fn get_run(State(state): State<AppState>, caller: CallerContext, Path(run_id): Path<WorkflowRunId>) -> Result<Json<WorkflowRun>, ApiError> {
    let run = state.core.get_run(caller.identity, &caller.permission, run_id).await?;
    Ok(Json(run))
}

async fn list_step_runs(State(state): State<AppState>, caller: CallerContext, Path(run_id): Path<WorkflowRunId>) -> Result<Json<Vec<StepRun>>, ApiError> {
    let steps = state.core.list_step_runs(caller.identity, &caller.permission, run_id).await?;
    Ok(Json(steps))
}

#[derive(Debug, Deserialize)]
pub struct TailLogQuery {
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct TailLogResponse {
    pub offset: usize,
    /// Log bytes already written, decoded lossily for transport as JSON text.
    pub data: String,
}

async fn tail_log(
    State(state): State<AppState>,
    caller: CallerContext,
    Path((_run_id, step_run_id)): Path<(WorkflowRunId, StepRunId)>,
    Query(query): Query<TailLogQuery>,
) -> Result<Json<TailLogResponse>, ApiError> {
    let (bytes, _receiver) = state.core.tail_log(caller.identity, &caller.permission, step_run_id, query.offset).await?;
    Ok(Json(TailLogResponse { offset: query.offset + bytes.len(), data: String::from_utf8_lossy(&bytes).into_owned() }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/apps/{app_id}/golden-paths/{path_name}", post(run_golden_path))
        .route("/runs/{run_id}", get(get_run))
        .route("/runs/{run_id}/retry", post(retry_run))
        .route("/runs/{run_id}/cancel", post(cancel_run))
        .route("/runs/{run_id}/steps", get(list_step_runs))
        .route("/runs/{run_id}/steps/{step_run_id}/log", get(tail_log))
}
