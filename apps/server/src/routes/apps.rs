//! Spec ingestion and App reads.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pcore_domain::{App, AppId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::CallerContext;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestSpecRequest {
    /// Raw Score-style Spec YAML.
    pub yaml: String,
}

#[derive(Debug, Serialize)]
pub struct IngestSpecResponse {
    pub app_id: AppId,
}

async fn ingest_spec(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(request): Json<IngestSpecRequest>,
) -> Result<Json<IngestSpecResponse>, ApiError> {
    let app_id = state.core.ingest_spec(caller.identity, &request.yaml).await?;
    Ok(Json(IngestSpecResponse { app_id }))
}

async fn get_app(State(state): State<AppState>, caller: CallerContext, Path(app_id): Path<AppId>) -> Result<Json<App>, ApiError> {
    let app = state.core.get_app(caller.identity, &caller.permission, app_id).await?;
    Ok(Json(app))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(ingest_spec)).route("/{app_id}", get(get_app))
}
