//! WebSocket surfaces: live log tailing and graph subscription.
//!
//! Mirrors the broadcast-channel-to-socket forwarding shape used for queue
//! updates in `ws::hub`, generalized to the two broadcast-backed
//! subscriptions `PlatformCore` exposes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use pcore_domain::{AppId, StepRunId, WorkflowRunId};

use crate::error::ApiError;
use crate::identity::CallerContext;
use crate::state::AppState;

async fn log_socket(
    State(state): State<AppState>,
    caller: CallerContext,
    Path((_run_id, step_run_id)): Path<(WorkflowRunId, StepRunId)>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let (initial, receiver) = state.core.tail_log(caller.identity, &caller.permission, step_run_id, 0).await?;
    Ok(ws.on_upgrade(move |socket| forward_log(socket, initial, receiver)))
}

async fn forward_log(mut socket: WebSocket, initial: Vec<u8>, mut receiver: tokio::sync::broadcast::Receiver<pcore_workflow_engine::LogChunk>) {
    if !initial.is_empty() && socket.send(Message::Binary(initial.into())).await.is_err() {
        return;
    }
    loop {
        match receiver.recv().await {
            Ok(chunk) => {
                let eof = chunk.eof;
                if socket.send(Message::Binary(chunk.data.into())).await.is_err() {
                    return;
                }
                if eof {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn graph_socket(State(state): State<AppState>, caller: CallerContext, Path(app_id): Path<AppId>, ws: WebSocketUpgrade) -> Result<impl IntoResponse, ApiError> {
    let receiver = state.core.subscribe_graph(caller.identity, &caller.permission, app_id).await?;
    Ok(ws.on_upgrade(move |socket| forward_graph(socket, receiver)))
}

async fn forward_graph(mut socket: WebSocket, mut receiver: tokio::sync::broadcast::Receiver<pcore_graph::GraphSnapshot>) {
    loop {
        match receiver.recv().await {
            Ok(snapshot) => {
                let Ok(text) = serde_json::to_string(&GraphSnapshotWire::from(snapshot)) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[derive(serde::Serialize)]
struct GraphSnapshotWire {
    app_id: AppId,
    nodes: Vec<pcore_domain::GraphNode>,
    edges: Vec<pcore_domain::GraphEdge>,
}

impl From<pcore_graph::GraphSnapshot> for GraphSnapshotWire {
    fn from(snapshot: pcore_graph::GraphSnapshot) -> Self {
        Self { app_id: snapshot.app_id, nodes: snapshot.nodes, edges: snapshot.edges }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/runs/{run_id}/steps/{step_run_id}/log", get(log_socket))
        .route("/apps/{app_id}/graph", get(graph_socket))
}
