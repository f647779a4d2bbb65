//! HTTP and WebSocket route definitions.

mod apps;
mod health;
mod runs;
mod ws;

use axum::Router;

use crate::state::AppState;

/// Build the full router: REST under `/api/v1`, WebSocket surfaces under `/ws`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/api/v1/apps", apps::routes())
        .nest("/api/v1", runs::routes())
        .nest("/ws", ws::routes())
}
