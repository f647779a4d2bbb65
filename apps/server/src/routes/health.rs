//! Liveness endpoint, unauthenticated.

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

async fn health() -> &'static str {
    "ok"
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/healthz", get(health))
}
