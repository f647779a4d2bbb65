//! Maps `CoreErrorKind` onto HTTP status codes and a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pcore_core::{CoreError, CoreErrorKind};
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    hints: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            CoreErrorKind::Validation => StatusCode::BAD_REQUEST,
            CoreErrorKind::Resolution => StatusCode::NOT_FOUND,
            CoreErrorKind::Admission => StatusCode::SERVICE_UNAVAILABLE,
            CoreErrorKind::Execution => StatusCode::UNPROCESSABLE_ENTITY,
            CoreErrorKind::StateConflict => StatusCode::CONFLICT,
            CoreErrorKind::StorageTransient => StatusCode::SERVICE_UNAVAILABLE,
            CoreErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            CoreErrorKind::Cancelled => StatusCode::GONE,
            CoreErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };

        let body = ErrorBody { error: format!("{:?}", self.0.kind), message: self.0.message, hints: self.0.hints };
        (status, Json(body)).into_response()
    }
}
