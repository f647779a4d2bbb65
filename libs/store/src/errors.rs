//! Store failure taxonomy.

use thiserror::Error;

/// The Store's failure taxonomy. `StorageUnavailable` is the only variant a
/// caller should retry, with exponential backoff capped at 30s; all others
/// are terminal for the calling operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("state conflict: expected {expected}, found {actual}")]
    StateConflict { expected: String, actual: String },

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("storage unavailable")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::StorageUnavailable(Box::new(other)),
        }
    }
}
