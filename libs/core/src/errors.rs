//! The public error taxonomy: a kind plus a short message plus
//! remediation hints attached by a pure function of the two.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreErrorKind {
    /// Malformed Spec, manifest, or parameters. Never retried.
    Validation,
    /// No provider for a resource type; capability conflict; unknown golden path.
    Resolution,
    /// Queue full, lock acquisition timeout. Caller may retry.
    Admission,
    /// Step failure inside an executor, surfaced via run/step status.
    Execution,
    /// Optimistic transition lost the race past its retry budget.
    StateConflict,
    /// Storage exhausted its capped backoff budget.
    StorageTransient,
    /// Invariant violation; logged as fatal, the affected run is failed.
    Internal,
    Cancelled,
    Timeout,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub message: String,
    pub hints: Vec<String>,
}

impl CoreError {
    #[must_use]
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let hints = remediation_hint(kind, &message);
        Self { kind, message, hints }
    }
}

/// Attaches remediation hints to an error kind + context message. Pure: it
/// never touches the Store, the registry, or anything stateful, and never
/// alters control flow.
#[must_use]
pub fn remediation_hint(kind: CoreErrorKind, context: &str) -> Vec<String> {
    match kind {
        CoreErrorKind::Validation => {
            vec![format!("fix the input and re-submit: {context}")]
        }
        CoreErrorKind::Resolution => {
            vec![format!("{context}; check registered providers and golden paths")]
        }
        CoreErrorKind::Admission => {
            vec!["the run was not accepted; retry after a short backoff".to_string()]
        }
        CoreErrorKind::Execution => {
            vec![format!("inspect the failing step's log: {context}")]
        }
        CoreErrorKind::StateConflict => {
            vec!["lost a race with a concurrent transition; retrying the same call is safe".to_string()]
        }
        CoreErrorKind::StorageTransient => {
            vec!["storage is temporarily unavailable; retry with backoff".to_string()]
        }
        CoreErrorKind::Internal => {
            vec!["an invariant was violated; the affected run was marked failed".to_string()]
        }
        CoreErrorKind::Cancelled => {
            vec!["the run was cancelled by a caller".to_string()]
        }
        CoreErrorKind::Timeout => {
            vec!["the run or step exceeded its configured timeout".to_string()]
        }
    }
}

impl From<pcore_store::StoreError> for CoreError {
    fn from(err: pcore_store::StoreError) -> Self {
        let kind = match &err {
            pcore_store::StoreError::StorageUnavailable(_) => CoreErrorKind::StorageTransient,
            pcore_store::StoreError::StateConflict { .. } => CoreErrorKind::StateConflict,
            pcore_store::StoreError::NotFound(_) | pcore_store::StoreError::Duplicate(_) => CoreErrorKind::Validation,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<pcore_providers::ProviderError> for CoreError {
    fn from(err: pcore_providers::ProviderError) -> Self {
        Self::new(CoreErrorKind::Resolution, err.to_string())
    }
}

impl From<pcore_providers::ParamsError> for CoreError {
    fn from(err: pcore_providers::ParamsError) -> Self {
        Self::new(CoreErrorKind::Validation, err.to_string())
    }
}

impl From<crate::ingest::IngestError> for CoreError {
    fn from(err: crate::ingest::IngestError) -> Self {
        Self::new(CoreErrorKind::Validation, err.to_string())
    }
}

impl From<pcore_workflow_engine::EngineError> for CoreError {
    fn from(err: pcore_workflow_engine::EngineError) -> Self {
        Self::new(CoreErrorKind::Execution, err.to_string())
    }
}

impl From<pcore_workflow_engine::LogStreamError> for CoreError {
    fn from(err: pcore_workflow_engine::LogStreamError) -> Self {
        match err {
            pcore_workflow_engine::LogStreamError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<pcore_graph::GraphError> for CoreError {
    fn from(err: pcore_graph::GraphError) -> Self {
        Self::new(CoreErrorKind::Internal, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_hint_mentions_checking_providers() {
        let hints = remediation_hint(CoreErrorKind::Resolution, "resource type 'postgres' has no provider");
        assert!(hints[0].contains("registered providers"));
    }

    #[test]
    fn store_error_kinds_map_to_distinct_core_error_kinds() {
        let retryable: CoreError = pcore_store::StoreError::StorageUnavailable(Box::new(std::io::Error::other("down"))).into();
        assert_eq!(retryable.kind, CoreErrorKind::StorageTransient);

        let not_found: CoreError = pcore_store::StoreError::NotFound("app".to_string()).into();
        assert_eq!(not_found.kind, CoreErrorKind::Validation);
    }
}
