//! Caller identity threaded through the core for audit purposes only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of whoever triggered a call into the core.
///
/// The core never interprets this value for authorization; RBAC and
/// authentication are external collaborators (see `PermissionPredicate` in
/// `pcore-core`). `CallerIdentity` exists purely so that `StepContext`,
/// audit logs, and `WorkflowRun.trigger` metadata can record who asked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// Identity used for reconciler- and engine-internal calls that have no
    /// external caller (crash recovery, scheduled ticks).
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CallerIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallerIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Predicate supplied by the collaborator that owns RBAC; the core calls it
/// at read boundaries (`GetApp`, `GetRun`, `TailLog`, `SubscribeGraph`) but
/// never evaluates permission logic itself.
pub trait PermissionPredicate: Send + Sync {
    fn allows(&self, caller: &CallerIdentity, action: &str) -> bool;
}

/// A predicate that allows everything; used by tests and single-tenant CLI
/// callers that have no RBAC layer in front of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionPredicate for AllowAll {
    fn allows(&self, _caller: &CallerIdentity, _action: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_identity_is_stable() {
        assert_eq!(CallerIdentity::system().as_str(), "system");
    }

    #[test]
    fn allow_all_allows_everything() {
        let caller = CallerIdentity::new("user_123");
        assert!(AllowAll.allows(&caller, "get_run"));
    }
}
