//! Caller identity and a minimal role predicate extracted from headers.
//!
//! Authentication and a real RBAC store are external collaborators;
//! this server only needs something that implements `PermissionPredicate` to
//! hand to `PlatformCore`'s read-boundary methods. `X-Caller-Id` and
//! `X-Caller-Roles` are a placeholder front door; a deployment with a real
//! identity provider replaces this extractor, not `PlatformCore`.

use std::collections::HashSet;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use pcore_domain::{CallerIdentity, PermissionPredicate};

use crate::error::ApiError;

const CALLER_ID_HEADER: &str = "x-caller-id";
const CALLER_ROLES_HEADER: &str = "x-caller-roles";

/// Roles-based predicate. `admin` allows every action; `viewer` and
/// `operator` allow the read-boundary actions `PlatformCore` gates.
#[derive(Debug, Clone, Default)]
pub struct RoleSetPermission {
    roles: HashSet<String>,
}

impl PermissionPredicate for RoleSetPermission {
    fn allows(&self, _caller: &CallerIdentity, action: &str) -> bool {
        if self.roles.contains("admin") {
            return true;
        }
        match action {
            "get_app" | "get_run" | "list_step_runs" | "tail_log" | "subscribe_graph" => {
                self.roles.contains("viewer") || self.roles.contains("operator")
            }
            _ => false,
        }
    }
}

/// Everything a route handler needs to call into `PlatformCore`.
pub struct CallerContext {
    pub identity: CallerIdentity,
    pub permission: RoleSetPermission,
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("anonymous");
        let roles = parts
            .headers
            .get(CALLER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self { identity: CallerIdentity::new(subject), permission: RoleSetPermission { roles } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_allows_every_action() {
        let perm = RoleSetPermission { roles: ["admin".to_string()].into_iter().collect() };
        assert!(perm.allows(&CallerIdentity::system(), "get_run"));
        assert!(perm.allows(&CallerIdentity::system(), "anything_else"));
    }

    #[test]
    fn viewer_role_allows_only_read_boundary_actions() {
        let perm = RoleSetPermission { roles: ["viewer".to_string()].into_iter().collect() };
        assert!(perm.allows(&CallerIdentity::system(), "get_app"));
        assert!(!perm.allows(&CallerIdentity::system(), "ingest_spec"));
    }

    #[test]
    fn no_roles_allows_nothing() {
        let perm = RoleSetPermission::default();
        assert!(!perm.allows(&CallerIdentity::system(), "get_run"));
    }
}
