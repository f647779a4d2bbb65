//! Persisted resource instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::ResourceState;
use crate::ids::{AppId, ResourceId, WorkflowRunId};
use crate::spec::PropertyMap;

/// A persisted resource instance, one per `ResourceDecl.name` per App.
///
/// Invariant: at most one `current_workflow_run_id` is non-null at any time;
/// this is enforced by the Store's `ClaimResourceForProvisioning` CAS, not
/// by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub app_id: AppId,
    pub name: String,
    pub resource_type: String,
    pub properties: PropertyMap,
    pub state: ResourceState,
    pub current_workflow_run_id: Option<WorkflowRunId>,
    /// e.g. `host`, `port`, `username`, `password`, `connection_string`.
    pub outputs: PropertyMap,
    pub health_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// A freshly declared resource, not yet claimed by any run.
    #[must_use]
    pub fn requested(app_id: AppId, name: String, resource_type: String, properties: PropertyMap) -> Self {
        let now = Utc::now();
        Self {
            id: ResourceId::new(),
            app_id,
            name,
            resource_type,
            properties,
            state: ResourceState::Requested,
            current_workflow_run_id: None,
            outputs: PropertyMap::new(),
            health_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this resource is eligible for a reconciler health check,
    /// given `health_check_interval_secs` (default 5 min).
    #[must_use]
    pub fn needs_health_check(&self, now: DateTime<Utc>, health_check_interval_secs: i64) -> bool {
        if self.state != ResourceState::Active {
            return false;
        }
        match self.health_checked_at {
            None => true,
            Some(last) => (now - last).num_seconds() >= health_check_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_resource_has_no_owning_run() {
        let r = Resource::requested(
            AppId::new(),
            "db".to_string(),
            "postgres".to_string(),
            PropertyMap::new(),
        );
        assert_eq!(r.state, ResourceState::Requested);
        assert!(r.current_workflow_run_id.is_none());
    }

    #[test]
    fn non_active_resource_never_needs_health_check() {
        let r = Resource::requested(
            AppId::new(),
            "db".to_string(),
            "postgres".to_string(),
            PropertyMap::new(),
        );
        assert!(!r.needs_health_check(Utc::now(), 300));
    }
}
