//! Spec, App, and their nested declarations: the ingested, immutable
//! description of a workload.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::EnvironmentType;
use crate::ids::{AppId, SpecId};
use crate::workflow::WorkflowDecl;

/// Arbitrary structured properties carried on resources, containers, and
/// step configs. Kept as a JSON object rather than a typed struct because
/// the shape is provider- and step-type-defined, not core-defined.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// A parsed, immutable Score-style workload document.
///
/// Re-ingesting the same `app_name` creates a new `Spec` revision linked to
/// the same [`App`] root; it never mutates a prior revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub id: SpecId,
    pub app_id: AppId,
    pub app_name: String,
    pub api_version: String,
    pub metadata: HashMap<String, String>,
    pub containers: Vec<ContainerDecl>,
    pub resources: Vec<ResourceDecl>,
    pub workflow: Option<WorkflowDecl>,
    pub environment: Option<EnvironmentDecl>,
    pub created_at: DateTime<Utc>,
}

/// `containers.<name>` entry of a Spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDecl {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
    pub resources: Option<ContainerResources>,
    /// Opaque probe shape (e.g. `httpGet`, `initialDelaySeconds`); not
    /// interpreted by the core, only carried through to whatever executor
    /// renders the container spec.
    #[serde(rename = "livenessProbe")]
    pub liveness_probe: Option<PropertyMap>,
    #[serde(rename = "readinessProbe")]
    pub readiness_probe: Option<PropertyMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerPort {
    pub port: u16,
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerResources {
    pub requests: Option<PropertyMap>,
    pub limits: Option<PropertyMap>,
}

/// `resources.<name>` entry of a Spec. `name` is unique within a Spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// `environment` block of a Spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDecl {
    #[serde(rename = "type")]
    pub environment_type: EnvironmentType,
    /// TTL, e.g. for ephemeral environments that should be torn down.
    pub ttl: Option<String>,
}

/// Logical aggregate keyed by `app_name`. Owns the latest Spec revision, all
/// Resources, all WorkflowRuns, and all Graph nodes for that app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub app_name: String,
    pub latest_spec_id: SpecId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_decl_rejects_missing_type_at_parse() {
        let json = serde_json::json!({"name": "db", "properties": {}});
        let result: Result<ResourceDecl, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn resource_decl_defaults_properties_to_empty() {
        let json = serde_json::json!({"name": "db", "type": "postgres"});
        let decl: ResourceDecl = serde_json::from_value(json).unwrap();
        assert!(decl.properties.is_empty());
    }
}
