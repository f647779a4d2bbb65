//! Score-style Spec ingestion: YAML parsing, the `params`→`properties`
//! rewrite, and map-keyed containers/resources flattened into the domain's
//! named-list shape.

use std::collections::HashMap;

use chrono::Utc;
use pcore_domain::{
    AppId, CallerIdentity, ContainerDecl, ContainerPort, ContainerResources, EnvironmentDecl,
    ParameterSchema, PropertyMap, ResourceDecl, Spec, SpecId, StepDecl, WorkflowDecl,
};
use pcore_workflow_engine::{validate_workflow, ValidationError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid spec YAML: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("spec is missing metadata.name")]
    MissingAppName,
    #[error("inline workflow is invalid: {0}")]
    InlineWorkflow(#[from] ValidationError),
    #[error("legacy 'params' field used on resource '{resource}' while STRICT_PROPERTIES is enabled")]
    LegacyParamsRejected { resource: String },
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    #[serde(rename = "apiVersion")]
    api_version: String,
    metadata: HashMap<String, String>,
    #[serde(default)]
    containers: HashMap<String, RawContainer>,
    #[serde(default)]
    resources: HashMap<String, RawResource>,
    environment: Option<EnvironmentDecl>,
    workflow: Option<RawWorkflow>,
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    image: String,
    #[serde(default)]
    variables: HashMap<String, String>,
    #[serde(default)]
    ports: Vec<ContainerPort>,
    resources: Option<ContainerResources>,
    #[serde(rename = "livenessProbe")]
    liveness_probe: Option<PropertyMap>,
    #[serde(rename = "readinessProbe")]
    readiness_probe: Option<PropertyMap>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    properties: Option<PropertyMap>,
    /// Legacy alias for `properties`, rewritten at parse time.
    params: Option<PropertyMap>,
}

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    name: Option<String>,
    steps: Vec<StepDecl>,
    #[serde(default)]
    parameters: HashMap<String, ParameterSchema>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

/// Result of a successful ingest: the parsed [`Spec`] plus whether the
/// legacy `params` alias was used anywhere in it (one warning, not one per
/// resource).
pub struct ParsedSpec {
    pub spec: Spec,
    pub used_legacy_params: bool,
}

/// Reads just `metadata.name` out of a Spec document, before the `App` it
/// names exists or has been looked up. Callers use this to resolve an
/// [`AppId`] (creating the `App` on first sight) prior to the full
/// [`parse_spec`] call, which needs that id already in hand.
pub fn peek_app_name(yaml: &str) -> Result<String, IngestError> {
    let raw: RawSpec = serde_yml::from_str(yaml)?;
    raw.metadata.get("name").cloned().ok_or(IngestError::MissingAppName)
}

/// Parses a Score-style YAML document into a [`Spec`] for the app identified
/// by `app_id`/`app_name` (already resolved via [`peek_app_name`] and a
/// store lookup or creation).
///
/// `strict_properties` corresponds to the `STRICT_PROPERTIES` env flag
/// (default `false`): when `true`, a resource using the legacy `params`
/// field is rejected instead of rewritten.
pub fn parse_spec(
    app_id: AppId,
    app_name: &str,
    yaml: &str,
    known_step_types: &[&str],
    strict_properties: bool,
) -> Result<ParsedSpec, IngestError> {
    let raw: RawSpec = serde_yml::from_str(yaml)?;
    if !raw.metadata.contains_key("name") {
        return Err(IngestError::MissingAppName);
    }

    let mut containers: Vec<ContainerDecl> = raw
        .containers
        .into_iter()
        .map(|(name, c)| ContainerDecl {
            name,
            image: c.image,
            variables: c.variables,
            ports: c.ports,
            resources: c.resources,
            liveness_probe: c.liveness_probe,
            readiness_probe: c.readiness_probe,
        })
        .collect();
    containers.sort_by(|a, b| a.name.cmp(&b.name));

    let mut used_legacy_params = false;
    let mut resources: Vec<ResourceDecl> = Vec::with_capacity(raw.resources.len());
    for (name, r) in raw.resources {
        let properties = match (r.properties, r.params) {
            (Some(properties), _) => properties,
            (None, Some(params)) => {
                if strict_properties {
                    return Err(IngestError::LegacyParamsRejected { resource: name });
                }
                used_legacy_params = true;
                params
            }
            (None, None) => PropertyMap::new(),
        };
        resources.push(ResourceDecl { name, resource_type: r.resource_type, properties });
    }
    resources.sort_by(|a, b| a.name.cmp(&b.name));

    let workflow = raw
        .workflow
        .map(|w| {
            let decl = WorkflowDecl {
                name: w.name.unwrap_or_else(|| format!("{app_name}-inline")),
                steps: w.steps,
                parameters: w.parameters,
                timeout_secs: w.timeout_secs,
                max_retries: w.max_retries,
            };
            validate_workflow(&decl, known_step_types)?;
            Ok::<_, ValidationError>(decl)
        })
        .transpose()?;

    let spec = Spec {
        id: SpecId::new(),
        app_id,
        app_name: app_name.to_string(),
        api_version: raw.api_version,
        metadata: raw.metadata,
        containers,
        resources,
        workflow,
        environment: raw.environment,
        created_at: Utc::now(),
    };
    Ok(ParsedSpec { spec, used_legacy_params })
}

/// Audit identity attached to reconciler/startup-internal ingests that have
/// no external caller.
#[must_use]
pub fn system_caller() -> CallerIdentity {
    CallerIdentity::system()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peeks_app_name_before_the_app_exists() {
        let yaml = "apiVersion: score.dev/v1b1\nmetadata:\n  name: checkout\n";
        assert_eq!(peek_app_name(yaml).unwrap(), "checkout");
    }

    #[test]
    fn parses_a_minimal_spec() {
        let yaml = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
containers:
  web:
    image: checkout:1.0.0
resources:
  db:
    type: postgres
    properties:
      size: small
"#;
        let parsed = parse_spec(AppId::new(), "checkout", yaml, &[], false).unwrap();
        assert_eq!(parsed.spec.containers.len(), 1);
        assert_eq!(parsed.spec.resources.len(), 1);
        assert_eq!(parsed.spec.resources[0].name, "db");
        assert!(!parsed.used_legacy_params);
    }

    #[test]
    fn legacy_params_is_rewritten_and_flagged() {
        let yaml = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
resources:
  db:
    type: postgres
    params:
      size: small
"#;
        let parsed = parse_spec(AppId::new(), "checkout", yaml, &[], false).unwrap();
        assert_eq!(parsed.spec.resources[0].properties["size"], "small");
        assert!(parsed.used_legacy_params);
    }

    #[test]
    fn strict_properties_rejects_legacy_params() {
        let yaml = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
resources:
  db:
    type: postgres
    params:
      size: small
"#;
        let err = parse_spec(AppId::new(), "checkout", yaml, &[], true).unwrap_err();
        assert!(matches!(err, IngestError::LegacyParamsRejected { resource } if resource == "db"));
    }

    #[test]
    fn missing_app_name_is_rejected() {
        let yaml = "apiVersion: score.dev/v1b1\nmetadata: {}\n";
        let err = parse_spec(AppId::new(), "checkout", yaml, &[], false).unwrap_err();
        assert!(matches!(err, IngestError::MissingAppName));
    }

    #[test]
    fn inline_workflow_is_validated() {
        let yaml = r#"
apiVersion: score.dev/v1b1
metadata:
  name: checkout
workflow:
  steps:
    - name: apply
      type: terraform
"#;
        let parsed = parse_spec(AppId::new(), "checkout", yaml, &["terraform"], false).unwrap();
        let workflow = parsed.spec.workflow.unwrap();
        assert_eq!(workflow.name, "checkout-inline");
        assert_eq!(workflow.steps.len(), 1);
    }
}
