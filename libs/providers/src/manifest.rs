//! Provider and golden-path manifest shapes.
//!
//! A provider manifest declares the resource types a provider implements and
//! the workflow files that provision them. It is the unit the registry
//! loads, validates, and indexes.

use std::collections::HashMap;

use pcore_domain::{ManifestKind, WorkflowCategory};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Top-level document at a provider manifest's path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: ManifestKind,
    pub metadata: ProviderMetadata,
    pub compatibility: Compatibility,
    pub capabilities: Capabilities,
    #[serde(default)]
    pub workflows: Vec<WorkflowManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
}

/// Core-version range this provider declares support for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compatibility {
    #[serde(rename = "minCoreVersion")]
    pub min_core_version: Version,
    #[serde(rename = "maxCoreVersion")]
    pub max_core_version: Version,
}

impl Compatibility {
    #[must_use]
    pub fn allows(&self, core_version: &Version) -> bool {
        *core_version >= self.min_core_version && *core_version <= self.max_core_version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "resourceTypes", default)]
    pub resource_types: Vec<String>,
}

/// One workflow a provider manifest exposes, pointing at a workflow YAML
/// file relative to the manifest's own directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowManifestEntry {
    pub name: String,
    pub category: WorkflowCategory,
    pub path: String,
    /// Which declared capability this workflow provisions. Required for
    /// providers that claim more than one resource type; a provider with a
    /// single capability may omit it.
    #[serde(rename = "resourceType")]
    pub resource_type: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The `golden-paths.yaml` index: named, parameterized entry points that
/// resolve to a provider + workflow pair without naming a resource type
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenPathsIndex {
    #[serde(rename = "goldenPaths", default)]
    pub golden_paths: Vec<GoldenPathEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenPathEntry {
    pub name: String,
    pub provider: String,
    pub workflow: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category: WorkflowCategory,
    #[serde(rename = "estimatedDurationSecs")]
    pub estimated_duration_secs: Option<u64>,
}

pub fn parse_provider_manifest(yaml: &str) -> Result<ProviderManifest, serde_yml::Error> {
    serde_yml::from_str(yaml)
}

pub fn parse_golden_paths_index(yaml: &str) -> Result<GoldenPathsIndex, serde_yml::Error> {
    serde_yml::from_str(yaml)
}

/// A lookup of a provider's resource types to the workflow that provisions
/// them, split out of [`ProviderManifest`] for quick resolution once loaded.
pub type ResourceTypeMap = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_provider_manifest() {
        let yaml = r#"
apiVersion: innominatus.io/v1
kind: Provider
metadata:
  name: core-aws
  version: 1.2.0
  description: AWS resource provider
compatibility:
  minCoreVersion: 0.1.0
  maxCoreVersion: 0.9.9
capabilities:
  resourceTypes:
    - postgres
    - s3-bucket
workflows:
  - name: provision-postgres
    category: provisioner
    path: workflows/postgres.yaml
    tags: [aws]
"#;
        let manifest = parse_provider_manifest(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "core-aws");
        assert_eq!(manifest.capabilities.resource_types, vec!["postgres", "s3-bucket"]);
        assert_eq!(manifest.workflows.len(), 1);
    }

    #[test]
    fn compatibility_range_is_inclusive() {
        let compat = Compatibility {
            min_core_version: Version::parse("1.0.0").unwrap(),
            max_core_version: Version::parse("2.0.0").unwrap(),
        };
        assert!(compat.allows(&Version::parse("1.0.0").unwrap()));
        assert!(compat.allows(&Version::parse("2.0.0").unwrap()));
        assert!(!compat.allows(&Version::parse("2.0.1").unwrap()));
    }

    #[test]
    fn parses_golden_paths_index() {
        let yaml = r#"
goldenPaths:
  - name: provision-full-stack
    provider: core-aws
    workflow: full-stack
    tags: [aws, production]
    category: goldenpath
    estimatedDurationSecs: 600
"#;
        let index = parse_golden_paths_index(yaml).unwrap();
        assert_eq!(index.golden_paths.len(), 1);
        assert_eq!(index.golden_paths[0].provider, "core-aws");
    }
}
