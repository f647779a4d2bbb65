//! Loads provider manifests, validates them, and resolves resource types and
//! golden paths to a concrete `(provider, workflow)` pair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pcore_domain::WorkflowDecl;
use pcore_workflow_engine::parse_and_validate;
use semver::Version;

use crate::errors::ProviderError;
use crate::manifest::{
    parse_golden_paths_index, parse_provider_manifest, GoldenPathEntry, ProviderManifest,
};

/// A provider manifest plus its workflow files, parsed and validated.
#[derive(Debug, Clone)]
pub struct LoadedProvider {
    pub manifest: ProviderManifest,
    pub manifest_dir: PathBuf,
    pub workflows: HashMap<String, WorkflowDecl>,
}

impl LoadedProvider {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.metadata.name
    }
}

/// Index of loaded providers and golden paths, built once at startup (or on
/// reload) and queried by the core to resolve a resource type or golden path
/// to an executable workflow.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, LoadedProvider>,
    resource_types: HashMap<String, String>,
    golden_paths: HashMap<String, GoldenPathEntry>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a provider manifest from `manifest_path`, validating it against
    /// `core_version` and `known_step_types`, then registers it. Each
    /// referenced workflow file is resolved relative to the manifest's
    /// directory, read, and parsed with [`parse_and_validate`].
    ///
    /// # Errors
    /// Returns [`ProviderError::DuplicateProvider`] if a provider with the
    /// same name is already loaded, [`ProviderError::IncompatibleCoreVersion`]
    /// if `core_version` falls outside the manifest's declared range,
    /// [`ProviderError::CapabilityConflict`] if a resource type is already
    /// claimed by a different provider, or a workflow I/O/parse error if a
    /// referenced workflow file is missing or malformed.
    pub fn load_provider(
        &mut self,
        manifest_path: &Path,
        core_version: &Version,
        known_step_types: &[&str],
    ) -> Result<(), ProviderError> {
        let path_str = manifest_path.display().to_string();
        let raw = std::fs::read_to_string(manifest_path)
            .map_err(|source| ProviderError::Io { path: path_str.clone(), source })?;
        let manifest = parse_provider_manifest(&raw)
            .map_err(|source| ProviderError::ManifestYaml { path: path_str, source })?;

        if !manifest.compatibility.allows(core_version) {
            return Err(ProviderError::IncompatibleCoreVersion {
                name: manifest.metadata.name.clone(),
                found: manifest.metadata.version.to_string(),
                core_version: core_version.to_string(),
                min: manifest.compatibility.min_core_version.to_string(),
                max: manifest.compatibility.max_core_version.to_string(),
            });
        }

        if self.providers.contains_key(&manifest.metadata.name) {
            return Err(ProviderError::DuplicateProvider(manifest.metadata.name.clone()));
        }

        for resource_type in &manifest.capabilities.resource_types {
            if let Some(existing) = self.resource_types.get(resource_type) {
                return Err(ProviderError::CapabilityConflict {
                    resource_type: resource_type.clone(),
                    first: existing.clone(),
                    second: manifest.metadata.name.clone(),
                });
            }
        }

        let manifest_dir = manifest_path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let mut workflows = HashMap::new();
        for entry in &manifest.workflows {
            let workflow_path = manifest_dir.join(&entry.path);
            let yaml = std::fs::read_to_string(&workflow_path).map_err(|_| {
                ProviderError::WorkflowFileMissing {
                    provider: manifest.metadata.name.clone(),
                    path: workflow_path.display().to_string(),
                }
            })?;
            let decl = parse_and_validate(&yaml, known_step_types).map_err(|source| ProviderError::WorkflowParse {
                provider: manifest.metadata.name.clone(),
                workflow: entry.name.clone(),
                source,
            })?;
            workflows.insert(entry.name.clone(), decl);
        }

        for resource_type in &manifest.capabilities.resource_types {
            self.resource_types.insert(resource_type.clone(), manifest.metadata.name.clone());
        }
        self.providers.insert(manifest.metadata.name.clone(), LoadedProvider { manifest, manifest_dir, workflows });
        Ok(())
    }

    /// Loads and indexes a `golden-paths.yaml` file. Every entry must
    /// reference an already-loaded provider and one of its workflows.
    pub fn load_golden_paths(&mut self, index_path: &Path) -> Result<(), ProviderError> {
        let path_str = index_path.display().to_string();
        let raw = std::fs::read_to_string(index_path)
            .map_err(|source| ProviderError::Io { path: path_str.clone(), source })?;
        let index = parse_golden_paths_index(&raw)
            .map_err(|source| ProviderError::GoldenPathsYaml { path: path_str, source })?;

        for entry in index.golden_paths {
            let provider = self.providers.get(&entry.provider).ok_or_else(|| ProviderError::GoldenPathUnknownProvider {
                name: entry.name.clone(),
                provider: entry.provider.clone(),
            })?;
            if !provider.workflows.contains_key(&entry.workflow) {
                return Err(ProviderError::GoldenPathUnknownWorkflow {
                    name: entry.name.clone(),
                    provider: entry.provider.clone(),
                    workflow: entry.workflow.clone(),
                });
            }
            self.golden_paths.insert(entry.name.clone(), entry);
        }
        Ok(())
    }

    #[must_use]
    pub fn get_provider(&self, name: &str) -> Option<&LoadedProvider> {
        self.providers.get(name)
    }

    #[must_use]
    pub fn list_providers(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn list_golden_paths(&self) -> Vec<&str> {
        self.golden_paths.keys().map(String::as_str).collect()
    }

    /// Resolves a declared resource type to the provider and workflow that
    /// provisions it.
    ///
    /// # Errors
    /// Returns [`ProviderError::NoProviderForResourceType`] if no loaded
    /// provider claims `resource_type`.
    pub fn resolve_resource_type(&self, resource_type: &str) -> Result<(&LoadedProvider, &WorkflowDecl), ProviderError> {
        let provider_name = self
            .resource_types
            .get(resource_type)
            .ok_or_else(|| ProviderError::NoProviderForResourceType(resource_type.to_string()))?;
        let provider = &self.providers[provider_name];
        let entry = provider
            .manifest
            .workflows
            .iter()
            .find(|w| w.resource_type.as_deref() == Some(resource_type))
            .or_else(|| {
                provider
                    .manifest
                    .workflows
                    .iter()
                    .find(|w| w.category == pcore_domain::WorkflowCategory::Provisioner)
            })
            .expect("provider with a registered resource type has at least one provisioner workflow");
        let workflow = &provider.workflows[&entry.name];
        Ok((provider, workflow))
    }

    /// Resolves a named golden path to its provider, workflow, and parameter
    /// schema (the resolved workflow's own `parameters` map).
    ///
    /// # Errors
    /// Returns [`ProviderError::UnknownGoldenPath`] if `name` is not indexed.
    pub fn resolve_golden_path(&self, name: &str) -> Result<(&LoadedProvider, &WorkflowDecl, &GoldenPathEntry), ProviderError> {
        let entry = self.golden_paths.get(name).ok_or_else(|| ProviderError::UnknownGoldenPath(name.to_string()))?;
        let provider = &self.providers[&entry.provider];
        let workflow = &provider.workflows[&entry.workflow];
        Ok((provider, workflow, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn provider_manifest_yaml() -> &'static str {
        r#"
apiVersion: innominatus.io/v1
kind: Provider
metadata:
  name: core-aws
  version: 1.0.0
  description: test provider
compatibility:
  minCoreVersion: 0.1.0
  maxCoreVersion: 1.0.0
capabilities:
  resourceTypes:
    - postgres
workflows:
  - name: provision-postgres
    category: provisioner
    path: postgres.yaml
"#
    }

    fn workflow_yaml() -> &'static str {
        r#"
name: provision-postgres
steps:
  - name: apply
    type: terraform
"#
    }

    #[test]
    fn loads_a_provider_and_resolves_its_resource_type() {
        let dir = tempdir();
        write_file(&dir, "postgres.yaml", workflow_yaml());
        let manifest_path = write_file(&dir, "provider.yaml", provider_manifest_yaml());

        let mut registry = ProviderRegistry::new();
        registry.load_provider(&manifest_path, &Version::parse("0.5.0").unwrap(), &["terraform"]).unwrap();

        let (provider, workflow) = registry.resolve_resource_type("postgres").unwrap();
        assert_eq!(provider.name(), "core-aws");
        assert_eq!(workflow.name, "provision-postgres");
    }

    #[test]
    fn rejects_incompatible_core_version() {
        let dir = tempdir();
        write_file(&dir, "postgres.yaml", workflow_yaml());
        let manifest_path = write_file(&dir, "provider.yaml", provider_manifest_yaml());

        let mut registry = ProviderRegistry::new();
        let err = registry.load_provider(&manifest_path, &Version::parse("2.0.0").unwrap(), &["terraform"]).unwrap_err();
        assert!(matches!(err, ProviderError::IncompatibleCoreVersion { .. }));
    }

    #[test]
    fn rejects_duplicate_resource_type_claims() {
        let dir = tempdir();
        write_file(&dir, "postgres.yaml", workflow_yaml());
        let manifest_a = write_file(&dir, "a.yaml", provider_manifest_yaml());
        let manifest_b_yaml = provider_manifest_yaml().replace("core-aws", "core-aws-2");
        let manifest_b = write_file(&dir, "b.yaml", &manifest_b_yaml);

        let mut registry = ProviderRegistry::new();
        registry.load_provider(&manifest_a, &Version::parse("0.5.0").unwrap(), &["terraform"]).unwrap();
        let err = registry.load_provider(&manifest_b, &Version::parse("0.5.0").unwrap(), &["terraform"]).unwrap_err();
        assert!(matches!(err, ProviderError::CapabilityConflict { .. }));
    }

    #[test]
    fn unknown_golden_path_is_an_error() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve_golden_path("missing").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownGoldenPath(name) if name == "missing"));
    }

    fn tempdir() -> PathBuf {
        let mut path = std::env::temp_dir();
        let unique = format!("pcore-providers-test-{}-{}", std::process::id(), TEST_COUNTER.next());
        path.push(unique);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    struct Counter(std::sync::atomic::AtomicU64);
    impl Counter {
        fn next(&self) -> u64 {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        }
    }
    static TEST_COUNTER: Counter = Counter(std::sync::atomic::AtomicU64::new(0));
}
