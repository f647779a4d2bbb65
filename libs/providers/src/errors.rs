//! Error taxonomy for manifest loading, registry resolution, and parameter
//! validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("reading manifest at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("invalid provider manifest at {path}: {source}")]
    ManifestYaml { path: String, #[source] source: serde_yml::Error },

    #[error("invalid golden-paths index at {path}: {source}")]
    GoldenPathsYaml { path: String, #[source] source: serde_yml::Error },

    #[error("provider '{name}' version {found} is incompatible with core version {core_version} (requires {min}..={max})")]
    IncompatibleCoreVersion { name: String, found: String, core_version: String, min: String, max: String },

    #[error("capability conflict: resource type '{resource_type}' is claimed by both '{first}' and '{second}'")]
    CapabilityConflict { resource_type: String, first: String, second: String },

    #[error("provider '{provider}' references workflow file '{path}' that does not exist")]
    WorkflowFileMissing { provider: String, path: String },

    #[error("provider '{provider}' workflow '{workflow}' failed to parse: {source}")]
    WorkflowParse {
        provider: String,
        workflow: String,
        #[source]
        source: pcore_workflow_engine::WorkflowParseOrValidationError,
    },

    #[error("no provider registered for resource type '{0}'")]
    NoProviderForResourceType(String),

    #[error("unknown golden path '{0}'")]
    UnknownGoldenPath(String),

    #[error("golden path '{name}' references unknown provider '{provider}'")]
    GoldenPathUnknownProvider { name: String, provider: String },

    #[error("golden path '{name}' references unknown workflow '{workflow}' on provider '{provider}'")]
    GoldenPathUnknownWorkflow { name: String, provider: String, workflow: String },

    #[error("provider '{0}' is already registered")]
    DuplicateProvider(String),
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("missing required parameter '{0}'")]
    MissingRequired(String),

    #[error("parameter '{name}' does not satisfy its schema: {reason}")]
    Invalid { name: String, reason: String },

    #[error("parameter '{name}' schema is invalid: {reason}")]
    Schema { name: String, reason: String },

    #[error("unknown parameter '{0}'")]
    Unknown(String),
}
