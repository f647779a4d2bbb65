//! YAML workflow parsing and structural validation.

pub mod validator;

pub use validator::{validate_workflow, ValidationError};

use pcore_domain::WorkflowDecl;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// Parses a `WorkflowDecl` from YAML and runs every structural check in
/// [`validate_workflow`]. Used both for inline workflows embedded in a Spec
/// and for golden-path-provided workflow manifests.
pub fn parse_and_validate(
    yaml: &str,
    known_step_types: &[&str],
) -> Result<WorkflowDecl, WorkflowParseOrValidationError> {
    let decl: WorkflowDecl = serde_yml::from_str(yaml)?;
    validate_workflow(&decl, known_step_types)?;
    Ok(decl)
}

#[derive(Debug, Error)]
pub enum WorkflowParseOrValidationError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<serde_yml::Error> for WorkflowParseOrValidationError {
    fn from(err: serde_yml::Error) -> Self {
        Self::Parse(ParseError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_workflow() {
        let yaml = r#"
name: provision-postgres
steps:
  - name: apply
    type: terraform
timeout_secs: null
max_retries: null
"#;
        let decl = parse_and_validate(yaml, &["terraform"]).unwrap();
        assert_eq!(decl.name, "provision-postgres");
        assert_eq!(decl.steps.len(), 1);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let result = parse_and_validate("not: [valid, workflow", &[]);
        assert!(result.is_err());
    }
}
