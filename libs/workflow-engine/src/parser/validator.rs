//! Structural validation of a parsed [`WorkflowDecl`].
//!
//! Checks: unknown step types, cyclic `dependsOn`, duplicate step names,
//! and dangling interpolation references (`${steps.<name>...}` /
//! `${params.<key>}` naming something that doesn't exist).

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graph::DiGraph;
use pcore_domain::{WorkflowDecl, MAX_WORKFLOW_TIMEOUT_SECS};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), location: None, suggestion: None }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

pub fn validate_workflow(decl: &WorkflowDecl, known_step_types: &[&str]) -> Result<(), ValidationError> {
    validate_has_steps(decl)?;
    validate_unique_names(decl)?;
    validate_step_types(decl, known_step_types)?;
    validate_dependency_references(decl)?;
    validate_acyclic(decl)?;
    validate_timeout_bounds(decl)?;
    validate_interpolation_references(decl)?;
    Ok(())
}

fn validate_has_steps(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    if decl.steps.is_empty() {
        return Err(ValidationError::new("workflow must have at least one step"));
    }
    Ok(())
}

fn validate_unique_names(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for step in &decl.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(ValidationError::new(format!("duplicate step name '{}'", step.name)));
        }
    }
    Ok(())
}

fn validate_step_types(decl: &WorkflowDecl, known_step_types: &[&str]) -> Result<(), ValidationError> {
    let known: HashSet<&str> = known_step_types.iter().copied().collect();
    for (idx, step) in decl.steps.iter().enumerate() {
        if !known.contains(step.step_type.as_str()) {
            let suggestion = find_similar(&step.step_type, &known);
            return Err(ValidationError::new(format!("unknown step type '{}'", step.step_type))
                .with_location(format!("steps[{idx}].type"))
                .with_suggestion(suggestion.map(|s| format!("did you mean '{s}'?")).unwrap_or_default()));
        }
    }
    Ok(())
}

fn validate_dependency_references(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    let names: HashSet<&str> = decl.steps.iter().map(|s| s.name.as_str()).collect();
    for (idx, step) in decl.steps.iter().enumerate() {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                let suggestion = find_similar(dep, &names);
                return Err(ValidationError::new(format!("step '{}' depends on unknown step '{dep}'", step.name))
                    .with_location(format!("steps[{idx}].depends_on"))
                    .with_suggestion(suggestion.map(|s| format!("did you mean '{s}'?")).unwrap_or_default()));
            }
        }
        if let pcore_domain::OnFailureAction::RunStep(target) = &step.on_failure {
            if !names.contains(target.as_str()) {
                return Err(ValidationError::new(format!("step '{}' has onFailure.run_step targeting unknown step '{target}'", step.name))
                    .with_location(format!("steps[{idx}].on_failure")));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut idx_of = HashMap::new();
    for step in &decl.steps {
        idx_of.insert(step.name.as_str(), graph.add_node(step.name.as_str()));
    }
    for step in &decl.steps {
        for dep in &step.depends_on {
            if let (Some(&from), Some(&to)) = (idx_of.get(dep.as_str()), idx_of.get(step.name.as_str())) {
                graph.add_edge(from, to, ());
            }
        }
    }
    if algo::is_cyclic_directed(&graph) {
        return Err(ValidationError::new("workflow's dependsOn graph contains a cycle"));
    }
    Ok(())
}

fn validate_timeout_bounds(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    if let Some(timeout) = decl.timeout_secs {
        if timeout > MAX_WORKFLOW_TIMEOUT_SECS {
            return Err(ValidationError::new(format!(
                "workflow timeout {timeout}s exceeds maximum of {MAX_WORKFLOW_TIMEOUT_SECS}s"
            ))
            .with_location("timeout_secs"));
        }
    }
    Ok(())
}

fn validate_interpolation_references(decl: &WorkflowDecl) -> Result<(), ValidationError> {
    let step_names: HashSet<&str> = decl.steps.iter().map(|s| s.name.as_str()).collect();
    let param_names: HashSet<&str> = decl.parameters.keys().map(String::as_str).collect();

    for (idx, step) in decl.steps.iter().enumerate() {
        for expr in find_expressions(&step.config) {
            let parts: Vec<&str> = expr.split('.').collect();
            match parts.as_slice() {
                ["steps", name, "outputs", _] => {
                    if !step_names.contains(name) {
                        return Err(ValidationError::new(format!("step '{}' references unknown step '{name}' in '${{{expr}}}'", step.name))
                            .with_location(format!("steps[{idx}].config")));
                    }
                }
                ["params", key] => {
                    if !param_names.contains(key) {
                        return Err(ValidationError::new(format!("step '{}' references undeclared parameter '{key}' in '${{{expr}}}'", step.name))
                            .with_location(format!("steps[{idx}].config")));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn find_expressions(value: &serde_json::Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_expressions(value, &mut out);
    out
}

fn collect_expressions(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            let mut rest = s.as_str();
            while let Some(start) = rest.find("${") {
                let after = &rest[start + 2..];
                if let Some(end) = after.find('}') {
                    out.push(after[..end].to_string());
                    rest = &after[end + 1..];
                } else {
                    break;
                }
            }
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_expressions(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_expressions(v, out)),
        _ => {}
    }
}

fn find_similar<'a>(target: &str, candidates: &HashSet<&'a str>) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, strsim::levenshtein(target, c)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_domain::{OnFailureAction, StepDecl};

    fn step(name: &str, step_type: &str, depends_on: Vec<&str>) -> StepDecl {
        StepDecl {
            name: name.to_string(),
            step_type: step_type.to_string(),
            config: serde_json::Value::Null,
            depends_on: depends_on.into_iter().map(str::to_string).collect(),
            parallel_group: None,
            retry: None,
            timeout_secs: None,
            on_failure: OnFailureAction::FailWorkflow,
        }
    }

    fn decl(steps: Vec<StepDecl>) -> WorkflowDecl {
        WorkflowDecl { name: "wf".to_string(), steps, parameters: Default::default(), timeout_secs: None, max_retries: None }
    }

    #[test]
    fn rejects_unknown_step_type_with_suggestion() {
        let wf = decl(vec![step("a", "terafrom", vec![])]);
        let err = validate_workflow(&wf, &["terraform"]).unwrap_err();
        assert!(err.suggestion.unwrap().contains("terraform"));
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let wf = decl(vec![step("a", "wait", vec![]), step("a", "wait", vec![])]);
        assert!(validate_workflow(&wf, &["wait"]).is_err());
    }

    #[test]
    fn rejects_cycles() {
        let wf = decl(vec![step("a", "wait", vec!["b"]), step("b", "wait", vec!["a"])]);
        let err = validate_workflow(&wf, &["wait"]).unwrap_err();
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn rejects_dangling_step_interpolation() {
        let mut a = step("a", "script", vec![]);
        a.config = serde_json::json!({"command": "echo ${steps.missing.outputs.x}"});
        let wf = decl(vec![a]);
        let err = validate_workflow(&wf, &["script"]).unwrap_err();
        assert!(err.message.contains("unknown step"));
    }

    #[test]
    fn accepts_a_valid_workflow() {
        let wf = decl(vec![step("a", "wait", vec![])]);
        assert!(validate_workflow(&wf, &["wait"]).is_ok());
    }
}
