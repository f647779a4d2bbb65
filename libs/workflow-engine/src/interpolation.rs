//! `${...}` expression resolution for step config.
//!
//! Supported forms: `${resources.<name>.<attr>}`, `${steps.<name>.outputs.<key>}`,
//! `${params.<key>}`, `${env.<name>}`. An expression that is the entire
//! string value resolves to the referenced JSON value verbatim; one embedded
//! in a larger string is stringified in place.

use std::collections::HashMap;

use pcore_domain::PropertyMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("unresolved reference '${{{0}}}'")]
    MissingReference(String),
    #[error("malformed expression '${{{0}}}'")]
    Malformed(String),
}

/// A resource's currently known properties and outputs, as visible to
/// `${resources.<name>.<attr>}` expressions.
#[derive(Debug, Clone, Default)]
pub struct ResourceView {
    pub properties: PropertyMap,
    pub outputs: PropertyMap,
}

pub struct InterpolationContext<'a> {
    pub resources: &'a HashMap<String, ResourceView>,
    pub step_outputs: &'a HashMap<String, HashMap<String, String>>,
    pub params: &'a serde_json::Map<String, serde_json::Value>,
}

/// Recursively resolves every `${...}` expression found in `value`.
pub fn resolve(value: &serde_json::Value, ctx: &InterpolationContext<'_>) -> Result<serde_json::Value, InterpolationError> {
    match value {
        serde_json::Value::String(s) => resolve_string(s, ctx),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve(item, ctx)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve(v, ctx)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, ctx: &InterpolationContext<'_>) -> Result<serde_json::Value, InterpolationError> {
    let Some((expr, is_whole)) = find_single_expression(s) else {
        return Ok(serde_json::Value::String(interpolate_inline(s, ctx)?));
    };
    if is_whole {
        resolve_expression(expr, ctx)
    } else {
        Ok(serde_json::Value::String(interpolate_inline(s, ctx)?))
    }
}

/// Returns `Some((expr, true))` when `s` is exactly one `${...}` expression
/// with nothing else around it, or `Some((expr, false))`/`None` otherwise;
/// used only to decide whether to preserve the resolved value's JSON type.
fn find_single_expression(s: &str) -> Option<(&str, bool)> {
    let trimmed = s.trim();
    if trimmed.starts_with("${") && trimmed.ends_with('}') && trimmed.len() == s.len() {
        let inner = &trimmed[2..trimmed.len() - 1];
        if !inner.contains("${") {
            return Some((inner, true));
        }
    }
    if s.contains("${") {
        return Some(("", false));
    }
    None
}

fn interpolate_inline(s: &str, ctx: &InterpolationContext<'_>) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(InterpolationError::Malformed(rest.to_string()));
        };
        let expr = &after[..end];
        let resolved = resolve_expression(expr, ctx)?;
        out.push_str(&value_to_inline_string(&resolved));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn value_to_inline_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_expression(expr: &str, ctx: &InterpolationContext<'_>) -> Result<serde_json::Value, InterpolationError> {
    let parts: Vec<&str> = expr.split('.').collect();
    match parts.as_slice() {
        ["resources", name, attr] => {
            let resource = ctx
                .resources
                .get(*name)
                .ok_or_else(|| InterpolationError::MissingReference(expr.to_string()))?;
            resource
                .outputs
                .get(*attr)
                .or_else(|| resource.properties.get(*attr))
                .cloned()
                .ok_or_else(|| InterpolationError::MissingReference(expr.to_string()))
        }
        ["steps", name, "outputs", key] => {
            let outputs = ctx
                .step_outputs
                .get(*name)
                .ok_or_else(|| InterpolationError::MissingReference(expr.to_string()))?;
            outputs
                .get(*key)
                .map(|v| serde_json::Value::String(v.clone()))
                .ok_or_else(|| InterpolationError::MissingReference(expr.to_string()))
        }
        ["params", key] => ctx
            .params
            .get(*key)
            .cloned()
            .ok_or_else(|| InterpolationError::MissingReference(expr.to_string())),
        ["env", name] => std::env::var(name)
            .map(serde_json::Value::String)
            .map_err(|_| InterpolationError::MissingReference(expr.to_string())),
        _ => Err(InterpolationError::Malformed(expr.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (HashMap<String, ResourceView>, HashMap<String, HashMap<String, String>>, serde_json::Map<String, serde_json::Value>) {
        let mut resources = HashMap::new();
        let mut outputs = PropertyMap::new();
        outputs.insert("host".to_string(), serde_json::json!("db.internal"));
        resources.insert("db".to_string(), ResourceView { properties: PropertyMap::new(), outputs });

        let mut step_outputs = HashMap::new();
        let mut s = HashMap::new();
        s.insert("repo_url".to_string(), "https://gitea.internal/app".to_string());
        step_outputs.insert("create-repo".to_string(), s);

        let mut params = serde_json::Map::new();
        params.insert("region".to_string(), serde_json::json!("us-east-1"));

        (resources, step_outputs, params)
    }

    #[test]
    fn whole_string_expression_preserves_type() {
        let (resources, step_outputs, params) = ctx();
        let ictx = InterpolationContext { resources: &resources, step_outputs: &step_outputs, params: &params };
        let resolved = resolve(&serde_json::json!("${resources.db.host}"), &ictx).unwrap();
        assert_eq!(resolved, serde_json::json!("db.internal"));
    }

    #[test]
    fn inline_expression_stringifies() {
        let (resources, step_outputs, params) = ctx();
        let ictx = InterpolationContext { resources: &resources, step_outputs: &step_outputs, params: &params };
        let resolved = resolve(&serde_json::json!("postgres://${resources.db.host}:5432"), &ictx).unwrap();
        assert_eq!(resolved, serde_json::json!("postgres://db.internal:5432"));
    }

    #[test]
    fn step_output_reference_resolves() {
        let (resources, step_outputs, params) = ctx();
        let ictx = InterpolationContext { resources: &resources, step_outputs: &step_outputs, params: &params };
        let resolved = resolve(&serde_json::json!("${steps.create-repo.outputs.repo_url}"), &ictx).unwrap();
        assert_eq!(resolved, serde_json::json!("https://gitea.internal/app"));
    }

    #[test]
    fn missing_reference_is_an_error() {
        let (resources, step_outputs, params) = ctx();
        let ictx = InterpolationContext { resources: &resources, step_outputs: &step_outputs, params: &params };
        let err = resolve(&serde_json::json!("${resources.missing.host}"), &ictx).unwrap_err();
        assert!(matches!(err, InterpolationError::MissingReference(_)));
    }

    #[test]
    fn param_reference_resolves() {
        let (resources, step_outputs, params) = ctx();
        let ictx = InterpolationContext { resources: &resources, step_outputs: &step_outputs, params: &params };
        let resolved = resolve(&serde_json::json!("${params.region}"), &ictx).unwrap();
        assert_eq!(resolved, serde_json::json!("us-east-1"));
    }
}
