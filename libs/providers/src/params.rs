//! Typed parameter validation against a [`ParameterSchema`] map.
//!
//! Runs before a golden path or provisioner workflow is admitted: every
//! declared parameter is checked for presence (honoring `default`/`required`)
//! and, if present, validated against its declared type, `pattern`,
//! `allowedValues`, and `min`/`max` bounds.

use std::collections::HashMap;

use pcore_domain::{ParameterSchema, ParameterType};
use serde_json::{json, Map, Value};

use crate::errors::ParamsError;

/// Validates `params` against `schema`, filling in declared defaults.
/// Returns the effective parameter set (explicit values plus defaults for
/// anything omitted).
pub fn validate_params(
    schema: &HashMap<String, ParameterSchema>,
    params: &Map<String, Value>,
) -> Result<Map<String, Value>, ParamsError> {
    for name in params.keys() {
        if !schema.contains_key(name) {
            return Err(ParamsError::Unknown(name.clone()));
        }
    }

    let mut effective = Map::new();
    for (name, field) in schema {
        let value = params.get(name).cloned().or_else(|| field.default.clone());
        match value {
            None if field.required => return Err(ParamsError::MissingRequired(name.clone())),
            None => {}
            Some(value) => {
                validate_one(name, field, &value)?;
                effective.insert(name.clone(), value);
            }
        }
    }
    Ok(effective)
}

fn validate_one(name: &str, field: &ParameterSchema, value: &Value) -> Result<(), ParamsError> {
    let schema = build_json_schema(field);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|err| ParamsError::Schema { name: name.to_string(), reason: err.to_string() })?;
    if !validator.is_valid(value) {
        return Err(ParamsError::Invalid {
            name: name.to_string(),
            reason: format!("value {value} does not match the declared {:?} schema", field.parameter_type),
        });
    }
    Ok(())
}

fn build_json_schema(field: &ParameterSchema) -> Value {
    let mut schema = Map::new();
    let json_type = match field.parameter_type {
        ParameterType::String | ParameterType::Enum | ParameterType::Duration => "string",
        ParameterType::Int => "integer",
        ParameterType::Bool => "boolean",
    };
    schema.insert("type".to_string(), json!(json_type));
    if let Some(values) = &field.allowed_values {
        schema.insert("enum".to_string(), json!(values));
    }
    if let Some(pattern) = &field.pattern {
        schema.insert("pattern".to_string(), json!(pattern));
    }
    if let Some(min) = field.min {
        schema.insert("minimum".to_string(), json!(min));
    }
    if let Some(max) = field.max {
        schema.insert("maximum".to_string(), json!(max));
    }
    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field(required: bool) -> ParameterSchema {
        ParameterSchema {
            parameter_type: ParameterType::String,
            default: None,
            required,
            description: None,
            allowed_values: None,
            pattern: None,
            min: None,
            max: None,
        }
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let mut schema = HashMap::new();
        schema.insert("region".to_string(), string_field(true));
        let err = validate_params(&schema, &Map::new()).unwrap_err();
        assert!(matches!(err, ParamsError::MissingRequired(name) if name == "region"));
    }

    #[test]
    fn default_fills_in_an_omitted_optional_parameter() {
        let mut field = string_field(false);
        field.default = Some(json!("us-east-1"));
        let mut schema = HashMap::new();
        schema.insert("region".to_string(), field);
        let effective = validate_params(&schema, &Map::new()).unwrap();
        assert_eq!(effective["region"], json!("us-east-1"));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let schema = HashMap::new();
        let mut params = Map::new();
        params.insert("bogus".to_string(), json!("x"));
        let err = validate_params(&schema, &params).unwrap_err();
        assert!(matches!(err, ParamsError::Unknown(name) if name == "bogus"));
    }

    #[test]
    fn allowed_values_reject_out_of_set_input() {
        let mut field = string_field(true);
        field.allowed_values = Some(vec![json!("small"), json!("large")]);
        let mut schema = HashMap::new();
        schema.insert("size".to_string(), field);
        let mut params = Map::new();
        params.insert("size".to_string(), json!("medium"));
        let err = validate_params(&schema, &params).unwrap_err();
        assert!(matches!(err, ParamsError::Invalid { name, .. } if name == "size"));
    }

    #[test]
    fn int_bounds_are_enforced() {
        let mut field = ParameterSchema {
            parameter_type: ParameterType::Int,
            default: None,
            required: true,
            description: None,
            allowed_values: None,
            pattern: None,
            min: Some(1.0),
            max: Some(10.0),
        };
        field.required = true;
        let mut schema = HashMap::new();
        schema.insert("replicas".to_string(), field);
        let mut params = Map::new();
        params.insert("replicas".to_string(), json!(20));
        let err = validate_params(&schema, &params).unwrap_err();
        assert!(matches!(err, ParamsError::Invalid { name, .. } if name == "replicas"));
    }
}
