//! Argument handling between the raw model output and a tool handler.

use jsonschema::JSONSchema;
use serde_json::{Map, Value};

use crate::errors::DispatchError;
use crate::tools::ToolSpec;

/// Decode the model's raw argument string into a JSON object.
///
/// An empty or whitespace-only string is read as `{}`; models emit it for
/// tools without parameters.
pub fn decode_arguments(raw: &str) -> Result<Map<String, Value>, DispatchError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DispatchError::ArgumentDecode {
            details: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(DispatchError::ArgumentDecode { details: e.to_string() }),
    }
}

/// Insert the schema's `default` value for every declared property the model omitted.
pub fn apply_defaults(spec: &ToolSpec, arguments: &mut Map<String, Value>) {
    let Some(properties) = spec.properties() else {
        return;
    };
    for (field, schema) in properties {
        if arguments.contains_key(field) {
            continue;
        }
        if let Some(default) = schema.get("default") {
            arguments.insert(field.clone(), default.clone());
        }
    }
}

pub fn validate(schema: &JSONSchema, arguments: &Map<String, Value>) -> Result<(), DispatchError> {
    let instance = Value::Object(arguments.clone());
    if let Err(errors) = schema.validate(&instance) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(DispatchError::ArgumentValidation(messages.join("; ")));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_rejects_non_json() {
        let err = decode_arguments("not json").unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentDecode { .. }));
        assert_eq!(err.to_string(), "invalid arguments");
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = decode_arguments("[1, 2]").unwrap_err();
        match err {
            DispatchError::ArgumentDecode { details } => assert!(details.contains("an array")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_string_is_empty_object() {
        assert!(decode_arguments("").unwrap().is_empty());
        assert!(decode_arguments("  ").unwrap().is_empty());
    }

    #[test]
    fn test_defaults_do_not_override_given_values() {
        let spec = ToolSpec::new(
            "getWeather",
            "weather",
            json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                    "unit": {"type": "string", "default": "celsius"}
                },
                "required": ["location"]
            }),
        );
        let mut given = json!({"location": "Oslo", "unit": "fahrenheit"}).as_object().unwrap().clone();
        apply_defaults(&spec, &mut given);
        assert_eq!(given["unit"], "fahrenheit");

        let mut omitted = json!({"location": "Oslo"}).as_object().unwrap().clone();
        apply_defaults(&spec, &mut omitted);
        assert_eq!(omitted["unit"], "celsius");
    }

    #[test]
    fn test_validate_reports_type_mismatch() {
        let schema = JSONSchema::compile(&json!({
            "type": "object",
            "properties": {"a": {"type": "number"}},
            "required": ["a"]
        }))
        .unwrap();
        let args = json!({"a": "three"}).as_object().unwrap().clone();
        let err = validate(&schema, &args).unwrap_err();
        assert!(err.to_string().starts_with("invalid arguments: "));
    }
}
