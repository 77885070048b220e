//! Argument checks against a tool's JSON parameter schema.
//!
//! MCP servers describe arguments with plain JSON Schema objects. We only
//! check what a model commonly gets wrong: missing required fields, wrong
//! primitive types, values outside an `enum`, and extra fields when the schema
//! forbids them. Anything more exotic is left for the server to reject.

use serde_json::{Map, Value};

/// Return a description of every offending field, or an empty list.
pub fn validate_arguments(schema: &Value, arguments: &Map<String, Value>) -> Vec<String> {
    let mut problems = Vec::new();

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(name) {
                problems.push(format!("{}: missing required field", name));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in arguments {
        match properties.and_then(|p| p.get(name)) {
            Some(property) => {
                if let Some(problem) = check_property(property, value) {
                    problems.push(format!("{}: {}", name, problem));
                }
            }
            None if closed => problems.push(format!("{}: unexpected field", name)),
            None => {}
        }
    }

    problems
}

fn check_property(property: &Value, value: &Value) -> Option<String> {
    if let Some(expected) = property.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(types) => types.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            return Some(format!(
                "expected {}, got {}",
                allowed.join(" or "),
                type_name(value)
            ));
        }
    }

    if let Some(options) = property.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            return Some(format!("{} is not one of the allowed values", value));
        }
    }

    None
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
