//! ValueSchema to JSON Schema conversion.
//!
//! Conversion matches exhaustively on [`ValueSchema`] so every shape has one
//! rendering: string, integer, number and boolean map directly, json maps to
//! `object`, array maps to `array` with `items`. Enums pass through and
//! nested properties convert recursively, keeping their `required` list.

use crate::definition::{InputParameter, ToolInput, ToolOutput};
use crate::value::{ScalarType, ValueSchema};
use serde_json::{json, Map, Value};

fn scalar_type_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::String => "string",
        ScalarType::Integer => "integer",
        ScalarType::Number => "number",
        ScalarType::Boolean => "boolean",
    }
}

/// JSON Schema for one value
#[must_use]
pub fn value_schema(schema: &ValueSchema) -> Value {
    match schema {
        ValueSchema::Scalar(scalar) => json!({ "type": scalar_type_name(*scalar) }),
        ValueSchema::Enum(values) => json!({ "type": "string", "enum": values }),
        ValueSchema::Array(inner) => json!({ "type": "array", "items": value_schema(inner) }),
        ValueSchema::Object { properties: None, .. } => json!({ "type": "object" }),
        ValueSchema::Object {
            properties: Some(properties),
            required,
        } => {
            let props: Map<String, Value> = properties
                .iter()
                .map(|(name, schema)| (name.clone(), value_schema(schema)))
                .collect();
            let mut rendered = json!({ "type": "object", "properties": props });
            if !required.is_empty() {
                rendered["required"] = json!(required);
            }
            rendered
        }
    }
}

/// JSON Schema for one parameter, including its description
#[must_use]
pub fn parameter_schema(parameter: &InputParameter) -> Value {
    let mut schema = value_schema(&parameter.value_schema);
    if !parameter.description.is_empty() {
        if let Value::Object(map) = &mut schema {
            map.insert(
                "description".to_string(),
                Value::String(parameter.description.clone()),
            );
        }
    }
    schema
}

/// Object schema for a tool's inputs
///
/// The context parameter is not part of `input.parameters` and so never
/// appears here.
#[must_use]
pub fn input_schema(input: &ToolInput) -> Value {
    let properties: Map<String, Value> = input
        .parameters
        .iter()
        .map(|p| (p.name.clone(), parameter_schema(p)))
        .collect();
    let required: Vec<&str> = input.required_names().collect();

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema.insert("additionalProperties".to_string(), json!(false));
    Value::Object(schema)
}

/// Object schema for a tool's output, when the output is typed
///
/// Non-object outputs are wrapped as `{"result": ...}` so the schema is
/// always an object.
#[must_use]
pub fn output_schema(output: &ToolOutput) -> Option<Value> {
    let schema = output.value_schema.as_ref()?;
    let mut rendered = match schema {
        ValueSchema::Object { .. } => value_schema(schema),
        _ => json!({
            "type": "object",
            "properties": { "result": value_schema(schema) },
            "required": ["result"],
        }),
    };
    if !output.description.is_empty() {
        if let Value::Object(map) = &mut rendered {
            map.insert(
                "description".to_string(),
                Value::String(output.description.clone()),
            );
        }
    }
    Some(rendered)
}
