//! Input and output validators.
//!
//! Validation runs in two passes. The structural pass checks raw JSON
//! against the derived [`ValueSchema`], including required fields of nested
//! objects. The typed pass deserializes the value into the parameter's Rust
//! type, so anything the schema cannot express (integer ranges) still fails
//! before the tool body runs.

use std::fmt;

use armature_core::{ScalarType, ValueSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Typed check run after the structural pass
pub type TypedCheck = fn(&Value) -> Result<(), String>;

/// Check that `value` deserializes into `T`
///
/// # Errors
///
/// Returns the deserializer's message on failure
pub fn check_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    T::deserialize(value).map(|_| ()).map_err(|e| e.to_string())
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the failing field
    pub field: String,
    /// What was wrong, safe to show callers
    pub reason: String,
    /// Shape of the received value, for developers
    pub received: Option<String>,
}

impl Violation {
    fn new(field: impl Into<String>, reason: impl Into<String>, received: Option<&Value>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            received: received.map(describe_shape),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' {}", self.field, self.reason)
    }
}

/// Validation rule for one parameter
#[derive(Debug, Clone)]
pub struct ParamRule {
    /// Parameter name
    pub name: String,
    /// Whether callers must supply a value
    pub required: bool,
    /// Structural schema
    pub schema: ValueSchema,
    /// Value used when the caller omits the parameter
    pub default: Option<Value>,
    /// Typed check, when the parameter has a concrete Rust type
    pub check: Option<TypedCheck>,
}

/// Converts raw, untrusted inputs into validated arguments
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    rules: Vec<ParamRule>,
    context_name: Option<String>,
}

impl InputValidator {
    /// Validator over `rules`, in declaration order
    #[must_use]
    pub fn new(rules: Vec<ParamRule>, context_name: Option<String>) -> Self {
        Self {
            rules,
            context_name,
        }
    }

    /// Rules in declaration order
    #[must_use]
    pub fn rules(&self) -> &[ParamRule] {
        &self.rules
    }

    /// Validate `raw`, returning one entry per declared parameter
    ///
    /// Keys not declared by the tool are dropped, as is any key named
    /// after the context parameter.
    ///
    /// # Errors
    ///
    /// Returns every violation, in declaration order
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, Vec<Violation>> {
        let mut validated = Map::new();
        let mut violations = Vec::new();

        for rule in &self.rules {
            if self.context_name.as_deref() == Some(rule.name.as_str()) {
                continue;
            }
            let value = match raw.get(&rule.name) {
                Some(Value::Null) | None => match &rule.default {
                    Some(default) => default.clone(),
                    None if rule.required => {
                        violations.push(Violation::new(&rule.name, "is required", None));
                        continue;
                    }
                    None => Value::Null,
                },
                Some(value) => value.clone(),
            };

            let before = violations.len();
            if !value.is_null() {
                check_value(&rule.schema, &value, &rule.name, &mut violations);
            }
            if violations.len() == before {
                if let Some(check) = rule.check {
                    if let Err(reason) = check(&value) {
                        violations.push(Violation::new(
                            &rule.name,
                            format!("is invalid: {}", reason),
                            Some(&value),
                        ));
                    }
                }
            }
            validated.insert(rule.name.clone(), value);
        }

        if violations.is_empty() {
            Ok(validated)
        } else {
            Err(violations)
        }
    }

    /// Validate `raw`, mapping violations to a tool input error
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Input`] naming every failing field
    pub fn validate_or_error(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, ToolError> {
        self.validate(raw).map_err(|violations| input_error(&violations))
    }
}

fn input_error(violations: &[Violation]) -> ToolError {
    let summary: Vec<String> = violations.iter().map(ToString::to_string).collect();
    let detail: Vec<String> = violations
        .iter()
        .map(|v| match &v.received {
            Some(shape) => format!("{} (received {})", v, shape),
            None => v.to_string(),
        })
        .collect();
    ToolError::Input {
        message: format!("Error in tool input deserialization: {}", summary.join("; ")),
        developer_message: detail.join("; "),
    }
}

/// Checks a tool's return value against its declared output
#[derive(Debug, Clone, Default)]
pub struct OutputValidator {
    schema: Option<ValueSchema>,
    nullable: bool,
}

impl OutputValidator {
    /// Validator for `schema`; `None` accepts any JSON value
    #[must_use]
    pub fn new(schema: Option<ValueSchema>, nullable: bool) -> Self {
        Self { schema, nullable }
    }

    /// Declared schema
    #[must_use]
    pub fn schema(&self) -> Option<&ValueSchema> {
        self.schema.as_ref()
    }

    /// Validate a return value
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Output`] whose developer message describes the
    /// offending value's shape
    pub fn validate(&self, value: Value) -> Result<Value, ToolError> {
        let Some(schema) = &self.schema else {
            return Ok(value);
        };
        if value.is_null() {
            if self.nullable {
                return Ok(value);
            }
            return Err(output_error(&[Violation::new(
                "output",
                "must not be null",
                Some(&value),
            )]));
        }

        let mut violations = Vec::new();
        check_value(schema, &value, "output", &mut violations);
        if violations.is_empty() {
            Ok(value)
        } else {
            Err(output_error(&violations))
        }
    }
}

fn output_error(violations: &[Violation]) -> ToolError {
    let detail: Vec<String> = violations
        .iter()
        .map(|v| match &v.received {
            Some(shape) => format!("{} (received {})", v, shape),
            None => v.to_string(),
        })
        .collect();
    ToolError::Output {
        developer_message: format!(
            "Validation error occurred while serializing tool output: {}. Please ensure the tool's output matches the expected schema.",
            detail.join("; ")
        ),
    }
}

/// Structural check of `value` against `schema`, appending violations
pub fn check_value(schema: &ValueSchema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match schema {
        ValueSchema::Scalar(scalar) => {
            let ok = match scalar {
                ScalarType::String => value.is_string(),
                ScalarType::Integer => value.is_i64() || value.is_u64(),
                ScalarType::Number => value.is_number(),
                ScalarType::Boolean => value.is_boolean(),
            };
            if !ok {
                out.push(Violation::new(
                    path,
                    format!("expected {}, got {}", scalar.val_type(), json_kind(value)),
                    Some(value),
                ));
            }
        }
        ValueSchema::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => {}
            Some(_) => out.push(Violation::new(
                path,
                format!("must be one of: {}", allowed.join(", ")),
                Some(value),
            )),
            None => out.push(Violation::new(
                path,
                format!("expected string, got {}", json_kind(value)),
                Some(value),
            )),
        },
        ValueSchema::Array(inner) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_value(inner, item, &format!("{}[{}]", path, i), out);
                }
            }
            None => out.push(Violation::new(
                path,
                format!("expected array, got {}", json_kind(value)),
                Some(value),
            )),
        },
        ValueSchema::Object {
            properties,
            required,
        } => match value.as_object() {
            Some(object) => {
                for name in required {
                    if object.get(name).is_none_or(Value::is_null) {
                        out.push(Violation::new(
                            format!("{}.{}", path, name),
                            "is required",
                            None,
                        ));
                    }
                }
                if let Some(properties) = properties {
                    for (name, prop_schema) in properties {
                        match object.get(name) {
                            None | Some(Value::Null) => {}
                            Some(prop) => {
                                check_value(prop_schema, prop, &format!("{}.{}", path, name), out);
                            }
                        }
                    }
                }
            }
            None => out.push(Violation::new(
                path,
                format!("expected object, got {}", json_kind(value)),
                Some(value),
            )),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
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

/// Shape of a value without its content: `object{a, b}`, `array[3]`, ...
#[must_use]
pub fn describe_shape(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("array[{}]", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).take(8).collect();
            let more = if map.len() > keys.len() { ", ..." } else { "" };
            format!("object{{{}{}}}", keys.join(", "), more)
        }
        other => json_kind(other).to_string(),
    }
}
