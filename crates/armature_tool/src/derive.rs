//! Schema derivation.
//!
//! Turns a [`Tool`] into a [`ToolDefinition`] plus the validators that
//! guard its inputs and outputs. Every declared type is mapped onto a
//! [`ValueSchema`]; shapes the wire format cannot carry are rejected here,
//! at registration, rather than at call time.

use std::collections::BTreeSet;

use armature_core::{
    snake_to_pascal, FullyQualifiedName, InputParameter, OutputMode, ToolDefinition, ToolInput,
    ToolOutput, ToolRequirements, ToolkitDefinition, ValueSchema,
};
use armature_core::{CoreError, ErrorCode};
use indexmap::IndexMap;

use crate::declare::{DeclaredType, StructType};
use crate::function::{Tool, ToolHandler};
use crate::validate::{check_value, InputValidator, OutputValidator, ParamRule};

/// Why a tool could not be turned into a definition
#[derive(Debug, thiserror::Error)]
pub enum SchemaDerivationError {
    /// A parameter's type has no wire representation
    #[error("Parameter '{param}' of tool '{tool}' has unsupported type {ty}: {reason}")]
    UnsupportedParameter {
        tool: String,
        param: String,
        ty: String,
        reason: String,
    },

    /// The return type has no wire representation
    #[error("Return type {ty} of tool '{tool}' is unsupported: {reason}")]
    UnsupportedReturn {
        tool: String,
        ty: String,
        reason: String,
    },

    /// Neither the options nor the doc text describe the tool
    #[error(
        "Tool '{tool}' has no description. To fix: add a doc line with ToolFunction::doc(\"...\") or set ToolOptions::description"
    )]
    MissingDescription { tool: String },

    /// Tool name is not usable
    #[error("Tool name '{name}' is invalid: {reason}")]
    InvalidName { name: String, reason: String },

    /// No handler was attached
    #[error("Tool '{tool}' has no handler")]
    MissingHandler { tool: String },

    /// Two parameters share a name
    #[error("Tool '{tool}' declares parameter '{param}' more than once")]
    DuplicateParameter { tool: String, param: String },

    /// A parameter shares its name with the context injection point
    #[error("Tool '{tool}' uses '{param}' both as a parameter and as its context parameter")]
    ContextConflict { tool: String, param: String },

    /// A default value does not fit its parameter
    #[error("Default for parameter '{param}' of tool '{tool}' does not match its type: {reason}")]
    InvalidDefault {
        tool: String,
        param: String,
        reason: String,
    },

    /// Metadata failed its consistency checks
    #[error("Tool '{tool}' has inconsistent metadata: {source}")]
    InvalidMetadata {
        tool: String,
        #[source]
        source: CoreError,
    },
}

impl SchemaDerivationError {
    /// Error code reported for this failure
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedParameter { .. } | Self::InvalidDefault { .. } => {
                ErrorCode::BadInputSchema
            }
            Self::UnsupportedReturn { .. } => ErrorCode::BadOutputSchema,
            Self::MissingDescription { .. }
            | Self::InvalidName { .. }
            | Self::MissingHandler { .. }
            | Self::DuplicateParameter { .. }
            | Self::ContextConflict { .. }
            | Self::InvalidMetadata { .. } => ErrorCode::BadDefinition,
        }
    }
}

/// Result of deriving a tool
#[derive(Debug, Clone)]
pub struct DerivedTool {
    /// Immutable descriptor
    pub definition: ToolDefinition,
    /// Guards raw inputs
    pub input_validator: InputValidator,
    /// Guards return values
    pub output_validator: OutputValidator,
}

/// Derive the definition and validators for `tool` in `toolkit`
///
/// # Errors
///
/// Returns error when a type cannot be mapped, the tool is undescribed,
/// or its metadata is inconsistent
pub fn derive_tool(tool: &Tool, toolkit: &ToolkitDefinition) -> Result<DerivedTool, SchemaDerivationError> {
    let function = &tool.function;
    let options = &tool.options;

    let name = options
        .name
        .clone()
        .unwrap_or_else(|| snake_to_pascal(&function.name));
    validate_tool_name(&name)?;

    if function.handler.is_none() {
        return Err(SchemaDerivationError::MissingHandler { tool: name });
    }

    let description = options
        .description
        .as_deref()
        .or(function.doc.as_deref())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if description.is_empty() {
        return Err(SchemaDerivationError::MissingDescription { tool: name });
    }

    let mut parameters = Vec::with_capacity(function.params.len());
    let mut rules = Vec::with_capacity(function.params.len());
    let mut seen = BTreeSet::new();
    for param in &function.params {
        if function.context_param.as_deref() == Some(param.name.as_str()) {
            return Err(SchemaDerivationError::ContextConflict {
                tool: name,
                param: param.name.clone(),
            });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(SchemaDerivationError::DuplicateParameter {
                tool: name,
                param: param.name.clone(),
            });
        }

        let unsupported = |reason: String| SchemaDerivationError::UnsupportedParameter {
            tool: name.clone(),
            param: param.name.clone(),
            ty: param.ty.describe(),
            reason,
        };
        let (schema, optional) = match &param.ty {
            DeclaredType::Optional(inner) => (parameter_schema(inner).map_err(unsupported)?, true),
            other => (parameter_schema(other).map_err(unsupported)?, false),
        };

        if let Some(default) = &param.default {
            let mut violations = Vec::new();
            check_value(&schema, default, &param.name, &mut violations);
            let typed = param.check.map_or(Ok(()), |check| check(default));
            let reason = violations
                .first()
                .map(ToString::to_string)
                .or_else(|| typed.err());
            if let Some(reason) = reason {
                return Err(SchemaDerivationError::InvalidDefault {
                    tool: name,
                    param: param.name.clone(),
                    reason,
                });
            }
        }

        let required = !optional && param.default.is_none();
        let mut input = InputParameter::new(param.name.clone(), schema.clone(), required)
            .with_description(param.description.clone());
        if let Some(http_name) = &param.http_name {
            input = input.with_http_name(http_name.clone());
        }
        parameters.push(input);
        rules.push(ParamRule {
            name: param.name.clone(),
            required,
            schema,
            default: param.default.clone(),
            check: param.check,
        });
    }

    let (output, output_validator) = derive_output(&name, &function.returns, &function.returns_description)?;

    let metadata = options.metadata.clone();
    if let Some(metadata) = &metadata {
        metadata
            .validate()
            .map_err(|source| SchemaDerivationError::InvalidMetadata {
                tool: name.clone(),
                source,
            })?;
    }

    let fqn = FullyQualifiedName::new(
        toolkit.name.clone(),
        name.clone(),
        Some(toolkit.version.clone()),
    );
    let http_endpoint = match function.handler {
        Some(ToolHandler::Http) => function.http_endpoint.clone(),
        _ => None,
    };

    let definition = ToolDefinition {
        name,
        fully_qualified_name: fqn.to_string(),
        description,
        toolkit: toolkit.clone(),
        input: ToolInput {
            parameters,
            tool_context_parameter_name: function.context_param.clone(),
        },
        output,
        requirements: ToolRequirements {
            authorization: options.requires_auth.clone(),
            secrets: options.requires_secrets.clone(),
            metadata,
        },
        deprecation_message: options.deprecation_message.clone(),
        http_endpoint,
    };

    Ok(DerivedTool {
        definition,
        input_validator: InputValidator::new(rules, function.context_param.clone()),
        output_validator,
    })
}

fn validate_tool_name(name: &str) -> Result<(), SchemaDerivationError> {
    let invalid = |reason: &str| SchemaDerivationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let Some(first) = name.chars().next() else {
        return Err(invalid("name is empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with a letter"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits, and underscores are allowed"));
    }
    Ok(())
}

fn parameter_schema(ty: &DeclaredType) -> Result<ValueSchema, String> {
    match ty {
        DeclaredType::Json => Ok(ValueSchema::any_object()),
        DeclaredType::Unit => Err("a parameter cannot be unit".to_string()),
        DeclaredType::Optional(inner) => parameter_schema(inner),
        other => value_schema(other),
    }
}

fn derive_output(
    tool: &str,
    ty: &DeclaredType,
    description: &str,
) -> Result<(ToolOutput, OutputValidator), SchemaDerivationError> {
    let unsupported = |reason: String| SchemaDerivationError::UnsupportedReturn {
        tool: tool.to_string(),
        ty: ty.describe(),
        reason,
    };

    let (schema, modes, nullable) = match ty {
        DeclaredType::Unit => (None, vec![OutputMode::Null, OutputMode::Error], true),
        DeclaredType::Json => (None, vec![OutputMode::Value, OutputMode::Error], false),
        DeclaredType::Optional(inner) => {
            let schema = match inner.as_ref() {
                DeclaredType::Json => None,
                other => Some(value_schema(other).map_err(unsupported)?),
            };
            (
                schema,
                vec![OutputMode::Value, OutputMode::Null, OutputMode::Error],
                true,
            )
        }
        other => (
            Some(value_schema(other).map_err(unsupported)?),
            vec![OutputMode::Value, OutputMode::Error],
            false,
        ),
    };

    let output = ToolOutput {
        value_schema: schema.clone(),
        description: description.to_string(),
        available_modes: modes.into_iter().collect(),
    };
    Ok((output, OutputValidator::new(schema, nullable)))
}

/// Map a declared type onto a value schema
///
/// # Errors
///
/// Returns the reason when the type has no wire representation
pub fn value_schema(ty: &DeclaredType) -> Result<ValueSchema, String> {
    match ty {
        DeclaredType::Str => Ok(ValueSchema::string()),
        DeclaredType::Int => Ok(ValueSchema::integer()),
        DeclaredType::Float => Ok(ValueSchema::number()),
        DeclaredType::Bool => Ok(ValueSchema::boolean()),
        DeclaredType::Enum(values) => {
            if values.is_empty() {
                return Err("an enum needs at least one value".to_string());
            }
            let mut unique = BTreeSet::new();
            if let Some(dup) = values.iter().find(|v| !unique.insert(v.as_str())) {
                return Err(format!("enum value '{}' is repeated", dup));
            }
            Ok(ValueSchema::enumeration(values.iter().cloned()))
        }
        DeclaredType::List(inner) => match inner.as_ref() {
            DeclaredType::Optional(_) => {
                Err("list elements cannot be optional; filter out missing values instead".to_string())
            }
            DeclaredType::List(_) => {
                Err("lists of lists are not supported; wrap the inner list in a struct".to_string())
            }
            DeclaredType::Json => ValueSchema::array(ValueSchema::any_object()).map_err(|e| e.to_string()),
            other => ValueSchema::array(value_schema(other)?).map_err(|e| e.to_string()),
        },
        DeclaredType::Optional(_) => Err("optional is only allowed at the top level of a parameter or return, or as a struct field".to_string()),
        DeclaredType::Struct(s) => struct_schema(s),
        DeclaredType::Map { key, value } => {
            match key.as_ref() {
                DeclaredType::Str | DeclaredType::Enum(_) => {}
                other => {
                    return Err(format!(
                        "map keys must be strings, found {}",
                        other.describe()
                    ))
                }
            }
            match value.as_ref() {
                DeclaredType::Json => {}
                DeclaredType::Optional(inner) => {
                    value_schema(inner)?;
                }
                other => {
                    value_schema(other)?;
                }
            }
            Ok(ValueSchema::any_object())
        }
        DeclaredType::Union {
            variants,
            discriminator,
        } => union_schema(variants, discriminator.as_deref()),
        DeclaredType::Json => Ok(ValueSchema::any_object()),
        DeclaredType::Unit => Err("unit has no value".to_string()),
        DeclaredType::Opaque(name) => Err(format!("{} has no JSON representation", name)),
    }
}

fn struct_properties(s: &StructType) -> Result<IndexMap<String, ValueSchema>, String> {
    let mut properties = IndexMap::with_capacity(s.fields.len());
    for field in &s.fields {
        let schema = match &field.ty {
            DeclaredType::Optional(inner) => field_schema(inner),
            other => field_schema(other),
        }
        .map_err(|reason| format!("field '{}.{}': {}", s.name, field.name, reason))?;
        if properties.insert(field.name.clone(), schema).is_some() {
            return Err(format!("field '{}.{}' is declared twice", s.name, field.name));
        }
    }
    Ok(properties)
}

// Non-optional fields are required
fn struct_schema(s: &StructType) -> Result<ValueSchema, String> {
    let properties = struct_properties(s)?;
    let required = s
        .fields
        .iter()
        .filter(|field| !matches!(field.ty, DeclaredType::Optional(_)))
        .map(|field| field.name.clone());
    ValueSchema::object_with_required(properties, required).map_err(|e| e.to_string())
}

fn field_schema(ty: &DeclaredType) -> Result<ValueSchema, String> {
    match ty {
        DeclaredType::Json => Ok(ValueSchema::any_object()),
        other => value_schema(other),
    }
}

fn union_schema(
    variants: &[(String, DeclaredType)],
    discriminator: Option<&str>,
) -> Result<ValueSchema, String> {
    let Some(tag_field) = discriminator else {
        return Err(
            "unions need a discriminator field so callers can say which variant they mean".to_string(),
        );
    };
    if variants.is_empty() {
        return Err("a union needs at least one variant".to_string());
    }

    let mut properties = IndexMap::new();
    properties.insert(
        tag_field.to_string(),
        ValueSchema::enumeration(variants.iter().map(|(tag, _)| tag.clone())),
    );
    for (tag, variant) in variants {
        let DeclaredType::Struct(s) = variant else {
            return Err(format!(
                "variant '{}' must be a struct, found {}",
                tag,
                variant.describe()
            ));
        };
        for (name, schema) in struct_properties(s)? {
            if name == tag_field {
                return Err(format!(
                    "variant '{}' redeclares the discriminator field '{}'",
                    tag, tag_field
                ));
            }
            match properties.get(&name) {
                Some(existing) if *existing != schema => {
                    return Err(format!(
                        "field '{}' has conflicting types across variants",
                        name
                    ));
                }
                Some(_) => {}
                None => {
                    properties.insert(name, schema);
                }
            }
        }
    }
    // Variants disagree on their fields; only the tag is always present
    ValueSchema::object_with_required(properties, [tag_field]).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::ToolOptions;
    use crate::function::{Param, ToolFunction};
    use armature_core::{Behavior, ToolMetadata, ValType, Verb, Version};
    use serde_json::json;

    fn toolkit() -> ToolkitDefinition {
        ToolkitDefinition {
            name: "Greetings".to_string(),
            version: Version::new(1, 0, 0),
            description: None,
        }
    }

    fn function(name: &str) -> ToolFunction {
        ToolFunction::new(name)
            .doc("Test tool")
            .sync_handler(|_args| Ok(()))
    }

    #[test]
    fn test_name_and_description() {
        let tool = Tool::from(
            ToolFunction::new("say_hello")
                .doc("Say hello.\n\nLonger text")
                .param(Param::new::<String>("name", "Who to greet"))
                .returns::<String>("Greeting")
                .sync_handler(|_| Ok("hi")),
        );
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        assert_eq!(derived.definition.name, "SayHello");
        assert_eq!(derived.definition.fully_qualified_name, "Greetings.SayHello@1.0.0");
        assert_eq!(derived.definition.summary(), "Say hello.");
        let param = &derived.definition.input.parameters[0];
        assert!(param.required);
        assert_eq!(param.value_schema.val_type(), ValType::String);
    }

    #[test]
    fn test_missing_description() {
        let tool = Tool::from(ToolFunction::new("quiet").sync_handler(|_| Ok(())));
        let err = derive_tool(&tool, &toolkit()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDefinition);
        assert!(err.to_string().contains("To fix"));
    }

    #[test]
    fn test_optional_and_default_not_required() {
        let tool = Tool::from(
            function("search")
                .param(Param::new::<Option<String>>("cursor", "Page cursor"))
                .param(Param::new::<u32>("limit", "Page size").with_default(20)),
        );
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        assert!(derived.definition.input.parameters.iter().all(|p| !p.required));
    }

    #[test]
    fn test_context_parameter_excluded() {
        let tool = Tool::from(
            function("fetch")
                .param(Param::new::<String>("id", "Record id"))
                .context_param("context"),
        );
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        let input = &derived.definition.input;
        assert_eq!(input.tool_context_parameter_name.as_deref(), Some("context"));
        assert!(input.parameter("context").is_none());
    }

    #[test]
    fn test_context_conflict() {
        let tool = Tool::from(
            function("fetch")
                .param(Param::new::<String>("context", "Oops"))
                .context_param("context"),
        );
        assert!(matches!(
            derive_tool(&tool, &toolkit()),
            Err(SchemaDerivationError::ContextConflict { .. })
        ));
    }

    #[test]
    fn test_list_of_struct() {
        let item = StructType::new("Item")
            .field::<i64>("id", "Item id")
            .field::<Option<String>>("label", "Label");
        let tool = Tool::from(function("bulk").param(Param::untyped(
            "items",
            "Items",
            DeclaredType::list(item.into()),
        )));
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        let schema = &derived.definition.input.parameters[0].value_schema;
        assert_eq!(schema.inner_val_type(), Some(ValType::Json));
        assert_eq!(schema.properties().unwrap().len(), 2);
    }

    #[test]
    fn test_untyped_struct_keeps_required_fields() {
        let address = StructType::new("Address")
            .field::<String>("city", "City")
            .field::<Option<String>>("zip", "Postal code");
        let tool = Tool::from(function("ship").param(Param::untyped(
            "address",
            "Where to ship",
            address.into(),
        )));
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        let schema = &derived.definition.input.parameters[0].value_schema;
        assert_eq!(schema.required(), ["city"]);

        let rendered = armature_core::json_schema::value_schema(schema);
        assert_eq!(rendered["required"], json!(["city"]));

        let empty = json!({"address": {}});
        let violations = derived
            .input_validator
            .validate(empty.as_object().unwrap())
            .unwrap_err();
        assert_eq!(violations[0].field, "address.city");
        let filled = json!({"address": {"city": "Lima"}});
        assert!(derived.input_validator.validate(filled.as_object().unwrap()).is_ok());
    }

    #[test]
    fn test_unsupported_types_rejected() {
        for ty in [
            DeclaredType::list(DeclaredType::list(DeclaredType::Int)),
            DeclaredType::Opaque("tuple"),
            DeclaredType::Map {
                key: Box::new(DeclaredType::Int),
                value: Box::new(DeclaredType::Str),
            },
            DeclaredType::Union {
                variants: vec![("a".to_string(), DeclaredType::Str)],
                discriminator: None,
            },
            DeclaredType::Enum(Vec::new()),
            DeclaredType::Unit,
        ] {
            let tool = Tool::from(function("bad").param(Param::untyped("x", "x", ty)));
            let err = derive_tool(&tool, &toolkit()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::BadInputSchema, "{}", err);
        }
    }

    #[test]
    fn test_discriminated_union() {
        let circle = StructType::new("Circle").field::<f64>("radius", "Radius");
        let square = StructType::new("Square").field::<f64>("side", "Side");
        let ty = DeclaredType::Union {
            variants: vec![
                ("circle".to_string(), circle.into()),
                ("square".to_string(), square.into()),
            ],
            discriminator: Some("kind".to_string()),
        };
        let schema = value_schema(&ty).unwrap();
        let props = schema.properties().unwrap();
        assert_eq!(
            props["kind"].enum_values().unwrap(),
            &["circle".to_string(), "square".to_string()]
        );
        assert!(props.contains_key("radius"));
        assert!(props.contains_key("side"));
        assert_eq!(schema.required(), ["kind"]);
    }

    #[test]
    fn test_untyped_return_leaves_schema_unset() {
        let tool = Tool::from(function("anything"));
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        assert!(derived.definition.output.value_schema.is_none());
        assert!(derived.output_validator.validate(json!({"any": [1]})).is_ok());
    }

    #[test]
    fn test_unit_return_is_null_mode() {
        let tool = Tool::from(function("noop").returns::<()>("Nothing"));
        let derived = derive_tool(&tool, &toolkit()).unwrap();
        assert!(derived
            .definition
            .output
            .available_modes
            .contains(&OutputMode::Null));
    }

    #[test]
    fn test_bad_default_rejected() {
        let tool = Tool::from(
            function("page").param(Param::new::<u32>("limit", "Page size").with_default("ten")),
        );
        assert!(matches!(
            derive_tool(&tool, &toolkit()),
            Err(SchemaDerivationError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn test_strict_metadata_checked() {
        let metadata = ToolMetadata::new().with_behavior(Behavior {
            verbs: vec![Verb::Delete],
            read_only: Some(true),
            ..Behavior::default()
        });
        let tool = Tool::new(function("purge"), ToolOptions::new().with_metadata(metadata));
        let err = derive_tool(&tool, &toolkit()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadDefinition);
    }

    #[test]
    fn test_duplicate_parameter() {
        let tool = Tool::from(
            function("dup")
                .param(Param::new::<String>("a", "a"))
                .param(Param::new::<String>("a", "again")),
        );
        assert!(matches!(
            derive_tool(&tool, &toolkit()),
            Err(SchemaDerivationError::DuplicateParameter { .. })
        ));
    }
}
