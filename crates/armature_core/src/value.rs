//! Value schemas.
//!
//! A [`ValueSchema`] is a tagged union over the four shapes a tool value can
//! take. On the wire it is flattened into the `{val_type, inner_val_type,
//! enum, properties}` record that tool catalogs exchange; the conversion is
//! checked in both directions so an invalid combination can never be
//! constructed from JSON.

use crate::error::CoreError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level value type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    /// UTF-8 string
    String,
    /// Signed integer
    Integer,
    /// Floating point number
    Number,
    /// Boolean
    Boolean,
    /// Structured JSON object
    Json,
    /// Homogeneous array
    Array,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Array => "array",
        };
        f.write_str(s)
    }
}

/// Scalar value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// UTF-8 string
    String,
    /// Signed integer
    Integer,
    /// Floating point number
    Number,
    /// Boolean
    Boolean,
}

impl ScalarType {
    /// The wire tag for this scalar
    #[must_use]
    pub const fn val_type(self) -> ValType {
        match self {
            Self::String => ValType::String,
            Self::Integer => ValType::Integer,
            Self::Number => ValType::Number,
            Self::Boolean => ValType::Boolean,
        }
    }

    fn from_val_type(val_type: ValType) -> Option<Self> {
        match val_type {
            ValType::String => Some(Self::String),
            ValType::Integer => Some(Self::Integer),
            ValType::Number => Some(Self::Number),
            ValType::Boolean => Some(Self::Boolean),
            ValType::Json | ValType::Array => None,
        }
    }
}

/// Structural type descriptor for one input or output value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireValueSchema", try_from = "WireValueSchema")]
pub enum ValueSchema {
    /// A plain scalar
    Scalar(ScalarType),
    /// A string restricted to an ordered set of literals
    Enum(Vec<String>),
    /// A homogeneous array; the element is never itself an array
    Array(Box<ValueSchema>),
    /// A JSON object
    Object {
        /// Known properties; `None` for an object of unknown shape
        properties: Option<IndexMap<String, ValueSchema>>,
        /// Properties that must be present and non-null
        required: Vec<String>,
    },
}

impl ValueSchema {
    /// String scalar
    #[must_use]
    pub const fn string() -> Self {
        Self::Scalar(ScalarType::String)
    }

    /// Integer scalar
    #[must_use]
    pub const fn integer() -> Self {
        Self::Scalar(ScalarType::Integer)
    }

    /// Number scalar
    #[must_use]
    pub const fn number() -> Self {
        Self::Scalar(ScalarType::Number)
    }

    /// Boolean scalar
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Scalar(ScalarType::Boolean)
    }

    /// String enum with the given literals, in order
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Array of `inner`
    ///
    /// # Errors
    ///
    /// Returns error if `inner` is itself an array
    pub fn array(inner: ValueSchema) -> Result<Self, CoreError> {
        if matches!(inner, Self::Array(_)) {
            return Err(CoreError::InvalidSchema {
                reason: "arrays of arrays are not supported; wrap the inner array in an object"
                    .to_string(),
            });
        }
        Ok(Self::Array(Box::new(inner)))
    }

    /// Object with a known set of properties, none of them required
    #[must_use]
    pub fn object(properties: IndexMap<String, ValueSchema>) -> Self {
        Self::Object {
            properties: Some(properties),
            required: Vec::new(),
        }
    }

    /// Object with a known set of properties, `required` naming those
    /// callers must supply
    ///
    /// # Errors
    ///
    /// Returns error if a required name is not one of the properties
    pub fn object_with_required<I, S>(
        properties: IndexMap<String, ValueSchema>,
        required: I,
    ) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: Vec<String> = required.into_iter().map(Into::into).collect();
        check_required(Some(&properties), &required)?;
        Ok(Self::Object {
            properties: Some(properties),
            required,
        })
    }

    /// Object of unknown shape
    #[must_use]
    pub const fn any_object() -> Self {
        Self::Object {
            properties: None,
            required: Vec::new(),
        }
    }

    /// Wire tag of this schema
    #[must_use]
    pub const fn val_type(&self) -> ValType {
        match self {
            Self::Scalar(scalar) => scalar.val_type(),
            Self::Enum(_) => ValType::String,
            Self::Array(_) => ValType::Array,
            Self::Object { .. } => ValType::Json,
        }
    }

    /// Element type when this is an array
    #[must_use]
    pub fn inner_val_type(&self) -> Option<ValType> {
        match self {
            Self::Array(inner) => Some(inner.val_type()),
            _ => None,
        }
    }

    /// Allowed literals when this is an enum, or an array of enums
    #[must_use]
    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            Self::Enum(values) => Some(values.as_slice()),
            Self::Array(inner) => inner.enum_values(),
            _ => None,
        }
    }

    /// Known object properties, or the element's when this is an array
    #[must_use]
    pub fn properties(&self) -> Option<&IndexMap<String, ValueSchema>> {
        match self {
            Self::Object { properties, .. } => properties.as_ref(),
            Self::Array(inner) => inner.properties(),
            _ => None,
        }
    }

    /// Required object properties, or the element's when this is an array
    #[must_use]
    pub fn required(&self) -> &[String] {
        match self {
            Self::Object { required, .. } => required,
            Self::Array(inner) => inner.required(),
            _ => &[],
        }
    }
}

fn check_required(
    properties: Option<&IndexMap<String, ValueSchema>>,
    required: &[String],
) -> Result<(), CoreError> {
    for name in required {
        if !properties.is_some_and(|props| props.contains_key(name)) {
            return Err(CoreError::InvalidSchema {
                reason: format!("required property '{}' is not declared", name),
            });
        }
    }
    Ok(())
}

/// Flattened wire record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireValueSchema {
    val_type: ValType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inner_val_type: Option<ValType>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    properties: Option<IndexMap<String, WireValueSchema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
}

fn wire_properties(
    properties: &Option<IndexMap<String, ValueSchema>>,
) -> Option<IndexMap<String, WireValueSchema>> {
    properties.as_ref().map(|props| {
        props
            .iter()
            .map(|(name, schema)| (name.clone(), WireValueSchema::from(schema.clone())))
            .collect()
    })
}

impl From<ValueSchema> for WireValueSchema {
    fn from(schema: ValueSchema) -> Self {
        match schema {
            ValueSchema::Scalar(scalar) => Self {
                val_type: scalar.val_type(),
                inner_val_type: None,
                enum_values: None,
                properties: None,
                required: Vec::new(),
            },
            ValueSchema::Enum(values) => Self {
                val_type: ValType::String,
                inner_val_type: None,
                enum_values: Some(values),
                properties: None,
                required: Vec::new(),
            },
            ValueSchema::Array(inner) => {
                let element = WireValueSchema::from(*inner);
                Self {
                    val_type: ValType::Array,
                    inner_val_type: Some(element.val_type),
                    enum_values: element.enum_values,
                    properties: element.properties,
                    required: element.required,
                }
            }
            ValueSchema::Object {
                properties,
                required,
            } => Self {
                val_type: ValType::Json,
                inner_val_type: None,
                enum_values: None,
                properties: wire_properties(&properties),
                required,
            },
        }
    }
}

fn element_from_wire(
    val_type: ValType,
    enum_values: Option<Vec<String>>,
    properties: Option<IndexMap<String, WireValueSchema>>,
    required: Vec<String>,
) -> Result<ValueSchema, CoreError> {
    match val_type {
        ValType::Array => Err(CoreError::InvalidSchema {
            reason: "inner_val_type cannot be array".to_string(),
        }),
        ValType::Json => {
            if enum_values.is_some() {
                return Err(CoreError::InvalidSchema {
                    reason: "enum is only allowed on string values".to_string(),
                });
            }
            let properties = properties
                .map(|props| {
                    props
                        .into_iter()
                        .map(|(name, wire)| ValueSchema::try_from(wire).map(|s| (name, s)))
                        .collect::<Result<IndexMap<_, _>, _>>()
                })
                .transpose()?;
            check_required(properties.as_ref(), &required)?;
            Ok(ValueSchema::Object {
                properties,
                required,
            })
        }
        scalar => {
            if properties.is_some() || !required.is_empty() {
                return Err(CoreError::InvalidSchema {
                    reason: format!(
                        "properties and required are only allowed on json values, not {}",
                        scalar
                    ),
                });
            }
            match (scalar, enum_values) {
                (ValType::String, Some(values)) => Ok(ValueSchema::Enum(values)),
                (_, Some(_)) => Err(CoreError::InvalidSchema {
                    reason: format!("enum is only allowed on string values, not {}", scalar),
                }),
                (_, None) => ScalarType::from_val_type(scalar)
                    .map(ValueSchema::Scalar)
                    .ok_or_else(|| CoreError::InvalidSchema {
                        reason: format!("{} is not a scalar type", scalar),
                    }),
            }
        }
    }
}

impl TryFrom<WireValueSchema> for ValueSchema {
    type Error = CoreError;

    fn try_from(wire: WireValueSchema) -> Result<Self, Self::Error> {
        match wire.val_type {
            ValType::Array => {
                let inner = wire.inner_val_type.ok_or_else(|| CoreError::InvalidSchema {
                    reason: "array values require inner_val_type".to_string(),
                })?;
                let element =
                    element_from_wire(inner, wire.enum_values, wire.properties, wire.required)?;
                Ok(Self::Array(Box::new(element)))
            }
            other => {
                if wire.inner_val_type.is_some() {
                    return Err(CoreError::InvalidSchema {
                        reason: format!("inner_val_type is only allowed on arrays, not {}", other),
                    });
                }
                element_from_wire(other, wire.enum_values, wire.properties, wire.required)
            }
        }
    }
}
