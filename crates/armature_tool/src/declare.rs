//! Tool declaration surface.
//!
//! Rust cannot introspect a function signature at runtime, so every tool
//! parameter and return type describes itself through [`ToolType`]. The
//! deriver maps the resulting [`DeclaredType`] tree onto a
//! [`ValueSchema`](armature_core::ValueSchema), rejecting the shapes the
//! wire format cannot express.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use armature_core::{ToolAuthorization, ToolMetadata};
use indexmap::IndexMap;

/// Language-level type of a tool parameter or return value
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    /// UTF-8 string
    Str,
    /// Signed or unsigned integer
    Int,
    /// Floating point number
    Float,
    /// Boolean
    Bool,
    /// Restricted choice over string literals, in declaration order
    Enum(Vec<String>),
    /// Homogeneous sequence
    List(Box<DeclaredType>),
    /// Value that may be absent
    Optional(Box<DeclaredType>),
    /// Named record with typed fields
    Struct(StructType),
    /// Key-value mapping
    Map {
        /// Key type
        key: Box<DeclaredType>,
        /// Value type
        value: Box<DeclaredType>,
    },
    /// Tagged union of records
    Union {
        /// `(tag, variant)` pairs
        variants: Vec<(String, DeclaredType)>,
        /// Field carrying the tag, when the union is internally tagged
        discriminator: Option<String>,
    },
    /// Arbitrary JSON
    Json,
    /// No value
    Unit,
    /// A type with no wire representation
    Opaque(&'static str),
}

impl DeclaredType {
    /// Enum over the given literals
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// List of `inner`
    #[must_use]
    pub fn list(inner: DeclaredType) -> Self {
        Self::List(Box::new(inner))
    }

    /// Optional `inner`
    #[must_use]
    pub fn optional(inner: DeclaredType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Whether callers may omit a value of this type
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Short human name used in derivation errors
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Str => "str".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Bool => "bool".to_string(),
            Self::Enum(values) => format!("enum[{}]", values.join(", ")),
            Self::List(inner) => format!("list[{}]", inner.describe()),
            Self::Optional(inner) => format!("optional[{}]", inner.describe()),
            Self::Struct(s) => s.name.clone(),
            Self::Map { key, value } => format!("map[{}, {}]", key.describe(), value.describe()),
            Self::Union { variants, .. } => {
                let names: Vec<&str> = variants.iter().map(|(tag, _)| tag.as_str()).collect();
                format!("union[{}]", names.join(" | "))
            }
            Self::Json => "json".to_string(),
            Self::Unit => "unit".to_string(),
            Self::Opaque(name) => (*name).to_string(),
        }
    }
}

/// Named record type
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    /// Type name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<StructField>,
}

impl StructType {
    /// Empty record named `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field whose type implements [`ToolType`]
    #[must_use]
    pub fn field<T: ToolType>(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.field_of(name, description, T::declared_type())
    }

    /// Add a field with an explicit type
    #[must_use]
    pub fn field_of(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        ty: DeclaredType,
    ) -> Self {
        self.fields.push(StructField {
            name: name.into(),
            description: description.into(),
            ty,
        });
        self
    }
}

impl From<StructType> for DeclaredType {
    fn from(value: StructType) -> Self {
        Self::Struct(value)
    }
}

/// One field of a [`StructType`]
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    /// Field name
    pub name: String,
    /// Human description
    pub description: String,
    /// Field type
    pub ty: DeclaredType,
}

/// Types usable as tool parameters or return values
pub trait ToolType {
    /// Declared shape of this type
    fn declared_type() -> DeclaredType;
}

macro_rules! declare_scalar {
    ($variant:ident: $($ty:ty),+ $(,)?) => {
        $(
            impl ToolType for $ty {
                fn declared_type() -> DeclaredType {
                    DeclaredType::$variant
                }
            }
        )+
    };
}

declare_scalar!(Str: String, str, char);
declare_scalar!(Int: i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
declare_scalar!(Float: f32, f64);
declare_scalar!(Bool: bool);
declare_scalar!(Json: serde_json::Value);
declare_scalar!(Unit: ());

impl<T: ToolType + ?Sized> ToolType for &T {
    fn declared_type() -> DeclaredType {
        T::declared_type()
    }
}

impl<T: ToolType + ?Sized> ToolType for Box<T> {
    fn declared_type() -> DeclaredType {
        T::declared_type()
    }
}

impl<T: ToolType> ToolType for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }
}

impl<T: ToolType> ToolType for [T] {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }
}

impl<T: ToolType> ToolType for BTreeSet<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }
}

impl<T: ToolType, S> ToolType for HashSet<T, S> {
    fn declared_type() -> DeclaredType {
        DeclaredType::list(T::declared_type())
    }
}

impl<T: ToolType> ToolType for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::optional(T::declared_type())
    }
}

macro_rules! declare_map {
    ($($map:ident),+) => {
        $(
            impl<K: ToolType, V: ToolType, S> ToolType for $map<K, V, S> {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Map {
                        key: Box::new(K::declared_type()),
                        value: Box::new(V::declared_type()),
                    }
                }
            }
        )+
    };
}

declare_map!(HashMap, IndexMap);

impl<K: ToolType, V: ToolType> ToolType for BTreeMap<K, V> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Map {
            key: Box::new(K::declared_type()),
            value: Box::new(V::declared_type()),
        }
    }
}

macro_rules! declare_tuple {
    ($($ty:ident),+) => {
        impl<$($ty),+> ToolType for ($($ty,)+) {
            fn declared_type() -> DeclaredType {
                DeclaredType::Opaque("tuple")
            }
        }
    };
}

declare_tuple!(A, B);
declare_tuple!(A, B, C);
declare_tuple!(A, B, C, D);

/// Registration-time tool configuration
///
/// Everything a tool author can say about a tool beyond its signature.
#[derive(Debug, Clone, Default)]
pub struct ToolOptions {
    /// Description; falls back to the function's doc text
    pub description: Option<String>,
    /// Name override; defaults to the PascalCase function name
    pub name: Option<String>,
    /// Secret keys the tool reads, in order
    pub requires_secrets: Vec<String>,
    /// End-user authorization the tool needs
    pub requires_auth: Option<ToolAuthorization>,
    /// Behavioral and classification tags
    pub metadata: Option<ToolMetadata>,
    /// Marks the tool deprecated
    pub deprecation_message: Option<String>,
}

impl ToolOptions {
    /// Empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the tool name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require a secret
    #[must_use]
    pub fn with_secret(mut self, key: impl Into<String>) -> Self {
        self.requires_secrets.push(key.into());
        self
    }

    /// Require end-user authorization
    #[must_use]
    pub fn with_auth(mut self, auth: ToolAuthorization) -> Self {
        self.requires_auth = Some(auth);
        self
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Mark deprecated
    #[must_use]
    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_declarations() {
        assert_eq!(String::declared_type(), DeclaredType::Str);
        assert_eq!(u32::declared_type(), DeclaredType::Int);
        assert_eq!(f64::declared_type(), DeclaredType::Float);
        assert_eq!(<()>::declared_type(), DeclaredType::Unit);
    }

    #[test]
    fn test_container_declarations() {
        assert_eq!(
            Vec::<i64>::declared_type(),
            DeclaredType::list(DeclaredType::Int)
        );
        assert_eq!(
            Option::<String>::declared_type(),
            DeclaredType::optional(DeclaredType::Str)
        );
        assert!(matches!(
            HashMap::<String, bool>::declared_type(),
            DeclaredType::Map { .. }
        ));
        assert_eq!(<(i32, i32)>::declared_type(), DeclaredType::Opaque("tuple"));
    }

    #[test]
    fn test_describe() {
        let ty = DeclaredType::list(DeclaredType::optional(DeclaredType::Str));
        assert_eq!(ty.describe(), "list[optional[str]]");
    }

    #[test]
    fn test_struct_builder_keeps_order() {
        let s = StructType::new("Shape")
            .field::<String>("kind", "Shape kind")
            .field::<u32>("sides", "Number of sides");
        let names: Vec<&str> = s.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["kind", "sides"]);
    }
}
