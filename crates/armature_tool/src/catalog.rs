//! Tool catalog.
//!
//! The catalog owns every registered [`MaterializedTool`], keyed by
//! fully-qualified name. Registration derives the definition and
//! validators once; lookups hand out shared, immutable entries.

use std::collections::BTreeSet;
use std::sync::Arc;

use armature_core::{
    normalize_tool_name, validate_toolkit_name, CoreError, ErrorCode, FullyQualifiedName,
    ToolDefinition, ToolReference, ToolkitDefinition, Version,
};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::derive::{derive_tool, SchemaDerivationError};
use crate::function::{Tool, ToolHandler};
use crate::http::AUTH_TOKEN_KEY;
use crate::validate::{InputValidator, OutputValidator};

/// Catalog entry: a tool ready to run
#[derive(Debug)]
pub struct MaterializedTool {
    /// How the body runs
    pub handler: ToolHandler,
    /// Immutable descriptor
    pub definition: ToolDefinition,
    /// Guards raw inputs
    pub input_validator: InputValidator,
    /// Guards return values
    pub output_validator: OutputValidator,
    // Serialized definition, fed to the catalog digest
    canonical: Vec<u8>,
}

impl MaterializedTool {
    /// Identity of this tool
    #[must_use]
    pub fn fully_qualified(&self) -> FullyQualifiedName {
        self.definition.fully_qualified()
    }
}

/// A named, versioned group of tools registered together
#[derive(Debug, Clone)]
pub struct Toolkit {
    /// Toolkit name
    pub name: String,
    /// Toolkit version
    pub version: Version,
    /// Human description
    pub description: Option<String>,
    /// Tools in registration order
    pub tools: Vec<Tool>,
}

impl Toolkit {
    /// Empty toolkit
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: None,
            tools: Vec::new(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a tool
    #[must_use]
    pub fn tool(mut self, tool: impl Into<Tool>) -> Self {
        self.tools.push(tool.into());
        self
    }

    /// Identity of this toolkit
    #[must_use]
    pub fn definition(&self) -> ToolkitDefinition {
        ToolkitDefinition {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }
}

/// Catalog registration and lookup errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The tool could not be derived
    #[error(transparent)]
    Derivation(#[from] SchemaDerivationError),

    /// The toolkit name is unusable
    #[error("Toolkit name '{name}' is invalid: {source}")]
    InvalidToolkit {
        name: String,
        #[source]
        source: CoreError,
    },

    /// A tool with this identity already exists
    #[error("Tool '{name}' is already registered; tool names must be unique within a toolkit version")]
    Duplicate { name: String },

    /// No tool matches
    #[error("Tool '{name}' not found. Known tools: {known}")]
    NotFound { name: String, known: String },

    /// More than one toolkit defines the name
    #[error("Tool name '{name}' is ambiguous; it is defined by {candidates}. Use a fully-qualified name such as '{example}'")]
    Ambiguous {
        name: String,
        candidates: String,
        example: String,
    },

    /// The reference could not be parsed
    #[error("Invalid tool reference '{name}': {reason}")]
    InvalidReference { name: String, reason: String },

    /// The derived definition does not serialize
    #[error("Definition of tool '{name}' cannot be serialized: {source}")]
    Unserializable {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CatalogError {
    /// Error code reported for this failure
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Derivation(err) => err.code(),
            Self::InvalidToolkit { .. } | Self::Duplicate { .. } | Self::Unserializable { .. } => {
                ErrorCode::BadDefinition
            }
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Ambiguous { .. } | Self::InvalidReference { .. } => ErrorCode::BadRequest,
        }
    }
}

/// Registered tools, keyed by fully-qualified name
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: IndexMap<FullyQualifiedName, Arc<MaterializedTool>>,
}

impl ToolCatalog {
    /// Empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and register one tool under `toolkit`
    ///
    /// # Errors
    ///
    /// Returns error if derivation fails or the name is taken
    pub fn add_tool(
        &mut self,
        tool: impl Into<Tool>,
        toolkit: &ToolkitDefinition,
    ) -> Result<FullyQualifiedName, CatalogError> {
        validate_toolkit(toolkit)?;
        let entry = materialize(&tool.into(), toolkit)?;
        let fqn = entry.fully_qualified();
        if self.tools.contains_key(&fqn) {
            return Err(CatalogError::Duplicate {
                name: fqn.to_string(),
            });
        }
        debug!(tool = %fqn, "Registered tool");
        self.tools.insert(fqn.clone(), Arc::new(entry));
        Ok(fqn)
    }

    /// Register every tool in `toolkit`, or none of them
    ///
    /// # Errors
    ///
    /// Returns the first derivation or duplicate error; the catalog is
    /// left unchanged
    pub fn add_toolkit(&mut self, toolkit: Toolkit) -> Result<usize, CatalogError> {
        let definition = toolkit.definition();
        validate_toolkit(&definition)?;

        let mut staged: IndexMap<FullyQualifiedName, MaterializedTool> = IndexMap::new();
        for tool in &toolkit.tools {
            let entry = materialize(tool, &definition)?;
            let fqn = entry.fully_qualified();
            if self.tools.contains_key(&fqn) || staged.contains_key(&fqn) {
                return Err(CatalogError::Duplicate {
                    name: fqn.to_string(),
                });
            }
            staged.insert(fqn, entry);
        }

        let count = staged.len();
        for (fqn, entry) in staged {
            self.tools.insert(fqn, Arc::new(entry));
        }
        info!(
            toolkit = %definition.name,
            version = %definition.version,
            tools = count,
            "Registered toolkit"
        );
        Ok(count)
    }

    /// Look up by fully-qualified name; a missing version picks the latest
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] listing known tools
    pub fn get_tool(&self, name: &FullyQualifiedName) -> Result<Arc<MaterializedTool>, CatalogError> {
        if name.toolkit_version.is_some() {
            if let Some(tool) = self.tools.get(name) {
                return Ok(Arc::clone(tool));
            }
        } else if let Some(tool) = self
            .tools
            .iter()
            .filter(|(fqn, _)| fqn.matches(name))
            .max_by(|(a, _), (b, _)| a.toolkit_version.cmp(&b.toolkit_version))
            .map(|(_, tool)| tool)
        {
            return Ok(Arc::clone(tool));
        }
        Err(self.not_found(&name.to_string()))
    }

    /// Look up by plain (`SayHello`) or dotted (`Greetings.SayHello`) name
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when nothing matches and
    /// [`CatalogError::Ambiguous`] when several toolkits define the name
    pub fn get_tool_by_name(&self, name: &str) -> Result<Arc<MaterializedTool>, CatalogError> {
        if name.contains('.') {
            let fqn: FullyQualifiedName =
                name.parse().map_err(|e: CoreError| CatalogError::InvalidReference {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            return self.get_tool(&fqn);
        }

        let wanted = normalize_tool_name(name);
        let matches: Vec<&FullyQualifiedName> = self
            .tools
            .keys()
            .filter(|fqn| normalize_tool_name(&fqn.name) == wanted)
            .collect();
        let toolkits: BTreeSet<String> = matches
            .iter()
            .map(|fqn| normalize_tool_name(&fqn.toolkit_name))
            .collect();

        match toolkits.len() {
            0 => Err(self.not_found(name)),
            1 => self.get_tool(&matches[0].without_version()),
            _ => {
                let candidates: Vec<String> = matches.iter().map(ToString::to_string).collect();
                Err(CatalogError::Ambiguous {
                    name: name.to_string(),
                    candidates: candidates.join(", "),
                    example: matches[0].dotted(),
                })
            }
        }
    }

    /// Resolve a wire-level reference
    ///
    /// # Errors
    ///
    /// Returns error when the version is malformed or no tool matches
    pub fn resolve(&self, reference: &ToolReference) -> Result<Arc<MaterializedTool>, CatalogError> {
        let version = match reference.version.as_deref().filter(|v| !v.is_empty()) {
            Some(raw) => Some(Version::parse(raw).map_err(|e| CatalogError::InvalidReference {
                name: reference.name.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        match (&reference.toolkit, version) {
            (Some(toolkit), version) => {
                self.get_tool(&FullyQualifiedName::new(toolkit.clone(), reference.name.clone(), version))
            }
            (None, None) => self.get_tool_by_name(&reference.name),
            (None, Some(version)) => {
                let tool = self.get_tool_by_name(&reference.name)?;
                let mut fqn = tool.fully_qualified();
                fqn.toolkit_version = Some(version);
                self.get_tool(&fqn)
            }
        }
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &FullyQualifiedName) -> bool {
        self.get_tool(name).is_ok()
    }

    /// Every tool, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MaterializedTool>> {
        self.tools.values()
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every definition, in registration order
    #[must_use]
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        self.tools.values().map(|t| &t.definition).collect()
    }

    /// Distinct toolkits, in registration order
    #[must_use]
    pub fn toolkits(&self) -> Vec<ToolkitDefinition> {
        let mut seen = Vec::<ToolkitDefinition>::new();
        for tool in self.tools.values() {
            if !seen.contains(&tool.definition.toolkit) {
                seen.push(tool.definition.toolkit.clone());
            }
        }
        seen
    }

    /// Tools registered under `toolkit` (any version)
    #[must_use]
    pub fn tools_in_toolkit(&self, toolkit: &str) -> Vec<Arc<MaterializedTool>> {
        let wanted = normalize_tool_name(toolkit);
        self.tools
            .iter()
            .filter(|(fqn, _)| normalize_tool_name(&fqn.toolkit_name) == wanted)
            .map(|(_, tool)| Arc::clone(tool))
            .collect()
    }

    /// SHA-256 over the definitions sorted by name; stable across
    /// registration order
    ///
    /// Each definition was serialized when it was registered, so this
    /// cannot fail.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut tools: Vec<&MaterializedTool> = self.tools.values().map(AsRef::as_ref).collect();
        tools.sort_by(|a, b| {
            a.definition
                .fully_qualified_name
                .cmp(&b.definition.fully_qualified_name)
        });
        let mut hasher = Sha256::new();
        for tool in tools {
            hasher.update(&tool.canonical);
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    fn not_found(&self, name: &str) -> CatalogError {
        let known: Vec<String> = self.tools.keys().map(ToString::to_string).collect();
        CatalogError::NotFound {
            name: name.to_string(),
            known: if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            },
        }
    }
}

fn validate_toolkit(toolkit: &ToolkitDefinition) -> Result<(), CatalogError> {
    validate_toolkit_name(&toolkit.name).map_err(|source| CatalogError::InvalidToolkit {
        name: toolkit.name.clone(),
        source,
    })
}

fn materialize(tool: &Tool, toolkit: &ToolkitDefinition) -> Result<MaterializedTool, CatalogError> {
    let derived = derive_tool(tool, toolkit)?;
    let handler = tool
        .function
        .handler
        .clone()
        .ok_or_else(|| SchemaDerivationError::MissingHandler {
            tool: derived.definition.name.clone(),
        })?;
    warn_on_http_drift(&derived.definition);
    let canonical =
        serde_json::to_vec(&derived.definition).map_err(|source| CatalogError::Unserializable {
            name: derived.definition.fully_qualified_name.clone(),
            source,
        })?;
    Ok(MaterializedTool {
        handler,
        definition: derived.definition,
        input_validator: derived.input_validator,
        output_validator: derived.output_validator,
        canonical,
    })
}

/// Warn when an HTTP endpoint requires a value the tool can never supply
///
/// Drift is still reported at call time as a runtime error; this only
/// surfaces it earlier.
fn warn_on_http_drift(definition: &ToolDefinition) {
    let Some(endpoint) = &definition.http_endpoint else {
        return;
    };

    let mut supplied: BTreeSet<String> = definition
        .input
        .parameters
        .iter()
        .filter_map(|p| p.http_endpoint_parameter_name.clone())
        .collect();
    supplied.insert(AUTH_TOKEN_KEY.to_string());
    supplied.extend(definition.requirements.secrets.iter().map(|s| s.to_lowercase()));

    for param in &definition.input.parameters {
        if param.http_endpoint_parameter_name.is_none() {
            warn!(
                tool = %definition.fully_qualified_name,
                input = %param.name,
                "HTTP-backed tool input has no endpoint parameter name"
            );
        }
    }
    for param in endpoint.parameters.iter().filter(|p| p.required) {
        if !supplied.contains(&param.name) {
            warn!(
                tool = %definition.fully_qualified_name,
                parameter = %param.name,
                "Required HTTP endpoint parameter is not supplied by any tool input"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Param, ToolFunction};

    fn hello(name: &str) -> Tool {
        Tool::from(
            ToolFunction::new(name)
                .doc("Say hello")
                .param(Param::new::<String>("name", "Who"))
                .sync_handler(|args| Ok(format!("Hello, {}!", args.get::<String>("name")?))),
        )
    }

    fn greetings(version: Version) -> ToolkitDefinition {
        ToolkitDefinition {
            name: "Greetings".to_string(),
            version,
            description: None,
        }
    }

    #[test]
    fn test_add_and_get() {
        let mut catalog = ToolCatalog::new();
        let fqn = catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        assert_eq!(fqn.to_string(), "Greetings.SayHello@1.0.0");
        assert!(catalog.get_tool(&fqn).is_ok());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = ToolCatalog::new();
        let toolkit = greetings(Version::new(1, 0, 0));
        catalog.add_tool(hello("say_hello"), &toolkit).unwrap();
        let err = catalog.add_tool(hello("say_hello"), &toolkit).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_not_found_lists_known() {
        let mut catalog = ToolCatalog::new();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        let err = catalog.get_tool_by_name("Wave").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("Greetings.SayHello@1.0.0"));
    }

    #[test]
    fn test_unversioned_lookup_picks_latest() {
        let mut catalog = ToolCatalog::new();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 2, 0)))
            .unwrap();
        let tool = catalog.get_tool_by_name("Greetings.SayHello").unwrap();
        assert_eq!(tool.definition.toolkit.version, Version::new(1, 2, 0));
        let pinned = catalog.get_tool_by_name("Greetings.SayHello@1.0.0").unwrap();
        assert_eq!(pinned.definition.toolkit.version, Version::new(1, 0, 0));
    }

    #[test]
    fn test_ambiguous_plain_name() {
        let mut catalog = ToolCatalog::new();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        let other = ToolkitDefinition {
            name: "Welcome".to_string(),
            version: Version::new(0, 1, 0),
            description: None,
        };
        catalog.add_tool(hello("say_hello"), &other).unwrap();
        let err = catalog.get_tool_by_name("SayHello").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Greetings.SayHello@1.0.0"));
        assert!(message.contains("Welcome.SayHello@0.1.0"));
        assert!(catalog.get_tool_by_name("Welcome.SayHello").is_ok());
    }

    #[test]
    fn test_plain_name_is_case_and_underscore_insensitive() {
        let mut catalog = ToolCatalog::new();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        assert!(catalog.get_tool_by_name("say_hello").is_ok());
        assert!(catalog.get_tool_by_name("SAYHELLO").is_ok());
    }

    #[test]
    fn test_add_toolkit_all_or_nothing() {
        let mut catalog = ToolCatalog::new();
        let toolkit = Toolkit::new("Greetings", Version::new(1, 0, 0))
            .tool(hello("say_hello"))
            .tool(ToolFunction::new("undocumented").sync_handler(|_| Ok(())));
        assert!(catalog.add_toolkit(toolkit).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_invalid_toolkit_name() {
        let mut catalog = ToolCatalog::new();
        let bad = ToolkitDefinition {
            name: "my toolkit".to_string(),
            version: Version::new(1, 0, 0),
            description: None,
        };
        let err = catalog.add_tool(hello("say_hello"), &bad).unwrap_err();
        assert!(err.to_string().contains("Greetings"));
    }

    #[test]
    fn test_resolve_reference() {
        let mut catalog = ToolCatalog::new();
        catalog
            .add_tool(hello("say_hello"), &greetings(Version::new(1, 0, 0)))
            .unwrap();
        let reference = ToolReference {
            name: "SayHello".to_string(),
            toolkit: Some("Greetings".to_string()),
            version: Some("1.0.0".to_string()),
        };
        assert!(catalog.resolve(&reference).is_ok());
        let missing = ToolReference {
            version: Some("2.0.0".to_string()),
            ..reference
        };
        assert!(matches!(
            catalog.resolve(&missing),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn test_digest_independent_of_order() {
        let v1 = greetings(Version::new(1, 0, 0));
        let mut a = ToolCatalog::new();
        a.add_tool(hello("say_hello"), &v1).unwrap();
        a.add_tool(hello("say_hi"), &v1).unwrap();
        let mut b = ToolCatalog::new();
        b.add_tool(hello("say_hi"), &v1).unwrap();
        b.add_tool(hello("say_hello"), &v1).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_digest_tracks_definitions() {
        let v1 = greetings(Version::new(1, 0, 0));
        let mut catalog = ToolCatalog::new();
        let empty = catalog.digest();
        catalog.add_tool(hello("say_hello"), &v1).unwrap();
        let one = catalog.digest();
        assert_ne!(one, empty);

        let mut renamed = ToolCatalog::new();
        renamed.add_tool(hello("say_hi"), &v1).unwrap();
        assert_ne!(renamed.digest(), one);

        let entry = catalog.get_tool_by_name("SayHello").unwrap();
        let reparsed: ToolDefinition = serde_json::from_slice(&entry.canonical).unwrap();
        assert_eq!(reparsed, entry.definition);
    }
}
