//! Tool definitions.
//!
//! A [`ToolDefinition`] is the immutable descriptor produced once at
//! registration time. It is what catalogs list, what the MCP layer converts
//! to JSON Schema, and what the executor consults on every call.

use crate::error::CoreError;
use crate::name::FullyQualifiedName;
use crate::value::{ValType, ValueSchema};
use crate::version::Version;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One declared tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameter {
    /// Parameter name, unique within the tool
    pub name: String,
    /// Human description shown to the model
    #[serde(default)]
    pub description: String,
    /// Whether callers must supply this parameter
    pub required: bool,
    /// Value shape
    pub value_schema: ValueSchema,
    /// Wire parameter this input maps to when the tool is HTTP-backed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_endpoint_parameter_name: Option<String>,
}

impl InputParameter {
    /// Create a new parameter
    #[must_use]
    pub fn new(name: impl Into<String>, value_schema: ValueSchema, required: bool) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required,
            value_schema,
            http_endpoint_parameter_name: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Map this input to an HTTP endpoint parameter
    #[must_use]
    pub fn with_http_name(mut self, http_name: impl Into<String>) -> Self {
        self.http_endpoint_parameter_name = Some(http_name.into());
        self
    }
}

/// Ordered tool inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// Parameters in declaration order
    pub parameters: Vec<InputParameter>,
    /// Parameter that receives the execution context; never part of
    /// `parameters`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_context_parameter_name: Option<String>,
}

impl ToolInput {
    /// Look up a parameter by name
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&InputParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Names of required parameters, in declaration order
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }
}

/// Output representation a tool may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// A value payload
    Value,
    /// A structured error
    Error,
    /// No value (unit return)
    Null,
}

/// Declared tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Output shape; `None` means any JSON value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_schema: Option<ValueSchema>,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Representations the tool may produce
    pub available_modes: BTreeSet<OutputMode>,
}

impl Default for ToolOutput {
    fn default() -> Self {
        Self {
            value_schema: None,
            description: String::new(),
            available_modes: [OutputMode::Value, OutputMode::Error].into_iter().collect(),
        }
    }
}

/// Authorization a tool needs from the end user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAuthorization {
    /// Provider id (`google`, `slack`, ...)
    pub provider_id: String,
    /// Provider type
    #[serde(default = "default_provider_type")]
    pub provider_type: String,
    /// OAuth-style scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_provider_type() -> String {
    "oauth2".to_string()
}

impl ToolAuthorization {
    /// OAuth2 requirement for `provider_id`
    #[must_use]
    pub fn oauth2<I, S>(provider_id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider_id: provider_id.into(),
            provider_type: default_provider_type(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Action a tool performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// Retrieves data
    Read,
    /// Creates new records
    Create,
    /// Modifies existing records
    Update,
    /// Removes records
    Delete,
    /// Triggers an action or process
    Execute,
    /// Changes who can do what
    Authorize,
}

impl Verb {
    /// Whether the verb mutates state
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Kind of system a tool talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    /// Hosted SaaS API
    SaasApi,
    /// Database
    Database,
    /// Local or remote file system
    FileSystem,
    /// Public web
    Web,
    /// Host operating system
    OperatingSystem,
    /// Custom API
    CustomApi,
    /// Pure in-process computation
    SelfContained,
}

/// Behavioral tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    /// Actions performed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<Verb>,
    /// Only reads data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Can cause irreversible data loss
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive: Option<bool>,
    /// Repeated calls have no additional effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
    /// Interacts with systems outside the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world: Option<bool>,
}

/// What a tool is for and what it connects to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Capability areas (`messaging`, `documents`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    /// Systems the tool interfaces with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_types: Vec<SystemType>,
}

/// Free-form tool metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Purpose and connected systems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Effects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,
    /// Arbitrary key/values
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extras: IndexMap<String, serde_json::Value>,
    /// Reject contradictory tags at registration
    #[serde(skip, default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

impl ToolMetadata {
    /// Create empty strict metadata
    #[must_use]
    pub fn new() -> Self {
        Self {
            classification: None,
            behavior: None,
            extras: IndexMap::new(),
            strict: true,
        }
    }

    /// Set behavior
    #[must_use]
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Set classification
    #[must_use]
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Add an extra key/value
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Disable contradiction checks
    #[must_use]
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Check behavior and classification for contradictions
    ///
    /// # Errors
    ///
    /// Returns error describing the contradiction when `strict` is set
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.strict {
            return Ok(());
        }
        const BYPASS: &str =
            "Fix the contradiction, or mark the metadata lenient to bypass this check";

        if let Some(behavior) = &self.behavior {
            let mutating: Vec<String> = behavior
                .verbs
                .iter()
                .filter(|v| v.is_mutating())
                .map(|v| format!("{:?}", v).to_uppercase())
                .collect();
            if !mutating.is_empty() && behavior.read_only == Some(true) {
                return Err(CoreError::InvalidSchema {
                    reason: format!(
                        "tool has the mutating verb(s) '{}' but is marked read_only. {}",
                        mutating.join(", "),
                        BYPASS
                    ),
                });
            }
            if behavior.verbs.contains(&Verb::Delete) && behavior.destructive == Some(false) {
                return Err(CoreError::InvalidSchema {
                    reason: format!(
                        "tool has the 'DELETE' verb but is not marked destructive. {}",
                        BYPASS
                    ),
                });
            }

            if let Some(classification) = &self.classification {
                let types = &classification.system_types;
                let closed_only =
                    !types.is_empty() && types.iter().all(|t| *t == SystemType::SelfContained);
                if closed_only && behavior.open_world == Some(true) {
                    return Err(CoreError::InvalidSchema {
                        reason: format!(
                            "tool is classified as self-contained but is marked open_world. {}",
                            BYPASS
                        ),
                    });
                }
                if !types.is_empty() && !closed_only && behavior.open_world == Some(false) {
                    return Err(CoreError::InvalidSchema {
                        reason: format!(
                            "tool talks to a remote system but is marked open_world=false. {}",
                            BYPASS
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Requirements the caller must satisfy before the tool can run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequirements {
    /// End-user authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<ToolAuthorization>,
    /// Secret keys, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    /// Behavioral and classification tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolMetadata>,
}

/// Toolkit identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitDefinition {
    /// Toolkit name
    pub name: String,
    /// Toolkit version
    pub version: Version,
    /// Human description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// HTTP verb for templated endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// Where an endpoint parameter travels in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptedAs {
    /// URL path segment (`{name}` in the URL template)
    Path,
    /// Query string
    Query,
    /// Header template input
    Header,
    /// JSON body field
    Body,
    /// Form field
    FormData,
}

/// One parameter of a templated HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpEndpointParameter {
    /// Wire name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Wire value type
    pub val_type: ValType,
    /// Where the value is placed
    pub accepted_as: AcceptedAs,
    /// Whether the endpoint requires it
    pub required: bool,
}

impl HttpEndpointParameter {
    /// Create a new endpoint parameter
    #[must_use]
    pub fn new(name: impl Into<String>, accepted_as: AcceptedAs, required: bool) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            val_type: ValType::String,
            accepted_as,
            required,
        }
    }

    /// Set the wire value type
    #[must_use]
    pub fn with_val_type(mut self, val_type: ValType) -> Self {
        self.val_type = val_type;
        self
    }
}

/// Templated HTTP endpoint backing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpEndpoint {
    /// URL template; `{name}` placeholders are path parameters
    pub url: String,
    /// HTTP verb
    pub http_method: HttpMethod,
    /// Header templates; `{name}` placeholders are header parameters
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Declared endpoint parameters
    #[serde(default)]
    pub parameters: Vec<HttpEndpointParameter>,
}

impl HttpEndpoint {
    /// Create a new endpoint
    #[must_use]
    pub fn new(http_method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_method,
            headers: IndexMap::new(),
            parameters: Vec::new(),
        }
    }

    /// Add a header template
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.headers.insert(name.into(), template.into());
        self
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, parameter: HttpEndpointParameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Immutable tool descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (PascalCase)
    pub name: String,
    /// `Toolkit.Tool@version`
    pub fully_qualified_name: String,
    /// Human description
    pub description: String,
    /// Owning toolkit
    pub toolkit: ToolkitDefinition,
    /// Inputs
    pub input: ToolInput,
    /// Output
    pub output: ToolOutput,
    /// Requirements
    #[serde(default)]
    pub requirements: ToolRequirements,
    /// Set when the tool is deprecated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
    /// Set when the tool is a templated HTTP call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_endpoint: Option<HttpEndpoint>,
}

impl ToolDefinition {
    /// Identity of this tool
    #[must_use]
    pub fn fully_qualified(&self) -> FullyQualifiedName {
        FullyQualifiedName::new(
            self.toolkit.name.clone(),
            self.name.clone(),
            Some(self.toolkit.version.clone()),
        )
    }

    /// First line of the description
    #[must_use]
    pub fn summary(&self) -> &str {
        self.description.lines().next().unwrap_or_default().trim()
    }

    /// Behavior tags, if any
    #[must_use]
    pub fn behavior(&self) -> Option<&Behavior> {
        self.requirements
            .metadata
            .as_ref()
            .and_then(|m| m.behavior.as_ref())
    }
}
