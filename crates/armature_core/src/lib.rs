//! ARMATURE Core Types
//!
//! This crate contains pure types and logic with no I/O: tool definitions,
//! value schemas, the per-call execution context, and the structured call
//! results that every transport serializes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod definition;
pub mod error;
pub mod id;
pub mod json_schema;
pub mod name;
pub mod output;
pub mod value;
pub mod version;

// Re-exports
pub use context::{ContextError, ToolContext, ToolContextPayload};
pub use secrecy::{ExposeSecret, SecretString};
pub use definition::{
    AcceptedAs, Behavior, Classification, HttpEndpoint, HttpEndpointParameter, HttpMethod,
    InputParameter, OutputMode, ToolAuthorization, ToolDefinition, ToolInput, ToolMetadata,
    SystemType, ToolOutput, ToolRequirements, ToolkitDefinition, Verb,
};
pub use error::{CoreError, CoreResult};
pub use id::{ExecutionId, TaskId};
pub use name::{FullyQualifiedName, normalize_tool_name, snake_to_pascal, validate_toolkit_name};
pub use output::{
    ErrorCode, ErrorOrigin, ErrorPhase, LogLevel, ToolCallError, ToolCallLog, ToolCallOutput,
    ToolCallRequest, ToolCallResponse, ToolReference,
};
pub use value::{ScalarType, ValType, ValueSchema};
pub use version::{Version, VersionError};
