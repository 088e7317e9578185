//! ARMATURE Tool System
//!
//! Declares tools, derives their schemas, validates untrusted input and
//! output, executes them with an injected context, and keeps them in a
//! catalog. Every failure a tool can produce is converted into a
//! structured, retry-aware error before it leaves the executor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod catalog;
pub mod declare;
pub mod derive;
pub mod error;
pub mod executor;
pub mod function;
pub mod http;
pub mod validate;

pub use builtin::{register_builtins, LedgerResources};
pub use catalog::{CatalogError, MaterializedTool, ToolCatalog, Toolkit};
pub use declare::{DeclaredType, StructField, StructType, ToolOptions, ToolType};
pub use derive::{derive_tool, DerivedTool, SchemaDerivationError};
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use function::{Param, Tool, ToolArgs, ToolFunction, ToolHandler};
pub use http::{
    build_request_plan, parse_retry_after, HttpInvoker, HttpRequestPlan, HttpResponse,
    ReqwestInvoker, DEFAULT_RATE_LIMIT_RETRY_MS,
};
pub use validate::{InputValidator, OutputValidator, Violation};
