//! ARMATURE Server
//!
//! Hosts a tool catalog as a worker: bearer-authenticated HTTP routes,
//! MCP over HTTP and stdio, and the dispatch layer that times, logs and
//! bounds every call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod config;
pub mod jsonrpc;
pub mod mcp;
pub mod serve;
pub mod stdio;
pub mod telemetry;
pub mod worker;

pub use api::{router, ApiError};
pub use auth::{issue_token, AuthError, WorkerAuth, WorkerClaims};
pub use config::{ConfigError, WorkerConfig};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use mcp::{create_mcp_tool, McpHandler, McpTool};
pub use serve::{serve, serve_http, serve_http_with_shutdown, serve_stdio, Transport};
pub use stdio::run_stdio;
pub use telemetry::init_tracing;
pub use worker::{HealthReport, Worker, WorkerError};
