//! MCP surface.
//!
//! Converts catalog tools into MCP tool descriptors and answers the
//! JSON-RPC methods an MCP client needs (`initialize`, `ping`,
//! `tools/list`, `tools/call`). Both the HTTP route and the stdio loop
//! go through [`McpHandler`].

use std::sync::Arc;

use armature_core::json_schema::{input_schema, output_schema};
use armature_core::{ToolCallOutput, ToolContextPayload};
use armature_tool::MaterializedTool;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::jsonrpc::{error_codes, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::worker::Worker;

/// MCP protocol revision this server speaks
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Hints derived from behavior tags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Display title
    pub title: String,
    /// Only reads data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// May destroy data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Safe to repeat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// Talks to the outside world
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// Tool as listed by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    /// Wire name, `Toolkit_Tool`
    pub name: String,
    /// Display title
    pub title: String,
    /// Description, prefixed when deprecated
    pub description: String,
    /// JSON Schema of the arguments
    pub input_schema: Value,
    /// JSON Schema of the structured result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behavior hints
    pub annotations: ToolAnnotations,
    /// Requirements and metadata under `armature`
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Describe a catalog tool for MCP clients
#[must_use]
pub fn create_mcp_tool(tool: &MaterializedTool) -> McpTool {
    let definition = &tool.definition;
    let description = match &definition.deprecation_message {
        Some(message) => format!("[DEPRECATED: {}] {}", message, definition.description),
        None => definition.description.clone(),
    };

    let mut annotations = ToolAnnotations {
        title: definition.name.clone(),
        ..ToolAnnotations::default()
    };
    if let Some(behavior) = definition.behavior() {
        annotations.read_only_hint = behavior.read_only;
        annotations.destructive_hint = behavior.destructive;
        annotations.idempotent_hint = behavior.idempotent;
        annotations.open_world_hint = behavior.open_world;
    }

    let requirements = &definition.requirements;
    let mut armature = Map::new();
    if requirements.authorization.is_some() || !requirements.secrets.is_empty() {
        let mut section = Map::new();
        if let Some(authorization) = &requirements.authorization {
            section.insert("authorization".to_string(), json!(authorization));
        }
        if !requirements.secrets.is_empty() {
            section.insert("secrets".to_string(), json!(requirements.secrets));
        }
        armature.insert("requirements".to_string(), Value::Object(section));
    }
    if let Some(metadata) = &requirements.metadata {
        if let Ok(Value::Object(dump)) = serde_json::to_value(metadata) {
            if !dump.is_empty() {
                armature.insert("metadata".to_string(), Value::Object(dump));
            }
        }
    }

    McpTool {
        name: definition.fully_qualified().mcp_name(),
        title: definition.name.clone(),
        description,
        input_schema: input_schema(&definition.input),
        output_schema: output_schema(&definition.output),
        annotations,
        meta: (!armature.is_empty()).then(|| json!({ "armature": armature })),
    }
}

/// Text content blocks for a tool value
#[must_use]
pub fn content_blocks(value: &Value) -> Vec<Value> {
    let text = match value {
        Value::Null => return Vec::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    };
    vec![json!({"type": "text", "text": text})]
}

/// `structuredContent` for a tool value: objects as-is, everything else
/// wrapped as `{result: v}`
#[must_use]
pub fn structured_content(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(_) => Some(value.clone()),
        other => Some(json!({ "result": other })),
    }
}

/// Build a `tools/call` result from an executor output
#[must_use]
pub fn call_result(output: &ToolCallOutput) -> Value {
    match (&output.error, &output.value) {
        (Some(error), _) => json!({
            "content": [{"type": "text", "text": error.llm_text()}],
            "isError": true,
        }),
        (None, value) => {
            let value = value.clone().unwrap_or(Value::Null);
            let mut result = json!({
                "content": content_blocks(&value),
                "isError": false,
            });
            if let Some(structured) = structured_content(&value) {
                result["structuredContent"] = structured;
            }
            result
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

/// Answers MCP JSON-RPC messages against a worker
#[derive(Debug, Clone)]
pub struct McpHandler {
    worker: Arc<Worker>,
}

impl McpHandler {
    /// Handler over `worker`
    #[must_use]
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }

    /// Handle one raw message; `None` when nothing should be sent back
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(raw) {
            Err(err) => Some(JsonRpcResponse::error(
                None,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", err),
            )),
            Ok(value) => match serde_json::from_value::<JsonRpcRequest>(value.clone()) {
                Ok(request) if request.jsonrpc == JSONRPC_VERSION => self.handle(request).await,
                _ => Some(JsonRpcResponse::error(
                    value.get("id").cloned(),
                    error_codes::INVALID_REQUEST,
                    "Invalid Request: expected a JSON-RPC 2.0 object with 'jsonrpc' and 'method'",
                )),
            },
        }?;
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(error = %err, "Cannot serialize JSON-RPC response");
                None
            }
        }
    }

    /// Handle one parsed request
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "MCP request");
        if request.is_notification() {
            if !request.method.starts_with("notifications/") {
                debug!(method = %request.method, "Ignoring notification");
            }
            return None;
        }
        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.list_tools()),
            "tools/call" => self.call(id, request.params).await,
            other => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: '{}'", other),
            ),
        };
        Some(response)
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {
                "name": "armature",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<McpTool> = self.worker.catalog().iter().map(|t| create_mcp_tool(t)).collect();
        json!({ "tools": tools })
    }

    fn find(&self, name: &str) -> Option<Arc<MaterializedTool>> {
        self.worker
            .catalog()
            .iter()
            .find(|tool| tool.fully_qualified().mcp_name() == name)
            .cloned()
            .or_else(|| self.worker.catalog().get_tool_by_name(name).ok())
    }

    async fn call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(err)) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("Invalid params for tools/call: {}", err),
                );
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    "Invalid params for tools/call: expected {\"name\": ..., \"arguments\": {...}}",
                );
            }
        };

        let Some(tool) = self.find(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                format!(
                    "Tool not found: '{}'. To fix: call tools/list to see the available tool \
                     names, then retry with one of them (for example '{}').",
                    params.name,
                    self.worker
                        .catalog()
                        .iter()
                        .next()
                        .map(|t| t.fully_qualified().mcp_name())
                        .unwrap_or_else(|| "Toolkit_Tool".to_string())
                ),
            );
        };

        let arguments = params.arguments.unwrap_or_default();
        match self
            .worker
            .execute(tool, None, ToolContextPayload::default(), &arguments)
            .await
        {
            Ok(response) => JsonRpcResponse::success(id, call_result(&response.output)),
            Err(err) => JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, err.to_string()),
        }
    }
}
