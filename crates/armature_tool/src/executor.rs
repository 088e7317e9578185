//! Tool executor.
//!
//! Every call passes through [`ToolExecutor::run`]. Whatever the tool body
//! does, including panicking or being cancelled, the caller gets a
//! [`ToolCallOutput`] back and never an error or an unwind.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use armature_core::{ToolCallLog, ToolCallOutput, ToolContext, ToolDefinition};
use armature_runtime::{panic_message, LaneError};
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog::MaterializedTool;
use crate::error::ToolError;
use crate::function::{ToolArgs, ToolHandler};
use crate::http::{build_request_plan, HttpInvoker, ReqwestInvoker};
use crate::validate::{InputValidator, OutputValidator};

/// Runs tools and converts every outcome into a [`ToolCallOutput`]
#[derive(Clone)]
pub struct ToolExecutor {
    http: Arc<dyn HttpInvoker>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Executor with the default HTTP client
    #[must_use]
    pub fn new() -> Self {
        Self::with_http_invoker(Arc::new(ReqwestInvoker::default()))
    }

    /// Executor sending HTTP-backed calls through `invoker`
    #[must_use]
    pub fn with_http_invoker(invoker: Arc<dyn HttpInvoker>) -> Self {
        Self { http: invoker }
    }

    /// Run a catalog entry
    pub async fn run_tool(
        &self,
        tool: &MaterializedTool,
        context: ToolContext,
        raw_inputs: &Map<String, Value>,
    ) -> ToolCallOutput {
        self.run(
            &tool.handler,
            &tool.definition,
            &tool.input_validator,
            &tool.output_validator,
            context,
            raw_inputs,
        )
        .await
    }

    /// Validate, invoke, and validate again
    ///
    /// The body is never entered when input validation fails. A cancelled
    /// context ends the call with a `CANCELLED` error.
    pub async fn run(
        &self,
        handler: &ToolHandler,
        definition: &ToolDefinition,
        input_validator: &InputValidator,
        output_validator: &OutputValidator,
        context: ToolContext,
        raw_inputs: &Map<String, Value>,
    ) -> ToolCallOutput {
        let tool_name = definition.fully_qualified().dotted();
        let mut logs = Vec::new();
        if let Some(message) = &definition.deprecation_message {
            logs.push(ToolCallLog::deprecation(message.clone()));
        }

        let validated = match input_validator.validate_or_error(raw_inputs) {
            Ok(validated) => validated,
            Err(err) => {
                debug!(tool = %tool_name, "Rejected tool input");
                return ToolCallOutput::failure(err.into_call_error(&tool_name), logs);
            }
        };

        let token = context.cancellation_token().clone();
        let result = if token.is_cancelled() {
            Err(ToolError::Cancelled)
        } else {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(ToolError::Cancelled),
                result = self.invoke(handler, definition, validated, context) => result,
            }
        };

        match result.and_then(|value| output_validator.validate(value)) {
            Ok(value) => ToolCallOutput::success(value, logs),
            Err(err) => ToolCallOutput::failure(err.into_call_error(&tool_name), logs),
        }
    }

    async fn invoke(
        &self,
        handler: &ToolHandler,
        definition: &ToolDefinition,
        validated: Map<String, Value>,
        context: ToolContext,
    ) -> Result<Value, ToolError> {
        if let ToolHandler::Http = handler {
            let endpoint = definition.http_endpoint.as_ref().ok_or_else(|| {
                ToolError::runtime(format!(
                    "Tool {} is HTTP-backed but has no endpoint",
                    definition.fully_qualified_name
                ))
            })?;
            let plan = build_request_plan(definition, endpoint, &validated, &context)?;
            debug!(method = ?plan.method, url = %plan.url, "Calling HTTP endpoint");
            return self.http.invoke(&plan).await?.into_result();
        }

        let injected = definition.input.tool_context_parameter_name.is_some();
        let args = ToolArgs::new(validated, injected.then_some(context));

        match handler {
            ToolHandler::Async(body) => {
                let call = std::panic::catch_unwind(AssertUnwindSafe(|| body(args)))
                    .map_err(|payload| panicked(&*payload))?;
                AssertUnwindSafe(call)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panicked(&*payload)))
            }
            ToolHandler::Sync(body) => std::panic::catch_unwind(AssertUnwindSafe(|| body(args)))
                .unwrap_or_else(|payload| Err(panicked(&*payload))),
            ToolHandler::Blocking { lane: None, body } => {
                let body = Arc::clone(body);
                match tokio::task::spawn_blocking(move || body(args)).await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => Err(panicked(&*err.into_panic())),
                    Err(_) => Err(ToolError::Cancelled),
                }
            }
            ToolHandler::Blocking {
                lane: Some(lane),
                body,
            } => {
                let body = Arc::clone(body);
                match lane.run(move || body(args)).await {
                    Ok(result) => result,
                    Err(LaneError::Panicked { message, .. }) => {
                        warn!(lane = %lane.name(), "Tool body panicked on blocking lane");
                        Err(ToolError::Panicked { payload: message })
                    }
                    Err(err) => Err(ToolError::Unexpected(anyhow::Error::new(err))),
                }
            }
            ToolHandler::Http => Err(ToolError::runtime("HTTP handler reached in-process dispatch")),
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> ToolError {
    let message = panic_message(payload);
    warn!(panic = %message, "Tool body panicked");
    ToolError::Panicked { payload: message }
}
