//! Structured call results.
//!
//! Every tool call ends in a [`ToolCallOutput`]: either a value or a
//! [`ToolCallError`], plus any informational logs. Errors carry a
//! machine-readable [`ErrorCode`] with its origin and phase, a short
//! user-facing message, and a separate developer message that never reaches
//! the model.

use crate::context::ToolContextPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Where an error originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorOrigin {
    /// Toolkit packaging or loading
    Toolkit,
    /// The tool itself
    Tool,
    /// The external API wrapped by the tool
    Upstream,
    /// Unclassified
    Unknown,
}

/// When an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorPhase {
    /// Toolkit load
    Load,
    /// Tool definition / registration
    Definition,
    /// Tool call
    Runtime,
    /// Unclassified
    Unknown,
}

/// Machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Toolkit failed to load
    LoadFailed,
    /// Tool definition is invalid
    BadDefinition,
    /// Input schema could not be derived
    BadInputSchema,
    /// Output schema could not be derived
    BadOutputSchema,
    /// Raw input failed validation; the tool body never ran
    BadInputValue,
    /// Return value failed output validation
    BadOutputValue,
    /// Transient; the caller should retry
    RetryTool,
    /// The end user must supply more context first
    ContextRequired,
    /// Any other tool failure
    Fatal,
    /// The call was cancelled before it finished
    Cancelled,
    /// Upstream rejected the request (other 4xx)
    BadRequest,
    /// Upstream rejected credentials (401/403)
    AuthError,
    /// Upstream resource missing (404)
    NotFound,
    /// Upstream rejected field values
    ValidationError,
    /// Upstream rate limit (429)
    RateLimit,
    /// Upstream failure (5xx)
    ServerError,
    /// Unclassified
    Unknown,
}

impl ErrorCode {
    /// Map an upstream HTTP status to its code
    #[must_use]
    pub const fn from_upstream_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthError,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            500.. => Self::ServerError,
            400..=499 => Self::BadRequest,
            _ => Self::Fatal,
        }
    }

    /// Whether an upstream status indicates a transient failure
    #[must_use]
    pub const fn upstream_status_is_retryable(status: u16) -> bool {
        status >= 500 || status == 429
    }

    /// Default origin for this code
    #[must_use]
    pub const fn origin(self) -> ErrorOrigin {
        match self {
            Self::LoadFailed => ErrorOrigin::Toolkit,
            Self::BadRequest
            | Self::AuthError
            | Self::NotFound
            | Self::ValidationError
            | Self::RateLimit
            | Self::ServerError => ErrorOrigin::Upstream,
            Self::Unknown => ErrorOrigin::Unknown,
            _ => ErrorOrigin::Tool,
        }
    }

    /// Default phase for this code
    #[must_use]
    pub const fn phase(self) -> ErrorPhase {
        match self {
            Self::LoadFailed => ErrorPhase::Load,
            Self::BadDefinition | Self::BadInputSchema | Self::BadOutputSchema => {
                ErrorPhase::Definition
            }
            Self::Unknown => ErrorPhase::Unknown,
            _ => ErrorPhase::Runtime,
        }
    }

    /// Wire spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadFailed => "LOAD_FAILED",
            Self::BadDefinition => "BAD_DEFINITION",
            Self::BadInputSchema => "BAD_INPUT_SCHEMA",
            Self::BadOutputSchema => "BAD_OUTPUT_SCHEMA",
            Self::BadInputValue => "BAD_INPUT_VALUE",
            Self::BadOutputValue => "BAD_OUTPUT_VALUE",
            Self::RetryTool => "RETRY_TOOL",
            Self::ContextRequired => "CONTEXT_REQUIRED",
            Self::Fatal => "FATAL",
            Self::Cancelled => "CANCELLED",
            Self::BadRequest => "BAD_REQUEST",
            Self::AuthError => "AUTH_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::ServerError => "SERVER_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Toolkit => "TOOLKIT",
            Self::Tool => "TOOL",
            Self::Upstream => "UPSTREAM",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Load => "LOAD",
            Self::Definition => "DEFINITION",
            Self::Runtime => "RUNTIME",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Structured tool call error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallError {
    /// Short message for the end user and the model
    pub message: String,
    /// Details for logs; never shown to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    /// Whether the same call may be retried
    pub can_retry: bool,
    /// Extra guidance for the calling agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_prompt_content: Option<String>,
    /// Suggested delay before a retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Debug-only trace; stripped unless the worker runs with tracebacks on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    /// Origin
    pub origin: ErrorOrigin,
    /// Phase
    pub phase: ErrorPhase,
    /// Code
    pub code: ErrorCode,
    /// HTTP status, when relevant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Arbitrary structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl ToolCallError {
    /// Create an error with the code's default origin and phase
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            developer_message: None,
            can_retry: false,
            additional_prompt_content: None,
            retry_after_ms: None,
            stacktrace: None,
            origin: code.origin(),
            phase: code.phase(),
            code,
            status_code: None,
            extra: None,
        }
    }

    /// Set developer message
    #[must_use]
    pub fn with_developer_message(mut self, message: impl Into<String>) -> Self {
        self.developer_message = Some(message.into());
        self
    }

    /// Mark retryable
    #[must_use]
    pub fn retryable(mut self, can_retry: bool) -> Self {
        self.can_retry = can_retry;
        self
    }

    /// Set suggested retry delay
    #[must_use]
    pub fn with_retry_after_ms(mut self, retry_after_ms: Option<u64>) -> Self {
        self.retry_after_ms = retry_after_ms;
        self
    }

    /// Set additional prompt content
    #[must_use]
    pub fn with_prompt_content(mut self, content: Option<String>) -> Self {
        self.additional_prompt_content = content;
        self
    }

    /// Set HTTP status
    #[must_use]
    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Set stacktrace
    #[must_use]
    pub fn with_stacktrace(mut self, stacktrace: Option<String>) -> Self {
        self.stacktrace = stacktrace;
        self
    }

    /// Set extra details
    #[must_use]
    pub fn with_extra(mut self, extra: Option<Map<String, Value>>) -> Self {
        self.extra = extra.filter(|m| !m.is_empty());
        self
    }

    /// Prefix message and developer message with
    /// `[ORIGIN_PHASE_CODE] <kind> in execution of tool '<tool>': `
    #[must_use]
    pub fn in_tool(mut self, kind: &str, tool_name: &str) -> Self {
        let prefix = format!(
            "[{}_{}_{}] {} in execution of tool '{}': ",
            self.origin, self.phase, self.code, kind, tool_name
        );
        self.message = format!("{}{}", prefix, self.message);
        if let Some(dev) = self.developer_message.take() {
            self.developer_message = Some(format!("{}{}", prefix, dev));
        }
        self
    }

    /// Text shown to the model: the message followed by any guidance
    #[must_use]
    pub fn llm_text(&self) -> String {
        match &self.additional_prompt_content {
            Some(extra) if !extra.is_empty() => format!("{}\n\n{}", self.message, extra),
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Informational log attached to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallLog {
    /// Text
    pub message: String,
    /// Severity
    pub level: LogLevel,
    /// Category, e.g. `deprecation`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl ToolCallLog {
    /// Deprecation warning
    #[must_use]
    pub fn deprecation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: LogLevel::Warning,
            subtype: Some("deprecation".to_string()),
        }
    }
}

/// Value or error, plus logs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallOutput {
    /// Success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Failure payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolCallError>,
    /// Informational logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<ToolCallLog>>,
}

impl ToolCallOutput {
    /// Successful output
    #[must_use]
    pub fn success(value: Value, logs: Vec<ToolCallLog>) -> Self {
        Self {
            value: Some(value),
            error: None,
            logs: (!logs.is_empty()).then_some(logs),
        }
    }

    /// Failed output
    #[must_use]
    pub fn failure(error: ToolCallError, logs: Vec<ToolCallLog>) -> Self {
        Self {
            value: None,
            error: Some(error),
            logs: (!logs.is_empty()).then_some(logs),
        }
    }

    /// Whether the call succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Error code when the call failed
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Which tool a request targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReference {
    /// Tool name; either plain (`SayHello`) or dotted (`Greetings.SayHello`)
    pub name: String,
    /// Toolkit name, when not part of `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkit: Option<String>,
    /// Toolkit version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Inbound call envelope
#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    /// Caller-supplied execution id
    #[serde(default)]
    pub execution_id: Option<String>,
    /// Target tool
    pub tool: ToolReference,
    /// Raw, untrusted inputs
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Credentials and metadata for the call
    #[serde(default)]
    pub context: ToolContextPayload,
}

/// Outbound call envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Execution id
    pub execution_id: String,
    /// Wall-clock duration in milliseconds
    pub duration: f64,
    /// RFC 3339 completion time
    pub finished_at: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Value or error
    pub output: ToolCallOutput,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upstream_status_mapping() {
        assert_eq!(ErrorCode::from_upstream_status(401), ErrorCode::AuthError);
        assert_eq!(ErrorCode::from_upstream_status(403), ErrorCode::AuthError);
        assert_eq!(ErrorCode::from_upstream_status(404), ErrorCode::NotFound);
        assert_eq!(ErrorCode::from_upstream_status(429), ErrorCode::RateLimit);
        assert_eq!(ErrorCode::from_upstream_status(503), ErrorCode::ServerError);
        assert_eq!(ErrorCode::from_upstream_status(422), ErrorCode::BadRequest);
        assert!(ErrorCode::upstream_status_is_retryable(429));
        assert!(ErrorCode::upstream_status_is_retryable(502));
        assert!(!ErrorCode::upstream_status_is_retryable(404));
    }

    #[test]
    fn test_code_origin_and_phase() {
        assert_eq!(ErrorCode::RateLimit.origin(), ErrorOrigin::Upstream);
        assert_eq!(ErrorCode::BadInputValue.origin(), ErrorOrigin::Tool);
        assert_eq!(ErrorCode::BadInputSchema.phase(), ErrorPhase::Definition);
        assert_eq!(ErrorCode::LoadFailed.phase(), ErrorPhase::Load);
    }

    #[test]
    fn test_message_prefix() {
        let err = ToolCallError::new(ErrorCode::RetryTool, "try later")
            .with_developer_message("upstream flaked")
            .in_tool("RetryableToolError", "Greetings.SayHello");
        assert_eq!(
            err.message,
            "[TOOL_RUNTIME_RETRY_TOOL] RetryableToolError in execution of tool 'Greetings.SayHello': try later"
        );
        assert!(err.developer_message.unwrap().ends_with("upstream flaked"));
    }

    #[test]
    fn test_error_wire_form() {
        let err = ToolCallError::new(ErrorCode::BadInputValue, "bad").with_status_code(400);
        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(wire["code"], "BAD_INPUT_VALUE");
        assert_eq!(wire["origin"], "TOOL");
        assert_eq!(wire["phase"], "RUNTIME");
        assert_eq!(wire["status_code"], 400);
        assert!(wire.get("stacktrace").is_none());
    }

    #[test]
    fn test_llm_text_appends_guidance() {
        let err = ToolCallError::new(ErrorCode::ContextRequired, "Which channel?")
            .with_prompt_content(Some("Ask the user for a channel name".to_string()));
        assert_eq!(err.llm_text(), "Which channel?\n\nAsk the user for a channel name");
    }

    #[test]
    fn test_output_success_and_failure() {
        let ok = ToolCallOutput::success(json!("Hello, World!"), vec![]);
        assert!(ok.is_success());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"value": "Hello, World!"})
        );

        let logs = vec![ToolCallLog::deprecation("use say_hello")];
        let failed = ToolCallOutput::failure(ToolCallError::new(ErrorCode::Fatal, "boom"), logs);
        assert!(!failed.is_success());
        assert_eq!(failed.error_code(), Some(ErrorCode::Fatal));
        let wire = serde_json::to_value(&failed).unwrap();
        assert_eq!(wire["logs"][0]["level"], "warning");
        assert_eq!(wire["logs"][0]["subtype"], "deprecation");
    }

    #[test]
    fn test_request_envelope() {
        let request: ToolCallRequest = serde_json::from_value(json!({
            "execution_id": "abc",
            "tool": {"name": "SayHello", "toolkit": "Greetings", "version": "1.0.0"},
            "inputs": {"name": "World"}
        }))
        .unwrap();
        assert_eq!(request.tool.toolkit.as_deref(), Some("Greetings"));
        assert_eq!(request.inputs["name"], "World");
        assert!(request.context.authorization.is_none());
    }
}
