//! Tool error taxonomy.
//!
//! Tool bodies fail with a [`ToolError`]. The executor converts every
//! variant, including arbitrary `anyhow` errors and panics, into a wire
//! [`ToolCallError`] with a code, an origin and phase, and retry semantics.

use armature_core::{ContextError, ErrorCode, ToolCallError};
use serde_json::{Map, Value};

/// Errors raised by tool bodies and by the executor around them
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Transient failure; the caller should retry
    #[error("{message}")]
    Retryable {
        message: String,
        developer_message: Option<String>,
        additional_prompt_content: Option<String>,
        retry_after_ms: Option<u64>,
    },

    /// The end user must supply more context before the tool can proceed
    #[error("{message}")]
    ContextRequired {
        message: String,
        developer_message: Option<String>,
        additional_prompt_content: Option<String>,
    },

    /// Non-retryable tool failure
    #[error("{message}")]
    Fatal {
        message: String,
        developer_message: Option<String>,
    },

    /// The wrapped external API failed
    #[error("{message}")]
    Upstream {
        message: String,
        status_code: u16,
        developer_message: Option<String>,
        retry_after_ms: Option<u64>,
        extra: Option<Map<String, Value>>,
    },

    /// Raw input failed validation
    #[error("{message}")]
    Input {
        message: String,
        developer_message: String,
    },

    /// Return value failed validation or serialization
    #[error("Failed to serialize tool output")]
    Output { developer_message: String },

    /// Tool configuration drifted from its backing endpoint
    #[error("{message}")]
    Runtime {
        message: String,
        developer_message: Option<String>,
    },

    /// A context accessor failed (missing secret, ...)
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The call was cancelled
    #[error("Tool call was cancelled before it completed")]
    Cancelled,

    /// The tool body panicked
    #[error("Error in execution")]
    Panicked { payload: String },

    /// Any other error from the tool body
    #[error("Error in execution")]
    Unexpected(#[from] anyhow::Error),
}

impl ToolError {
    /// Retryable error
    #[must_use]
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            developer_message: None,
            additional_prompt_content: None,
            retry_after_ms: None,
        }
    }

    /// Context-required error with guidance for the calling agent
    #[must_use]
    pub fn context_required(message: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::ContextRequired {
            message: message.into(),
            developer_message: None,
            additional_prompt_content: Some(prompt.into()),
        }
    }

    /// Fatal error
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            developer_message: None,
        }
    }

    /// Upstream error with its HTTP status
    #[must_use]
    pub fn upstream(status_code: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code,
            developer_message: None,
            retry_after_ms: None,
            extra: None,
        }
    }

    /// Upstream rate limit with a suggested delay
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: 429,
            developer_message: None,
            retry_after_ms: Some(retry_after_ms),
            extra: None,
        }
    }

    /// Runtime configuration error
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            developer_message: None,
        }
    }

    /// Attach a developer message; ignored by variants that derive their own
    #[must_use]
    pub fn with_developer_message(mut self, detail: impl Into<String>) -> Self {
        let detail = Some(detail.into());
        match &mut self {
            Self::Retryable { developer_message, .. }
            | Self::ContextRequired { developer_message, .. }
            | Self::Fatal { developer_message, .. }
            | Self::Upstream { developer_message, .. }
            | Self::Runtime { developer_message, .. } => *developer_message = detail,
            _ => {}
        }
        self
    }

    /// Set the suggested retry delay on retryable and upstream errors
    #[must_use]
    pub fn with_retry_after_ms(mut self, delay: u64) -> Self {
        match &mut self {
            Self::Retryable { retry_after_ms, .. } | Self::Upstream { retry_after_ms, .. } => {
                *retry_after_ms = Some(delay);
            }
            _ => {}
        }
        self
    }

    /// Set guidance for the calling agent
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = Some(prompt.into());
        match &mut self {
            Self::Retryable { additional_prompt_content, .. }
            | Self::ContextRequired { additional_prompt_content, .. } => {
                *additional_prompt_content = prompt;
            }
            _ => {}
        }
        self
    }

    /// Error code this variant maps to
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Retryable { .. } => ErrorCode::RetryTool,
            Self::ContextRequired { .. } => ErrorCode::ContextRequired,
            Self::Upstream { status_code, .. } => ErrorCode::from_upstream_status(*status_code),
            Self::Input { .. } => ErrorCode::BadInputValue,
            Self::Output { .. } => ErrorCode::BadOutputValue,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Fatal { .. }
            | Self::Runtime { .. }
            | Self::Context(_)
            | Self::Panicked { .. }
            | Self::Unexpected(_) => ErrorCode::Fatal,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Retryable { .. } => "RetryableToolError",
            Self::ContextRequired { .. } => "ContextRequiredToolError",
            Self::Upstream { status_code: 429, .. } => "UpstreamRateLimitError",
            Self::Upstream { .. } => "UpstreamError",
            Self::Input { .. } => "ToolInputError",
            Self::Output { .. } => "ToolOutputError",
            Self::Runtime { .. } => "ToolRuntimeError",
            Self::Cancelled => "ToolCancelledError",
            Self::Fatal { .. } | Self::Context(_) | Self::Panicked { .. } | Self::Unexpected(_) => {
                "FatalToolError"
            }
        }
    }

    /// Convert into the wire error for `tool_name`
    #[must_use]
    pub fn into_call_error(self, tool_name: &str) -> ToolCallError {
        let kind = self.kind();
        let code = self.code();
        let message = self.to_string();
        let base = ToolCallError::new(code, message);

        let error = match self {
            Self::Retryable {
                developer_message,
                additional_prompt_content,
                retry_after_ms,
                ..
            } => with_dev(base, developer_message)
                .retryable(true)
                .with_prompt_content(additional_prompt_content)
                .with_retry_after_ms(retry_after_ms),
            Self::ContextRequired {
                developer_message,
                additional_prompt_content,
                ..
            } => with_dev(base, developer_message).with_prompt_content(additional_prompt_content),
            Self::Fatal { developer_message, .. } => {
                with_dev(base, developer_message).with_status_code(500)
            }
            Self::Upstream {
                status_code,
                developer_message,
                retry_after_ms,
                extra,
                ..
            } => with_dev(base, developer_message)
                .retryable(ErrorCode::upstream_status_is_retryable(status_code))
                .with_status_code(status_code)
                .with_retry_after_ms(retry_after_ms)
                .with_extra(extra),
            Self::Input { developer_message, .. } => base
                .with_developer_message(developer_message)
                .with_status_code(400),
            Self::Output { developer_message } => base
                .with_developer_message(developer_message)
                .with_status_code(500),
            Self::Runtime { developer_message, .. } => with_dev(base, developer_message),
            Self::Context(err) => {
                let mut extra = Map::new();
                extra.insert("key".to_string(), Value::String(err.key().to_string()));
                base.with_extra(Some(extra))
            }
            Self::Cancelled => base.with_developer_message(
                "The call was cancelled mid-flight; upstream side effects may have been partially applied",
            ),
            Self::Panicked { payload } => base
                .with_developer_message(format!("Tool panicked: {}", payload))
                .with_stacktrace(Some(payload)),
            Self::Unexpected(err) => base
                .with_developer_message(format!("{:#}", err))
                .with_stacktrace(Some(format!("{:?}", err))),
        };
        error.in_tool(kind, tool_name)
    }
}

fn with_dev(error: ToolCallError, developer_message: Option<String>) -> ToolCallError {
    match developer_message {
        Some(dev) => error.with_developer_message(dev),
        None => error,
    }
}
