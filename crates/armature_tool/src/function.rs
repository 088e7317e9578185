//! Tool functions.
//!
//! A [`ToolFunction`] is the callable half of a tool: its signature
//! (parameters, context injection point, return type) plus the handler
//! that runs it. Paired with [`ToolOptions`] it forms a [`Tool`], the unit
//! the catalog registers.

use std::future::Future;
use std::sync::Arc;

use armature_core::{HttpEndpoint, ToolContext};
use armature_runtime::BlockingLane;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::declare::{DeclaredType, ToolOptions, ToolType};
use crate::error::ToolError;
use crate::validate::{check_as, TypedCheck};

/// Async tool body
pub type AsyncToolFn = dyn Fn(ToolArgs) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// Sync tool body
pub type SyncToolFn = dyn Fn(ToolArgs) -> Result<Value, ToolError> + Send + Sync;

/// Validated arguments handed to a tool body
pub struct ToolArgs {
    values: Map<String, Value>,
    context: Option<ToolContext>,
}

impl ToolArgs {
    /// Arguments from validated values and an optional injected context
    #[must_use]
    pub fn new(values: Map<String, Value>, context: Option<ToolContext>) -> Self {
        Self { values, context }
    }

    /// Deserialize argument `name`; an absent argument reads as null
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the value does not fit `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        let value = self.values.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            ToolError::fatal(format!("Argument '{}' has an unexpected type", name))
                .with_developer_message(e.to_string())
        })
    }

    /// Raw validated values
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The injected execution context
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the tool declared no context parameter
    pub fn context(&self) -> Result<&ToolContext, ToolError> {
        self.context.as_ref().ok_or_else(no_context)
    }

    /// Take ownership of the injected execution context
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the tool declared no context parameter
    pub fn take_context(&mut self) -> Result<ToolContext, ToolError> {
        self.context.take().ok_or_else(no_context)
    }
}

fn no_context() -> ToolError {
    ToolError::fatal("Tool did not declare a context parameter")
}

/// How a tool body runs
#[derive(Clone)]
pub enum ToolHandler {
    /// Awaited on the calling task
    Async(Arc<AsyncToolFn>),
    /// Called inline; must not block
    Sync(Arc<SyncToolFn>),
    /// Off-loaded to a blocking thread, or to a dedicated lane when set
    Blocking {
        /// Dedicated single-worker lane
        lane: Option<Arc<BlockingLane>>,
        /// Tool body
        body: Arc<SyncToolFn>,
    },
    /// Templated HTTP call described by the tool's endpoint
    Http,
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(_) => f.write_str("Async"),
            Self::Sync(_) => f.write_str("Sync"),
            Self::Blocking { lane, .. } => f
                .debug_struct("Blocking")
                .field("lane", &lane.as_ref().map(|l| l.name().to_string()))
                .finish(),
            Self::Http => f.write_str("Http"),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) ty: DeclaredType,
    pub(crate) default: Option<Value>,
    pub(crate) http_name: Option<String>,
    pub(crate) check: Option<TypedCheck>,
}

impl Param {
    /// Parameter of Rust type `T`
    #[must_use]
    pub fn new<T>(name: impl Into<String>, description: impl Into<String>) -> Self
    where
        T: ToolType + DeserializeOwned,
    {
        Self {
            name: name.into(),
            description: description.into(),
            ty: T::declared_type(),
            default: None,
            http_name: None,
            check: Some(check_as::<T> as TypedCheck),
        }
    }

    /// Parameter described only by its declared type
    #[must_use]
    pub fn untyped(name: impl Into<String>, description: impl Into<String>, ty: DeclaredType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ty,
            default: None,
            http_name: None,
            check: None,
        }
    }

    /// Default used when the caller omits the parameter; makes it optional
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Wire name when the tool is HTTP-backed
    #[must_use]
    pub fn with_http_name(mut self, http_name: impl Into<String>) -> Self {
        self.http_name = Some(http_name.into());
        self
    }

    /// Parameter name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Callable half of a tool
#[derive(Debug, Clone)]
pub struct ToolFunction {
    pub(crate) name: String,
    pub(crate) doc: Option<String>,
    pub(crate) params: Vec<Param>,
    pub(crate) context_param: Option<String>,
    pub(crate) returns: DeclaredType,
    pub(crate) returns_description: String,
    pub(crate) handler: Option<ToolHandler>,
    pub(crate) http_endpoint: Option<HttpEndpoint>,
}

impl ToolFunction {
    /// Function named `name` (snake_case); untyped return until [`Self::returns`]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params: Vec::new(),
            context_param: None,
            returns: DeclaredType::Json,
            returns_description: String::new(),
            handler: None,
            http_endpoint: None,
        }
    }

    /// Doc text; the first line is the summary
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Add a parameter
    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Receive the execution context under `name`
    #[must_use]
    pub fn context_param(mut self, name: impl Into<String>) -> Self {
        self.context_param = Some(name.into());
        self
    }

    /// Declare the return type
    #[must_use]
    pub fn returns<R: ToolType>(self, description: impl Into<String>) -> Self {
        self.returns_as(R::declared_type(), description)
    }

    /// Declare the return type explicitly
    #[must_use]
    pub fn returns_as(mut self, ty: DeclaredType, description: impl Into<String>) -> Self {
        self.returns = ty;
        self.returns_description = description.into();
        self
    }

    /// Async body
    #[must_use]
    pub fn handler<F, Fut, R>(mut self, body: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
        R: Serialize + 'static,
    {
        let body = Arc::new(move |args: ToolArgs| {
            let call = body(args);
            async move { into_value(call.await?) }.boxed()
        });
        self.handler = Some(ToolHandler::Async(body));
        self
    }

    /// Sync body, called inline
    #[must_use]
    pub fn sync_handler<F, R>(mut self, body: F) -> Self
    where
        F: Fn(ToolArgs) -> Result<R, ToolError> + Send + Sync + 'static,
        R: Serialize,
    {
        self.handler = Some(ToolHandler::Sync(wrap_sync(body)));
        self
    }

    /// Blocking body, off-loaded so the scheduler is never blocked
    #[must_use]
    pub fn blocking_handler<F, R>(mut self, body: F) -> Self
    where
        F: Fn(ToolArgs) -> Result<R, ToolError> + Send + Sync + 'static,
        R: Serialize,
    {
        self.handler = Some(ToolHandler::Blocking {
            lane: None,
            body: wrap_sync(body),
        });
        self
    }

    /// Blocking body pinned to a dedicated single-worker lane
    #[must_use]
    pub fn lane_handler<F, R>(mut self, lane: Arc<BlockingLane>, body: F) -> Self
    where
        F: Fn(ToolArgs) -> Result<R, ToolError> + Send + Sync + 'static,
        R: Serialize,
    {
        self.handler = Some(ToolHandler::Blocking {
            lane: Some(lane),
            body: wrap_sync(body),
        });
        self
    }

    /// Templated HTTP call; no in-process body
    #[must_use]
    pub fn http(mut self, endpoint: HttpEndpoint) -> Self {
        self.http_endpoint = Some(endpoint);
        self.handler = Some(ToolHandler::Http);
        self
    }

    /// Function name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler, once set
    #[must_use]
    pub fn handler_kind(&self) -> Option<&ToolHandler> {
        self.handler.as_ref()
    }
}

fn wrap_sync<F, R>(body: F) -> Arc<SyncToolFn>
where
    F: Fn(ToolArgs) -> Result<R, ToolError> + Send + Sync + 'static,
    R: Serialize,
{
    Arc::new(move |args: ToolArgs| into_value(body(args)?))
}

fn into_value<R: Serialize>(value: R) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Output {
        developer_message: format!(
            "Validation error occurred while serializing tool output: {}. Please ensure the tool's output matches the expected schema.",
            e
        ),
    })
}

/// A function with its registration options
#[derive(Debug, Clone)]
pub struct Tool {
    /// Callable half
    pub function: ToolFunction,
    /// Registration options
    pub options: ToolOptions,
}

impl Tool {
    /// Pair `function` with `options`
    #[must_use]
    pub fn new(function: ToolFunction, options: ToolOptions) -> Self {
        Self { function, options }
    }
}

impl From<ToolFunction> for Tool {
    fn from(function: ToolFunction) -> Self {
        Self::new(function, ToolOptions::default())
    }
}
