//! Call dispatch.
//!
//! The [`Worker`] owns the catalog and turns a [`ToolCallRequest`] into a
//! [`ToolCallResponse`]: resolve, build the per-call context, run through
//! the executor under a concurrency limit, time and log the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use armature_core::{
    ExecutionId, ExposeSecret, SecretString, ToolCallOutput, ToolCallRequest, ToolCallResponse,
    ToolContextPayload, ToolDefinition,
};
use armature_runtime::{CallMetrics, MetricsSnapshot, ShutdownReport, TaskTracker, TrackerError};
use armature_tool::{
    register_builtins, CatalogError, LedgerResources, MaterializedTool, ToolCatalog, ToolExecutor,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

/// Dispatch failures that happen before a tool runs
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// No tool matches the request
    #[error("Tool {name} not found in catalog with toolkit version {version}. {source}")]
    ToolNotFound {
        /// Requested name
        name: String,
        /// Requested version, or `latest`
        version: String,
        /// Catalog detail
        source: CatalogError,
    },

    /// The worker is shutting down
    #[error("Worker is shutting down and accepts no new calls")]
    ShuttingDown(#[from] TrackerError),

    /// Built-in toolkits could not be set up
    #[error("Failed to set up built-in toolkits: {0}")]
    Setup(String),
}

/// Health payload
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always `ok` while the worker answers
    pub status: &'static str,
    /// Tools in the catalog
    pub tool_count: usize,
    /// Content digest of the catalog
    pub catalog_digest: String,
    /// Deployment label
    pub environment: String,
    /// Calls currently running
    pub in_flight: usize,
    /// Call counters
    pub metrics: MetricsSnapshot,
}

/// Hosts a catalog and runs calls against it
pub struct Worker {
    catalog: Arc<ToolCatalog>,
    executor: ToolExecutor,
    config: Arc<WorkerConfig>,
    metrics: CallMetrics,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    ledger: Option<Arc<LedgerResources>>,
}

impl Worker {
    /// Worker over `catalog`
    #[must_use]
    pub fn new(config: Arc<WorkerConfig>, catalog: ToolCatalog) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        Self {
            catalog: Arc::new(catalog),
            executor: ToolExecutor::new(),
            config,
            metrics: CallMetrics::new(),
            tracker: TaskTracker::new(),
            permits,
            ledger: None,
        }
    }

    /// Worker with every built-in toolkit registered
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Setup`] if a toolkit fails to register
    pub fn with_builtins(config: Arc<WorkerConfig>) -> Result<Self, WorkerError> {
        let resources =
            Arc::new(LedgerResources::new().map_err(|e| WorkerError::Setup(e.to_string()))?);
        let mut catalog = ToolCatalog::new();
        let count = register_builtins(&mut catalog, &resources)
            .map_err(|e| WorkerError::Setup(e.to_string()))?;
        info!(tools = count, digest = %catalog.digest(), "Registered built-in toolkits");
        let mut worker = Self::new(config, catalog);
        worker.ledger = Some(resources);
        Ok(worker)
    }

    /// Replace the executor
    #[must_use]
    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Catalog
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Every tool definition, in registration order
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.catalog.definitions().into_iter().cloned().collect()
    }

    /// Resolve and run a wire request
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the tool does not exist or the worker
    /// is shutting down. Every failure inside the tool is reported in the
    /// response instead.
    pub async fn call_tool(&self, request: ToolCallRequest) -> Result<ToolCallResponse, WorkerError> {
        let tool = self
            .catalog
            .resolve(&request.tool)
            .map_err(|source| WorkerError::ToolNotFound {
                name: match &request.tool.toolkit {
                    Some(toolkit) => format!("{}.{}", toolkit, request.tool.name),
                    None => request.tool.name.clone(),
                },
                version: request
                    .tool
                    .version
                    .clone()
                    .unwrap_or_else(|| "latest".to_string()),
                source,
            })?;
        self.execute(tool, request.execution_id, request.context, &request.inputs)
            .await
    }

    /// Run a resolved tool
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ShuttingDown`] once shutdown has begun
    pub async fn execute(
        &self,
        tool: Arc<MaterializedTool>,
        execution_id: Option<String>,
        context: ToolContextPayload,
        inputs: &Map<String, Value>,
    ) -> Result<ToolCallResponse, WorkerError> {
        let execution_id = execution_id
            .filter(|id| !id.is_empty())
            .map_or_else(ExecutionId::new, ExecutionId::from_string);
        let fqn = tool.fully_qualified();
        let guard = self.tracker.track(format!("{} {}", execution_id, fqn))?;
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TrackerError::ShuttingDown {
                label: fqn.to_string(),
            })?;

        info!("{} | Calling tool: {}", execution_id, fqn);
        debug!("{} | Tool inputs: {}", execution_id, serde_json::Value::Object(inputs.clone()));

        let mut context = context
            .into_context(execution_id.clone())
            .with_cancellation(guard.token());
        for (key, value) in &self.config.tool_secrets {
            if !context.has_secret(key) {
                context = context.with_secret(
                    key.clone(),
                    SecretString::from(value.expose_secret().to_string()),
                );
            }
        }

        self.metrics.record_start();
        let started = Instant::now();
        let mut output = self.executor.run_tool(&tool, context, inputs).await;
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;

        self.log_outcome(&execution_id, &fqn.to_string(), &output, duration_ms);
        match &output.error {
            None => self.metrics.record_success(elapsed),
            Some(error) => self.metrics.record_failure(error.code, elapsed),
        }
        if !self.config.debug_tracebacks {
            if let Some(error) = output.error.as_mut() {
                error.stacktrace = None;
            }
        }

        Ok(ToolCallResponse {
            execution_id: execution_id.to_string(),
            duration: duration_ms,
            finished_at: Utc::now().to_rfc3339(),
            success: output.is_success(),
            output,
        })
    }

    fn log_outcome(&self, execution_id: &ExecutionId, fqn: &str, output: &ToolCallOutput, duration_ms: f64) {
        match &output.error {
            None => {
                info!("{} | Tool {} success", execution_id, fqn);
                debug!("{} | duration: {:.1}ms | Tool output: {:?}", execution_id, duration_ms, output.value);
            }
            Some(error) => {
                warn!("{} | Tool {} failed", execution_id, fqn);
                warn!("{} | Tool error: {}", execution_id, error.message);
                if let Some(developer_message) = &error.developer_message {
                    warn!("{} | Tool developer message: {}", execution_id, developer_message);
                }
                debug!("{} | duration: {:.1}ms", execution_id, duration_ms);
                if let Some(stacktrace) = &error.stacktrace {
                    debug!("{} | Tool traceback: {}", execution_id, stacktrace);
                }
            }
        }
    }

    /// Heartbeat payload
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            tool_count: self.catalog.len(),
            catalog_digest: self.catalog.digest(),
            environment: self.config.environment.clone(),
            in_flight: self.tracker.in_flight(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Call counters
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether [`Worker::shutdown`] has started
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_shutting_down()
    }

    /// Stop accepting calls, cancel in-flight ones, release resources
    pub async fn shutdown(&self) -> ShutdownReport {
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let report = self.tracker.shutdown(grace).await;
        self.permits.close();
        let disposed = match &self.ledger {
            Some(ledger) => ledger.dispose(grace).await,
            None => 0,
        };
        info!(
            cancelled = report.cancelled,
            drained = report.drained,
            aborted = report.aborted,
            abandoned = report.abandoned,
            disposed,
            "Worker shut down"
        );
        report
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("tools", &self.catalog.len())
            .field("environment", &self.config.environment)
            .field("in_flight", &self.tracker.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_core::ErrorCode;
    use serde_json::json;

    fn worker() -> Worker {
        let config = Arc::new(WorkerConfig::new().without_auth().with_tool_secret("API_KEY", "sk-abcdef"));
        Worker::with_builtins(config).unwrap()
    }

    fn request(body: Value) -> ToolCallRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_call_tool_success() {
        let worker = worker();
        let response = worker
            .call_tool(request(json!({
                "execution_id": "exec-42",
                "tool": {"name": "SayHello", "toolkit": "Greetings", "version": "1.0.0"},
                "inputs": {"name": "World"},
            })))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.execution_id, "exec-42");
        assert_eq!(response.output.value, Some(json!("Hello, World!")));
        assert!(response.duration >= 0.0);
        assert!(chrono::DateTime::parse_from_rfc3339(&response.finished_at).is_ok());
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_configured_secrets_are_injected() {
        let worker = worker();
        let response = worker
            .call_tool(request(json!({"tool": {"name": "Greetings.FetchGreetingConfig"}})))
            .await
            .unwrap();
        assert_eq!(response.output.value.unwrap()["api_key_hint"], "****cdef");
        assert!(!response.execution_id.is_empty());
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let worker = worker();
        let err = worker
            .call_tool(request(json!({"tool": {"name": "Nope", "toolkit": "Greetings", "version": "1.0.0"}})))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Greetings.Nope not found in catalog with toolkit version 1.0.0"));
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_metrics_and_stacktrace_stripped() {
        let worker = worker();
        let response = worker
            .call_tool(request(json!({"tool": {"name": "SayHello"}, "inputs": {}})))
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.output.error_code(), Some(ErrorCode::BadInputValue));
        assert!(response.output.error.unwrap().stacktrace.is_none());

        let metrics = worker.health().metrics;
        assert_eq!(metrics.calls_failed, 1);
        assert_eq!(metrics.failures_by_code.get("BAD_INPUT_VALUE"), Some(&1));
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_calls_after_shutdown() {
        let worker = worker();
        worker.shutdown().await;
        let err = worker
            .call_tool(request(json!({"tool": {"name": "SayHello"}, "inputs": {"name": "x"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ShuttingDown(_)));
    }

    #[test]
    fn test_health() {
        let worker = worker();
        let health = worker.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.tool_count, 9);
        assert_eq!(health.catalog_digest.len(), 64);
    }
}
