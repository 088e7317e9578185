//! Transport entry points.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::router;
use crate::mcp::McpHandler;
use crate::stdio::run_stdio;
use crate::worker::Worker;

/// Which transport the worker speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// HTTP routes, including MCP at `{base}/mcp`
    #[default]
    Http,
    /// MCP over stdin/stdout
    Stdio,
}

/// Serve `worker` on `transport` until shut down
///
/// # Errors
///
/// Returns an error if the transport cannot be started
pub async fn serve(worker: Arc<Worker>, transport: Transport) -> Result<()> {
    match transport {
        Transport::Http => serve_http(worker).await,
        Transport::Stdio => serve_stdio(worker).await,
    }
}

/// Serve HTTP until ctrl-c or SIGTERM, then drain the worker
///
/// # Errors
///
/// Returns an error if the address is unusable or the listener fails
pub async fn serve_http(worker: Arc<Worker>) -> Result<()> {
    let addr = worker.config().bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot listen on {}", addr))?;
    serve_http_with_shutdown(worker, listener, shutdown_signal()).await
}

/// Serve HTTP on `listener` until `signal` resolves
///
/// Once `signal` fires the worker is shut down first, so in-flight calls are
/// cancelled and answer `CANCELLED` before the server stops waiting on
/// their connections.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the listener fails
pub async fn serve_http_with_shutdown<F>(
    worker: Arc<Worker>,
    listener: TcpListener,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::clone(&worker))?;
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(
        addr = %addr,
        base_path = %worker.config().base_path,
        environment = %worker.config().environment,
        tools = worker.catalog().len(),
        "Worker listening"
    );
    let draining = Arc::clone(&worker);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            draining.shutdown().await;
        })
        .await
        .context("HTTP server failed")?;
    if !worker.is_shutting_down() {
        worker.shutdown().await;
    }
    Ok(())
}

/// Serve MCP on stdin/stdout until input closes, then drain the worker
///
/// # Errors
///
/// Returns an error if stdin or stdout fails
pub async fn serve_stdio(worker: Arc<Worker>) -> Result<()> {
    info!(tools = worker.catalog().len(), "Serving MCP over stdio");
    let handler = McpHandler::new(Arc::clone(&worker));
    let result = run_stdio(
        &handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;
    worker.shutdown().await;
    result.context("Stdio transport failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Shutdown signal received");
}
