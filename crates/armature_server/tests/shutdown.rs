//! Graceful shutdown of the HTTP transport with a call still running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use armature_core::Version;
use armature_server::{serve_http_with_shutdown, Worker, WorkerConfig};
use armature_tool::{ToolArgs, ToolCatalog, ToolError, ToolFunction, Toolkit};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn slow_worker() -> Arc<Worker> {
    let mut config = WorkerConfig::new().without_auth();
    config.shutdown_grace_ms = 2_000;
    let wait = ToolFunction::new("wait_forever")
        .doc("Sleeps far past any test timeout")
        .returns::<String>("Never returned")
        .handler(|_args: ToolArgs| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ToolError>("woke".to_string())
        });
    let mut catalog = ToolCatalog::new();
    catalog
        .add_toolkit(Toolkit::new("Slow", Version::new(1, 0, 0)).tool(wait))
        .unwrap();
    Arc::new(Worker::new(Arc::new(config), catalog))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_in_flight_call() {
    let worker = slow_worker();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_http_with_shutdown(
        Arc::clone(&worker),
        listener,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let call = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://{}/worker/tools/invoke", addr))
            .json(&json!({
                "tool": {"name": "WaitForever", "toolkit": "Slow", "version": "1.0.0"},
                "inputs": {},
            }))
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap()
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while worker.health().in_flight == 0 {
        assert!(Instant::now() < deadline, "call never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let started = Instant::now();
    stop_tx.send(()).unwrap();

    let body = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("call outlived the grace period")
        .unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["output"]["error"]["code"], "CANCELLED");
    assert_eq!(body["output"]["error"]["can_retry"], false);

    tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(worker.is_shutting_down());
    assert_eq!(worker.health().in_flight, 0);
}
