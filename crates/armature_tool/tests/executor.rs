//! Executor behavior through the catalog: input gating, error taxonomy,
//! context injection, deprecation, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use armature_core::json_schema::input_schema;
use armature_core::{
    ErrorCode, ExecutionId, LogLevel, SecretString, ToolCallOutput, ToolContext, ToolkitDefinition,
    Version,
};
use armature_tool::{Param, Tool, ToolCatalog, ToolError, ToolExecutor, ToolFunction, ToolOptions};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

fn greetings() -> ToolkitDefinition {
    ToolkitDefinition {
        name: "Greetings".to_string(),
        version: Version::new(1, 0, 0),
        description: None,
    }
}

fn inputs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn context() -> ToolContext {
    ToolContext::new(ExecutionId::new())
}

fn say_hello(calls: Arc<AtomicUsize>) -> Tool {
    Tool::from(
        ToolFunction::new("say_hello")
            .doc("Say hello")
            .param(Param::new::<String>("name", "Who to greet"))
            .returns::<String>("Greeting")
            .sync_handler(move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("Hello, {}!", args.get::<String>("name")?))
            }),
    )
}

async fn run(catalog: &ToolCatalog, name: &str, ctx: ToolContext, raw: Value) -> ToolCallOutput {
    let tool = catalog.get_tool_by_name(name).unwrap();
    ToolExecutor::new().run_tool(&tool, ctx, &inputs(raw)).await
}

#[tokio::test]
async fn test_say_hello_success_wire_shape() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(say_hello(Arc::new(AtomicUsize::new(0))), &greetings())
        .unwrap();

    let output = run(&catalog, "Greetings.SayHello", context(), json!({"name": "World"})).await;
    assert!(output.is_success());
    assert_eq!(
        serde_json::to_value(&output).unwrap(),
        json!({"value": "Hello, World!"})
    );
}

#[tokio::test]
async fn test_missing_input_never_enters_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = ToolCatalog::new();
    catalog.add_tool(say_hello(Arc::clone(&calls)), &greetings()).unwrap();

    let output = run(&catalog, "SayHello", context(), json!({})).await;
    assert_eq!(output.error_code(), Some(ErrorCode::BadInputValue));
    assert!(output.error.as_ref().unwrap().message.contains("'name'"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let wire = serde_json::to_value(&output).unwrap();
    assert_eq!(wire["error"]["code"], "BAD_INPUT_VALUE");
}

#[tokio::test]
async fn test_wrong_type_never_enters_body() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut catalog = ToolCatalog::new();
    catalog.add_tool(say_hello(Arc::clone(&calls)), &greetings()).unwrap();

    let output = run(&catalog, "SayHello", context(), json!({"name": 42})).await;
    assert_eq!(output.error_code(), Some(ErrorCode::BadInputValue));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_arbitrary_errors_become_fatal() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("broken")
                .doc("Always fails")
                .handler(|_| async move {
                    Err::<(), _>(ToolError::from(anyhow::anyhow!("connection reset by peer")))
                }),
            &greetings(),
        )
        .unwrap();
    catalog
        .add_tool(
            ToolFunction::new("panicky")
                .doc("Always panics")
                .sync_handler(|_| -> Result<(), ToolError> { panic!("index out of bounds") }),
            &greetings(),
        )
        .unwrap();

    for name in ["Broken", "Panicky"] {
        let output = run(&catalog, name, context(), json!({})).await;
        assert!(!output.is_success(), "{} should fail", name);
        let error = output.error.unwrap();
        assert_eq!(error.code, ErrorCode::Fatal);
        assert!(!error.can_retry);
        assert!(error.message.contains("Error in execution"));
    }
}

#[tokio::test]
async fn test_retry_is_carried_through() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("flaky")
                .doc("Asks to be retried")
                .sync_handler(|_| -> Result<(), ToolError> {
                    Err(ToolError::retry("Service is warming up")
                        .with_retry_after_ms(1000)
                        .with_prompt("Try again in a second"))
                }),
            &greetings(),
        )
        .unwrap();

    let error = run(&catalog, "Flaky", context(), json!({}))
        .await
        .error
        .unwrap();
    assert_eq!(error.code, ErrorCode::RetryTool);
    assert!(error.can_retry);
    assert_eq!(error.retry_after_ms, Some(1000));
    assert_eq!(
        error.additional_prompt_content.as_deref(),
        Some("Try again in a second")
    );
}

#[tokio::test]
async fn test_context_required_not_retryable() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("pick_channel")
                .doc("Needs a channel")
                .sync_handler(|_| -> Result<(), ToolError> {
                    Err(ToolError::context_required(
                        "Several channels match",
                        "Ask the user which channel they meant",
                    ))
                }),
            &greetings(),
        )
        .unwrap();

    let error = run(&catalog, "PickChannel", context(), json!({}))
        .await
        .error
        .unwrap();
    assert_eq!(error.code, ErrorCode::ContextRequired);
    assert!(!error.can_retry);
    assert!(error.additional_prompt_content.is_some());
}

#[tokio::test]
async fn test_context_injection_is_invisible() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("whoami")
                .doc("Report the calling user")
                .context_param("context")
                .returns::<String>("User id")
                .sync_handler(|args| {
                    Ok(args.context()?.user_id().unwrap_or("anonymous").to_string())
                }),
            &greetings(),
        )
        .unwrap();

    let tool = catalog.get_tool_by_name("WhoAmI").unwrap();
    let schema = input_schema(&tool.definition.input);
    assert!(schema["properties"].get("context").is_none());

    let output = run(
        &catalog,
        "WhoAmI",
        context().with_user_id("user-7"),
        json!({}),
    )
    .await;
    assert_eq!(output.value, Some(json!("user-7")));

    let spoofed = run(&catalog, "WhoAmI", context(), json!({"context": {"user_id": "admin"}})).await;
    assert_eq!(spoofed.value, Some(json!("anonymous")));
}

#[tokio::test]
async fn test_deprecated_tool_succeeds_with_warning() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            Tool::new(
                ToolFunction::new("say_hi")
                    .doc("Say hi")
                    .param(Param::new::<String>("name", "Who"))
                    .returns::<String>("Greeting")
                    .sync_handler(|args| Ok(format!("Hi, {}!", args.get::<String>("name")?))),
                ToolOptions::new().deprecated("Use SayHello instead"),
            ),
            &greetings(),
        )
        .unwrap();

    let output = run(&catalog, "SayHi", context(), json!({"name": "Bo"})).await;
    assert!(output.is_success());
    let logs = output.logs.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Warning);
    assert_eq!(logs[0].subtype.as_deref(), Some("deprecation"));
    assert_eq!(logs[0].message, "Use SayHello instead");
}

#[tokio::test]
async fn test_missing_secret_is_fatal_and_names_key() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            Tool::new(
                ToolFunction::new("fetch_config")
                    .doc("Reads the API key")
                    .context_param("context")
                    .sync_handler(|args| {
                        let key = args.context()?.get_secret("API_KEY")?;
                        Ok(key.len())
                    }),
                ToolOptions::new().with_secret("API_KEY"),
            ),
            &greetings(),
        )
        .unwrap();

    let output = run(&catalog, "FetchConfig", context(), json!({})).await;
    let error = output.error.unwrap();
    assert_eq!(error.code, ErrorCode::Fatal);
    assert!(error.message.contains("API_KEY"));
    assert!(error.message.contains("export API_KEY="));

    let with_key = run(
        &catalog,
        "FetchConfig",
        context().with_secret("api_key", SecretString::from("abcdef")),
        json!({}),
    )
    .await;
    assert_eq!(with_key.value, Some(json!(6)));
}

#[tokio::test]
async fn test_upstream_errors_carry_status() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            Tool::from(
                ToolFunction::new("upstream")
                    .doc("Fails upstream with the given status")
                    .param(Param::new::<u16>("status", "HTTP status"))
                    .sync_handler(|args| -> Result<(), ToolError> {
                        let status: u16 = args.get("status")?;
                        Err(ToolError::upstream(status, "Upstream failed"))
                    }),
            ),
            &greetings(),
        )
        .unwrap();

    let cases = [
        (400, ErrorCode::BadRequest, false),
        (401, ErrorCode::AuthError, false),
        (404, ErrorCode::NotFound, false),
        (429, ErrorCode::RateLimit, true),
        (503, ErrorCode::ServerError, true),
    ];
    for (status, code, retry) in cases {
        let error = run(&catalog, "Upstream", context(), json!({"status": status}))
            .await
            .error
            .unwrap();
        assert_eq!(error.code, code, "status {}", status);
        assert_eq!(error.can_retry, retry, "status {}", status);
        assert_eq!(error.status_code, Some(status));
    }
}

#[tokio::test]
async fn test_cancellation_mid_flight() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("slow").doc("Takes a while").handler(|_| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("done")
            }),
            &greetings(),
        )
        .unwrap();
    let tool = catalog.get_tool_by_name("Slow").unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let output = tokio::time::timeout(
        Duration::from_secs(5),
        ToolExecutor::new().run_tool(&tool, context().with_cancellation(token), &Map::new()),
    )
    .await
    .unwrap();
    let error = output.error.unwrap();
    assert_eq!(error.code, ErrorCode::Cancelled);
    assert!(!error.can_retry);
    assert!(error
        .developer_message
        .unwrap()
        .contains("partially applied"));
}

#[tokio::test]
async fn test_defaults_reach_the_body() {
    let mut catalog = ToolCatalog::new();
    catalog
        .add_tool(
            ToolFunction::new("page")
                .doc("Echo the page size")
                .param(Param::new::<u32>("limit", "Page size").with_default(25))
                .returns::<u32>("Page size")
                .sync_handler(|args| args.get::<u32>("limit")),
            &greetings(),
        )
        .unwrap();

    let output = run(&catalog, "Page", context(), json!({})).await;
    assert_eq!(output.value, Some(json!(25)));
}
