//! The shipped toolkits, driven end to end through the catalog.

use std::sync::Arc;

use armature_core::{
    ErrorCode, ExecutionId, SecretString, ToolCallOutput, ToolContext, ToolReference,
};
use armature_tool::{register_builtins, LedgerResources, ToolCatalog, ToolExecutor};
use serde_json::{json, Value};

struct Harness {
    catalog: ToolCatalog,
    executor: ToolExecutor,
    resources: Arc<LedgerResources>,
}

impl Harness {
    fn new() -> Self {
        let resources = Arc::new(LedgerResources::new().unwrap());
        let mut catalog = ToolCatalog::new();
        register_builtins(&mut catalog, &resources).unwrap();
        Self {
            catalog,
            executor: ToolExecutor::new(),
            resources,
        }
    }

    async fn call(&self, name: &str, inputs: Value) -> ToolCallOutput {
        self.call_with(name, ToolContext::new(ExecutionId::new()), inputs)
            .await
    }

    async fn call_with(&self, name: &str, context: ToolContext, inputs: Value) -> ToolCallOutput {
        let tool = self.catalog.get_tool_by_name(name).unwrap();
        self.executor
            .run_tool(&tool, context, inputs.as_object().unwrap())
            .await
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.resources.close();
    }
}

#[tokio::test]
async fn test_catalog_contents() {
    let harness = Harness::new();
    assert_eq!(harness.catalog.len(), 9);

    let toolkits: Vec<String> = harness
        .catalog
        .toolkits()
        .into_iter()
        .map(|toolkit| toolkit.name)
        .collect();
    assert_eq!(toolkits, ["Greetings", "Arithmetic", "Directory", "Ledger"]);

    let digest = harness.catalog.digest();
    assert_eq!(digest.len(), 64);
    assert_eq!(digest, Harness::new().catalog.digest());
}

#[tokio::test]
async fn test_resolve_wire_reference() {
    let harness = Harness::new();
    let reference = ToolReference {
        toolkit: Some("Greetings".to_string()),
        name: "SayHello".to_string(),
        version: Some("1.0.0".to_string()),
    };
    let tool = harness.catalog.resolve(&reference).unwrap();
    assert_eq!(tool.fully_qualified().to_string(), "Greetings.SayHello@1.0.0");
}

#[tokio::test]
async fn test_say_hi_is_deprecated_but_works() {
    let harness = Harness::new();
    let output = harness.call("SayHi", json!({"name": "Ada"})).await;
    assert_eq!(output.value, Some(json!("Hi, Ada!")));
    assert!(output.logs.unwrap()[0].message.contains("use SayHello"));
}

#[tokio::test]
async fn test_fetch_greeting_config_masks_key() {
    let harness = Harness::new();
    let missing = harness.call("FetchGreetingConfig", json!({})).await;
    assert_eq!(missing.error_code(), Some(ErrorCode::Fatal));
    assert!(missing.error.unwrap().message.contains("API_KEY"));

    let context = ToolContext::new(ExecutionId::new())
        .with_secret("API_KEY", SecretString::from("sk-live-98765"));
    let output = harness
        .call_with("FetchGreetingConfig", context, json!({}))
        .await;
    assert_eq!(
        output.value,
        Some(json!({"greeting": "Hello", "api_key_hint": "****8765"}))
    );
}

#[tokio::test]
async fn test_add_overflow_is_fatal() {
    let harness = Harness::new();
    assert_eq!(
        harness.call("Add", json!({"a": 2, "b": 40})).await.value,
        Some(json!(42))
    );
    let overflow = harness
        .call("Arithmetic.Add", json!({"a": i64::MAX, "b": 1}))
        .await;
    assert_eq!(overflow.error_code(), Some(ErrorCode::Fatal));
}

#[tokio::test]
async fn test_sum_all_rejects_mixed_list() {
    let harness = Harness::new();
    assert_eq!(
        harness.call("SumAll", json!({"values": [1, 2.5, 3]})).await.value,
        Some(json!(6.5))
    );
    let bad = harness.call("SumAll", json!({"values": [1, "two"]})).await;
    let error = bad.error.unwrap();
    assert_eq!(error.code, ErrorCode::BadInputValue);
    assert!(error.message.contains("values[1]"));
}

#[tokio::test]
async fn test_describe_shape_asks_for_retry() {
    let harness = Harness::new();
    let ok = harness
        .call("DescribeShape", json!({"shape": {"kind": "triangle", "sides": 3}}))
        .await;
    assert!(ok.is_success());

    let wrong = harness
        .call("DescribeShape", json!({"shape": {"kind": "triangle", "sides": 4}}))
        .await;
    let error = wrong.error.unwrap();
    assert_eq!(error.code, ErrorCode::RetryTool);
    assert!(error.can_retry);
    assert!(error
        .additional_prompt_content
        .unwrap()
        .contains("sides=3"));

    let unknown_kind = harness
        .call("DescribeShape", json!({"shape": {"kind": "blob", "sides": 3}}))
        .await;
    assert_eq!(unknown_kind.error_code(), Some(ErrorCode::BadInputValue));
}

#[tokio::test]
async fn test_lookup_users_partial_result() {
    let harness = Harness::new();
    let output = harness
        .call(
            "LookupUsers",
            json!({"usernames": ["grace", "nobody", "Alan", "ghost"]}),
        )
        .await;
    assert_eq!(
        output.value,
        Some(json!({
            "found": [
                {"username": "grace", "display_name": "Grace Hopper"},
                {"username": "alan", "display_name": "Alan Turing"},
            ],
            "not_found": ["nobody", "ghost"],
        }))
    );
}

#[tokio::test]
async fn test_ledger_round_trip_on_lane() {
    let harness = Harness::new();
    let first = harness
        .call("RecordEntry", json!({"account": "alice", "amount": 1500}))
        .await;
    assert_eq!(first.value, Some(json!(1500)));
    let second = harness
        .call("RecordEntry", json!({"account": "alice", "amount": -250}))
        .await;
    assert_eq!(second.value, Some(json!(1250)));

    let balance = harness.call("GetBalance", json!({"account": "alice"})).await;
    assert_eq!(balance.value, Some(json!(1250)));

    let other = harness
        .call("GetBalance", json!({"account": "alice", "ledger": "archive"}))
        .await;
    assert_eq!(other.value, Some(json!(0)));
    assert_eq!(harness.resources.engines().len(), 2);
}

#[tokio::test]
async fn test_concurrent_ledger_posts_are_serialized() {
    let harness = Arc::new(Harness::new());
    let posts = (0..20).map(|_| {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .call("RecordEntry", json!({"account": "bob", "amount": 5}))
                .await
        })
    });
    for post in futures::future::join_all(posts).await {
        assert!(post.unwrap().is_success());
    }
    let balance = harness.call("GetBalance", json!({"account": "bob"})).await;
    assert_eq!(balance.value, Some(json!(100)));
}
