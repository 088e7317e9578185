//! HTTP-backed tools.
//!
//! A tool declared with an [`HttpEndpoint`] has no in-process body. The
//! executor maps its validated inputs onto the endpoint's wire parameters,
//! renders the URL and header templates, and sends the request through an
//! [`HttpInvoker`].

use std::time::Duration;

use armature_core::{AcceptedAs, HttpEndpoint, HttpMethod, ToolContext, ToolDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Key under which the end-user token is exposed to templates
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Suggested delay for a 429 that carried no usable `Retry-After`
pub const DEFAULT_RATE_LIMIT_RETRY_MS: u64 = 1_000;

/// Fully-rendered request, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestPlan {
    /// Verb
    pub method: HttpMethod,
    /// URL with path parameters substituted
    pub url: String,
    /// Headers in template order
    pub headers: IndexMap<String, String>,
    /// Query string pairs
    pub query: Vec<(String, String)>,
    /// JSON body, when any parameter is sent as body
    pub body: Option<Map<String, Value>>,
    /// Form fields, when any parameter is sent as form data
    pub form: Option<Vec<(String, String)>>,
}

/// Build the request for `definition` from validated inputs and `context`
///
/// # Errors
///
/// Returns [`ToolError::Runtime`] when the endpoint and the tool's inputs
/// have drifted apart: an input without a wire name, a required endpoint
/// parameter with no value, or a template placeholder with no value
pub fn build_request_plan(
    definition: &ToolDefinition,
    endpoint: &HttpEndpoint,
    validated: &Map<String, Value>,
    context: &ToolContext,
) -> Result<HttpRequestPlan, ToolError> {
    let tool = definition.fully_qualified_name.as_str();
    let http_inputs = http_inputs(definition, validated, context)?;

    let mut path = IndexMap::new();
    let mut header_inputs = IndexMap::new();
    let mut query = Vec::new();
    let mut body = Map::new();
    let mut form = Vec::new();

    for param in &endpoint.parameters {
        let Some(value) = http_inputs.get(&param.name) else {
            if param.required {
                return Err(drift(
                    tool,
                    format!(
                        "HTTP endpoint parameter '{}' is required but has no value",
                        param.name
                    ),
                ));
            }
            continue;
        };
        match param.accepted_as {
            AcceptedAs::Path => {
                path.insert(param.name.clone(), stringify(value));
            }
            AcceptedAs::Header => {
                header_inputs.insert(param.name.clone(), stringify(value));
            }
            AcceptedAs::Query => query.push((param.name.clone(), stringify(value))),
            AcceptedAs::Body => {
                body.insert(param.name.clone(), value.clone());
            }
            AcceptedAs::FormData => form.push((param.name.clone(), stringify(value))),
        }
    }

    let url = render(&endpoint.url, |key| {
        path.get(key).map(|v| urlencoding::encode(v).into_owned())
    })
    .map_err(|key| {
        drift(
            tool,
            format!("URL template '{}' references '{}' which has no value", endpoint.url, key),
        )
    })?;

    let template_vars = |key: &str| {
        header_inputs
            .get(key)
            .cloned()
            .or_else(|| http_inputs.get(key).map(stringify))
    };
    let mut headers = IndexMap::new();
    for (name, template) in &endpoint.headers {
        let rendered = render(template, template_vars).map_err(|key| {
            drift(
                tool,
                format!("Header '{}' references '{}' which has no value", name, key),
            )
        })?;
        headers.insert(name.clone(), rendered);
    }
    for (name, value) in &header_inputs {
        let referenced = endpoint
            .headers
            .values()
            .any(|template| template.contains(&format!("{{{}}}", name)));
        if !referenced && !has_header(&headers, name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    let token = context.get_auth_token_or_empty();
    if !token.is_empty() && !has_header(&headers, "authorization") {
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    }

    Ok(HttpRequestPlan {
        method: endpoint.http_method,
        url,
        headers,
        query,
        body: (!body.is_empty()).then_some(body),
        form: (!form.is_empty()).then_some(form),
    })
}

/// Map validated tool inputs to wire names and add the context's credentials
fn http_inputs(
    definition: &ToolDefinition,
    validated: &Map<String, Value>,
    context: &ToolContext,
) -> Result<Map<String, Value>, ToolError> {
    let tool = definition.fully_qualified_name.as_str();
    let mut inputs = Map::new();

    for (name, value) in validated {
        if value.is_null() {
            continue;
        }
        let Some(param) = definition.input.parameter(name) else {
            return Err(drift(
                tool,
                format!("input '{}' is not a declared parameter", name),
            ));
        };
        let Some(wire_name) = &param.http_endpoint_parameter_name else {
            return Err(drift(
                tool,
                format!("input '{}' has no HTTP endpoint parameter name", name),
            ));
        };
        inputs.insert(wire_name.clone(), value.clone());
    }

    let token = context.get_auth_token_or_empty();
    if !token.is_empty() {
        inputs.insert(AUTH_TOKEN_KEY.to_string(), Value::String(token));
    }
    for key in context.secret_keys() {
        if let Ok(secret) = context.get_secret(key) {
            inputs.insert(key.to_lowercase(), Value::String(secret));
        }
    }
    Ok(inputs)
}

fn drift(tool: &str, detail: String) -> ToolError {
    ToolError::Runtime {
        message: format!("Tool {} is misconfigured: {}", tool, detail),
        developer_message: Some(
            "The HTTP endpoint definition and the tool's input schema are out of sync".to_string(),
        ),
    }
}

fn has_header(headers: &IndexMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{key}` placeholders; `{{` and `}}` are literal braces
///
/// Returns the first placeholder `lookup` cannot resolve.
fn render<F>(template: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let key: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let key = key.trim();
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => return Err(key.to_string()),
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Response from an upstream API
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Parsed body; a non-JSON body is carried as a string
    pub body: Value,
    /// Parsed `Retry-After`, in milliseconds
    pub retry_after_ms: Option<u64>,
}

impl HttpResponse {
    /// Map the response onto a tool result
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Upstream`] for any non-2xx status. A 429
    /// always carries a retry delay, [`DEFAULT_RATE_LIMIT_RETRY_MS`] when
    /// the upstream named none.
    pub fn into_result(self) -> Result<Value, ToolError> {
        if (200..300).contains(&self.status) {
            return Ok(self.body);
        }
        let detail = match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut error = ToolError::upstream(
            self.status,
            format!("Upstream API returned status {}", self.status),
        );
        if !detail.is_empty() {
            error = error.with_developer_message(detail);
        }
        let delay = match (self.retry_after_ms, self.status) {
            (Some(delay), _) => Some(delay),
            (None, 429) => Some(DEFAULT_RATE_LIMIT_RETRY_MS),
            (None, _) => None,
        };
        if let Some(delay) = delay {
            error = error.with_retry_after_ms(delay);
        }
        Err(error)
    }
}

/// Sends planned requests
#[async_trait]
pub trait HttpInvoker: Send + Sync {
    /// Send `plan` and return the response
    ///
    /// # Errors
    ///
    /// Returns error when the request cannot be delivered
    async fn invoke(&self, plan: &HttpRequestPlan) -> Result<HttpResponse, ToolError>;
}

/// [`HttpInvoker`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestInvoker {
    client: reqwest::Client,
}

impl ReqwestInvoker {
    /// Invoker with a request timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Invoker over an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestInvoker {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl HttpInvoker for ReqwestInvoker {
    async fn invoke(&self, plan: &HttpRequestPlan) -> Result<HttpResponse, ToolError> {
        let method = match plan.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut request = self.client.request(method, &plan.url);
        for (name, value) in &plan.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !plan.query.is_empty() {
            request = request.query(&plan.query);
        }
        if let Some(form) = &plan.form {
            request = request.form(form);
        } else if let Some(body) = &plan.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            ToolError::retry("Could not reach the upstream API")
                .with_developer_message(e.to_string())
        })?;
        let status = response.status().as_u16();
        let retry_after_ms = header_retry_after(response.headers());
        let text = response.text().await.map_err(|e| {
            ToolError::retry("Upstream API response was interrupted")
                .with_developer_message(e.to_string())
        })?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(HttpResponse {
            status,
            body,
            retry_after_ms,
        })
    }
}

fn header_retry_after(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(raw, Utc::now())
}

/// Milliseconds to wait for a `Retry-After` value, relative to `now`
///
/// Accepts delay-seconds (`120`) and HTTP-date
/// (`Wed, 21 Oct 2015 07:28:00 GMT`). A date already past yields `0`.
#[must_use]
pub fn parse_retry_after(raw: &str, now: DateTime<Utc>) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs.saturating_mul(1000));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?;
    let wait = at.with_timezone(&Utc) - now;
    Some(u64::try_from(wait.num_milliseconds()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_core::{
        ExecutionId, HttpEndpointParameter, InputParameter, SecretString, ToolInput,
        ToolkitDefinition, ValueSchema, Version,
    };
    use serde_json::json;

    fn definition(endpoint: &HttpEndpoint) -> ToolDefinition {
        ToolDefinition {
            name: "GetIssue".to_string(),
            fully_qualified_name: "Tracker.GetIssue@1.0.0".to_string(),
            description: "Fetch an issue".to_string(),
            toolkit: ToolkitDefinition {
                name: "Tracker".to_string(),
                version: Version::new(1, 0, 0),
                description: None,
            },
            input: ToolInput {
                parameters: vec![
                    InputParameter::new("repo", ValueSchema::string(), true).with_http_name("repo"),
                    InputParameter::new("number", ValueSchema::integer(), true)
                        .with_http_name("issue_number"),
                    InputParameter::new("fields", ValueSchema::string(), false)
                        .with_http_name("fields"),
                ],
                tool_context_parameter_name: None,
            },
            output: Default::default(),
            requirements: Default::default(),
            deprecation_message: None,
            http_endpoint: Some(endpoint.clone()),
        }
    }

    fn endpoint() -> HttpEndpoint {
        HttpEndpoint::new(HttpMethod::Get, "https://api.example.com/repos/{repo}/issues/{issue_number}")
            .with_header("X-Api-Key", "{api_key}")
            .with_parameter(HttpEndpointParameter::new("repo", AcceptedAs::Path, true))
            .with_parameter(HttpEndpointParameter::new("issue_number", AcceptedAs::Path, true))
            .with_parameter(HttpEndpointParameter::new("fields", AcceptedAs::Query, false))
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_plan_substitutes_path_query_and_headers() {
        let endpoint = endpoint();
        let context = ToolContext::new(ExecutionId::new())
            .with_auth_token(SecretString::from("tok"))
            .with_secret("API_KEY", SecretString::from("k-123"));
        let plan = build_request_plan(
            &definition(&endpoint),
            &endpoint,
            &inputs(json!({"repo": "a b", "number": 7, "fields": "title"})),
            &context,
        )
        .unwrap();
        assert_eq!(plan.url, "https://api.example.com/repos/a%20b/issues/7");
        assert_eq!(plan.query, vec![("fields".to_string(), "title".to_string())]);
        assert_eq!(plan.headers["X-Api-Key"], "k-123");
        assert_eq!(plan.headers["Authorization"], "Bearer tok");
        assert!(plan.body.is_none());
    }

    #[test]
    fn test_optional_param_skipped() {
        let endpoint = HttpEndpoint::new(HttpMethod::Get, "https://api.example.com/repos/{repo}/issues/{issue_number}")
            .with_parameter(HttpEndpointParameter::new("repo", AcceptedAs::Path, true))
            .with_parameter(HttpEndpointParameter::new("issue_number", AcceptedAs::Path, true))
            .with_parameter(HttpEndpointParameter::new("fields", AcceptedAs::Query, false));
        let plan = build_request_plan(
            &definition(&endpoint),
            &endpoint,
            &inputs(json!({"repo": "r", "number": 1, "fields": null})),
            &ToolContext::new(ExecutionId::new()),
        )
        .unwrap();
        assert!(plan.query.is_empty());
        assert!(!plan.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_required_endpoint_param_missing_is_runtime_error() {
        let endpoint = endpoint()
            .with_parameter(HttpEndpointParameter::new("owner", AcceptedAs::Body, true));
        let err = build_request_plan(
            &definition(&endpoint),
            &endpoint,
            &inputs(json!({"repo": "r", "number": 1})),
            &ToolContext::new(ExecutionId::new()).with_secret("API_KEY", SecretString::from("k")),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Runtime { .. }));
        assert!(err.to_string().contains("'owner'"));
    }

    #[test]
    fn test_unresolved_header_placeholder() {
        let endpoint = endpoint();
        let err = build_request_plan(
            &definition(&endpoint),
            &endpoint,
            &inputs(json!({"repo": "r", "number": 1})),
            &ToolContext::new(ExecutionId::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_render_escapes() {
        let out = render("{{literal}} {x}", |k| (k == "x").then(|| "1".to_string())).unwrap();
        assert_eq!(out, "{literal} 1");
        assert_eq!(render("{missing}", |_| None).unwrap_err(), "missing");
    }

    #[test]
    fn test_response_status_mapping() {
        let ok = HttpResponse {
            status: 200,
            body: json!({"id": 1}),
            retry_after_ms: None,
        };
        assert_eq!(ok.into_result().unwrap(), json!({"id": 1}));

        let limited = HttpResponse {
            status: 429,
            body: json!("slow down"),
            retry_after_ms: Some(3000),
        };
        let err = limited.into_result().unwrap_err().into_call_error("T.U");
        assert!(err.can_retry);
        assert_eq!(err.retry_after_ms, Some(3000));

        let unavailable = HttpResponse {
            status: 503,
            body: Value::Null,
            retry_after_ms: None,
        };
        let err = unavailable.into_result().unwrap_err().into_call_error("T.U");
        assert_eq!(err.retry_after_ms, None);
    }
}
