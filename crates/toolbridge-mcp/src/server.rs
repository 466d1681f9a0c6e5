//! MCP JSON-RPC server.
//!
//! Implements the MCP JSON-RPC 2.0 protocol, exposing every registered
//! adapter tool as an MCP tool.  Supports the `initialize`, `tools/list`,
//! `tools/call`, and `ping` methods; notifications are accepted silently.
//!
//! Targets MCP protocol version `2024-11-05`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use toolbridge_adapters::Adapter;

// ---------------------------------------------------------------------------
// MCP protocol version
// ---------------------------------------------------------------------------

/// The MCP protocol version this server implements.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default server name reported during initialization.
const DEFAULT_SERVER_NAME: &str = "toolbridge";

/// The server version reported during initialization.
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier.  Absent for notifications; an explicit `null`
    /// is kept as `Some(Value::Null)` and still gets a response.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (defaults to `null` if absent).
    #[serde(default)]
    pub params: Value,
}

/// Any `id` member that is present, `null` included, marks a request.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Notifications carry no id member and never get a response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed from the request; `null` when it could not be read.
    pub id: Option<Value>,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (negative numbers are reserved by JSON-RPC).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

impl JsonRpcResponse {
    /// Construct a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Construct an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MCP-specific types
// ---------------------------------------------------------------------------

/// An MCP tool definition returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    /// The machine-readable tool name.
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The result of an MCP `tools/call` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    /// The content blocks returned by the tool.
    pub content: Vec<McpContent>,
    /// Whether the tool call resulted in an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// A single content block within an MCP tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpContent {
    /// The content type (e.g. `"text"`).
    #[serde(rename = "type")]
    pub content_type: String,
    /// The textual content.
    pub text: String,
}

impl McpContent {
    /// Create a text content block.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: value.into(),
        }
    }
}

impl McpToolResult {
    /// Create a successful tool result with a single text block.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::text(text)],
            is_error: None,
        }
    }

    /// Create an error tool result with a single `Error: ...` text block.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![McpContent::text(format!("Error: {message}"))],
            is_error: Some(true),
        }
    }
}

// ---------------------------------------------------------------------------
// McpServer
// ---------------------------------------------------------------------------

/// MCP protocol server that exposes adapters as tools.
pub struct McpServer {
    name: String,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl McpServer {
    /// Create a new MCP server backed by the given (connected) adapters.
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_owned(),
            adapters,
        }
    }

    /// Override the name reported in `serverInfo`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The adapters this server dispatches to.
    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    /// Handle one raw JSON-RPC payload (a single message or a batch) and
    /// return the JSON to send back, or `None` when nothing should be sent.
    pub async fn handle_text(&self, body: &str) -> Option<Value> {
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable JSON-RPC payload");
                return to_json(&JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("failed to parse JSON-RPC request: {e}"),
                ));
            }
        };

        match parsed {
            Value::Array(batch) => {
                if batch.is_empty() {
                    return to_json(&JsonRpcResponse::error(
                        None,
                        INVALID_REQUEST,
                        "empty batch request",
                    ));
                }
                let mut responses = Vec::with_capacity(batch.len());
                for item in batch {
                    if let Some(response) = self.handle_value(item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    serde_json::to_value(responses).ok()
                }
            }
            single => {
                let response = self.handle_value(single).await?;
                to_json(&response)
            }
        }
    }

    async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().filter(|id| !id.is_null());
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_message(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("invalid JSON-RPC request: {e}"),
            )),
        }
    }

    /// Handle a parsed message; notifications yield `None`.
    pub async fn handle_message(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "MCP notification received");
            return None;
        }
        Some(self.handle_request(request).await)
    }

    /// Handle a single JSON-RPC request and return a response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, "MCP request received");

        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                INVALID_REQUEST,
                format!("unsupported jsonrpc version `{}`", request.jsonrpc),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            other => {
                warn!(method = %other, "unknown MCP method");
                JsonRpcResponse::error(
                    request.id,
                    METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                )
            }
        }
    }

    /// Handle the `initialize` handshake.
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": self.name,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    /// Handle `tools/list` by collecting tool definitions from all adapters.
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.list_tools();
        match serde_json::to_value(&tools) {
            Ok(tools_value) => JsonRpcResponse::success(id, json!({ "tools": tools_value })),
            Err(e) => {
                error!(error = %e, "failed to serialize tool list");
                JsonRpcResponse::error(id, INTERNAL_ERROR, "failed to serialize tool list")
            }
        }
    }

    /// Handle `tools/call` by dispatching to the appropriate adapter.
    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_owned(),
            None => {
                return JsonRpcResponse::error(
                    id,
                    INVALID_PARAMS,
                    "missing required field `name` in params",
                );
            }
        };

        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args) => args.clone(),
        };

        let result = self.call_tool(&name, arguments).await;
        match serde_json::to_value(&result) {
            Ok(v) => JsonRpcResponse::success(id, v),
            Err(e) => {
                error!(error = %e, "failed to serialize tool result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, "failed to serialize tool result")
            }
        }
    }

    /// Build the tool list from all adapters.
    pub fn list_tools(&self) -> Vec<McpToolDefinition> {
        self.adapters
            .iter()
            .flat_map(|adapter| {
                adapter.tools().into_iter().map(|t| McpToolDefinition {
                    name: t.name,
                    description: t.description,
                    input_schema: t.parameters,
                })
            })
            .collect()
    }

    /// Execute a tool call on the adapter that owns the tool.  Failures are
    /// folded into an `isError` result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpToolResult {
        let Some(adapter) = self.adapters.iter().find(|a| a.has_tool(name)) else {
            warn!(tool = %name, "unknown tool requested");
            return McpToolResult::error(format!("Unknown tool: {name}"));
        };

        match adapter.execute_tool(name, arguments).await {
            Ok(value) => {
                let text = match value {
                    Value::String(s) => s,
                    other => {
                        serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string())
                    }
                };
                McpToolResult::success(text)
            }
            Err(e) => {
                warn!(adapter = %adapter.id(), tool = %name, error = %e, "tool call failed");
                McpToolResult::error(e)
            }
        }
    }
}

fn to_json(response: &JsonRpcResponse) -> Option<Value> {
    match serde_json::to_value(response) {
        Ok(v) => Some(v),
        Err(e) => {
            error!(error = %e, "failed to serialize JSON-RPC response");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolbridge_adapters::{AdapterError, AdapterType, HealthStatus, ToolDefinition};

    struct MockAdapter {
        id: String,
        tool_defs: Vec<ToolDefinition>,
    }

    impl MockAdapter {
        fn new(id: &str, tools: Vec<ToolDefinition>) -> Self {
            Self {
                id: id.to_owned(),
                tool_defs: tools,
            }
        }
    }

    #[async_trait]
    impl Adapter for MockAdapter {
        fn id(&self) -> &str {
            &self.id
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::DevTools
        }

        async fn connect(&mut self) -> toolbridge_adapters::Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> toolbridge_adapters::Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> toolbridge_adapters::Result<HealthStatus> {
            Ok(HealthStatus::Healthy)
        }

        fn tools(&self) -> Vec<ToolDefinition> {
            self.tool_defs.clone()
        }

        async fn execute_tool(
            &self,
            name: &str,
            params: Value,
        ) -> toolbridge_adapters::Result<Value> {
            match name {
                "mock_echo" => Ok(json!({ "echo": params })),
                "mock_text" => Ok(Value::String("plain text".into())),
                "mock_fail" => Err(AdapterError::ConfigError(
                    "Either GITHUB_ORG or GITHUB_REPOS environment variable is required".into(),
                )),
                _ => Err(AdapterError::ToolNotFound {
                    adapter_id: self.id.clone(),
                    tool_name: name.to_owned(),
                }),
            }
        }
    }

    fn mock_tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_owned(),
            description: format!("{name} tool"),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    fn server() -> McpServer {
        let adapters: Vec<Arc<dyn Adapter>> = vec![
            Arc::new(MockAdapter::new(
                "mock1",
                vec![mock_tool("mock_echo"), mock_tool("mock_fail")],
            )),
            Arc::new(MockAdapter::new("mock2", vec![mock_tool("mock_text")])),
        ];
        McpServer::new(adapters)
    }

    fn request(id: Value, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    #[test]
    fn request_parsing_without_params() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        assert_eq!(req.method, "ping");
        assert!(req.params.is_null());
        assert!(!req.is_notification());
    }

    #[test]
    fn null_id_is_a_request_not_a_notification() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert_eq!(req.id, Some(Value::Null));
        assert!(!req.is_notification());

        let note: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(note.id.is_none());
        assert!(note.is_notification());
    }

    #[test]
    fn error_response_omits_result() {
        let resp = JsonRpcResponse::error(Some(json!(2)), METHOD_NOT_FOUND, "not found");
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_name() {
        let server = server().with_name("standup");
        let resp = server
            .handle_request(request(json!(1), "initialize", json!({})))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "standup");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let resp = server()
            .handle_request(request(json!(42), "ping", Value::Null))
            .await;
        assert_eq!(resp.result, Some(json!({})));
    }

    #[tokio::test]
    async fn tools_list_collects_all_adapters() {
        let resp = server()
            .handle_request(request(json!(3), "tools/list", Value::Null))
            .await;
        let result = resp.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        for tool in tools {
            assert!(tool.get("inputSchema").is_some());
        }
    }

    #[tokio::test]
    async fn tools_call_string_result_is_passed_through() {
        let resp = server()
            .handle_request(request(
                json!(4),
                "tools/call",
                json!({ "name": "mock_text", "arguments": {} }),
            ))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "plain text");
        assert!(result.get("isError").is_none());
    }

    #[tokio::test]
    async fn tools_call_json_result_is_pretty_printed() {
        let resp = server()
            .handle_request(request(
                json!(5),
                "tools/call",
                json!({ "name": "mock_echo", "arguments": { "input": "hi" } }),
            ))
            .await;
        let text = resp.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_owned();
        assert!(text.contains("\"input\": \"hi\""));
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_text() {
        let resp = server()
            .handle_request(request(
                json!(6),
                "tools/call",
                json!({ "name": "mock_fail" }),
            ))
            .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(
            result["content"][0]["text"],
            "Error: Either GITHUB_ORG or GITHUB_REPOS environment variable is required"
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_descriptive_text() {
        let resp = server()
            .handle_request(request(json!(7), "tools/call", json!({ "name": "nope" })))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn missing_tool_name_is_invalid_params() {
        let resp = server()
            .handle_request(request(json!(8), "tools/call", json!({ "arguments": {} })))
            .await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let resp = server()
            .handle_request(request(json!(9), "resources/list", Value::Null))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("resources/list"));
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let mut req = request(json!(10), "ping", Value::Null);
        req.jsonrpc = "1.0".into();
        let resp = server().handle_request(req).await;
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let out = server()
            .handle_text(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn handle_text_parse_error_has_null_id() {
        let out = server().handle_text("not json").await.unwrap();
        assert_eq!(out["error"]["code"], PARSE_ERROR);
        assert!(out["id"].is_null());
    }

    #[tokio::test]
    async fn handle_text_batch() {
        let out = server()
            .handle_text(
                r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},
                    {"jsonrpc":"2.0","method":"notifications/initialized"},
                    {"jsonrpc":"2.0","id":2,"method":"bogus"},
                    {"id":3}]"#,
            )
            .await
            .unwrap();
        let responses = out.as_array().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn handle_text_answers_null_id_requests() {
        let out = server()
            .handle_text(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .await
            .unwrap();
        assert!(out["id"].is_null());
        assert_eq!(out["result"], json!({}));
    }

    #[tokio::test]
    async fn handle_text_empty_batch() {
        let out = server().handle_text("[]").await.unwrap();
        assert_eq!(out["error"]["code"], INVALID_REQUEST);
    }
}
