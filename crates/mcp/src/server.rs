//! The MCP tool server: JSON-RPC over SSE.
//!
//! Clients open `GET /mcp/sse` and receive an `endpoint` event naming the
//! message URL, then POST JSON-RPC requests to `/mcp/messages`. Every
//! response is broadcast to all connected SSE streams; each request is
//! acknowledged immediately with 202 and answered asynchronously, which is
//! the handshake shape MCP clients expect from an SSE transport.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use streamgate_core::ToolRegistry;

use crate::context::McpContext;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};

/// Per-client outbound queue depth. A client that stops reading loses
/// messages rather than backing up the broadcaster.
const CLIENT_QUEUE: usize = 200;

/// Delay before answering a POSTed request over the SSE channel. Gives the
/// client time to finish wiring up its stream after the 202.
const RESPONSE_DELAY: Duration = Duration::from_millis(50);

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    context: Arc<McpContext>,
    subscribers: Mutex<Vec<mpsc::Sender<String>>>,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, context: Arc<McpContext>) -> Self {
        Self {
            registry,
            context,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new SSE client and hand back its receiving end.
    fn subscribe(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
            info!(clients = subs.len(), "MCP client connected");
        }
        rx
    }

    /// Send a serialized response to every connected client. Closed clients
    /// are pruned; a full queue drops the message for that client only.
    fn broadcast(&self, payload: &str) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        subs.retain(|tx| match tx.try_send(payload.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("MCP client queue full, dropping message");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Dispatch one JSON-RPC request. Notifications produce no response.
    pub async fn build_response(&self, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %req.method, "MCP request");
        match req.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(
                req.id.clone(),
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {"listChanged": false}
                    },
                    "serverInfo": {
                        "name": "streamgate-tools",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )),
            "tools/list" => Some(JsonRpcResponse::success(
                req.id.clone(),
                json!({"tools": self.registry.definitions()}),
            )),
            "tools/call" => Some(self.handle_tool_call(req).await),
            "ping" => Some(JsonRpcResponse::success(req.id.clone(), json!({}))),
            m if m.starts_with("notifications/") => None,
            m => Some(JsonRpcResponse::failure(
                req.id.clone(),
                -32601,
                format!("Method not found: {m}"),
            )),
        }
    }

    async fn handle_tool_call(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(name) = req.params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(req.id.clone(), -32602, "Missing tool name");
        };
        let arguments = match req.params.get("arguments") {
            Some(Value::Null) | None => String::new(),
            Some(v) => v.to_string(),
        };

        let ctx = self.context.tool_context();
        info!(tool = name, user = %ctx.user_id, "MCP tool call");
        match self.registry.execute(name, &arguments, &ctx).await {
            Ok(result) => JsonRpcResponse::success(
                req.id.clone(),
                json!({
                    "content": [{"type": "text", "text": result}]
                }),
            ),
            Err(e) => JsonRpcResponse::success(
                req.id.clone(),
                json!({
                    "content": [{"type": "text", "text": format!("Error: {e}")}],
                    "isError": true
                }),
            ),
        }
    }
}

/// Routes for mounting under the gateway router.
pub fn mcp_router(server: Arc<McpServer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/mcp/sse", get(sse_handler).post(sse_handler))
        .route("/mcp/messages", post(messages_handler))
        .layer(cors)
        .with_state(server)
}

/// Open an SSE stream. The first event advertises the message endpoint;
/// some clients POST their `initialize` request in the body of this very
/// call, so a parseable body is answered inline over the new stream.
async fn sse_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: String,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let endpoint = format!("http://{host}/mcp/messages");

    let rx = server.subscribe();

    if !body.trim().is_empty() {
        if let Ok(req) = serde_json::from_str::<JsonRpcRequest>(&body) {
            if let Some(resp) = server.build_response(&req).await {
                if let Ok(data) = serde_json::to_string(&resp) {
                    server.broadcast(&data);
                }
            }
        }
    }

    let advertisement =
        futures::stream::once(async move { Ok(SseEvent::default().event("endpoint").data(endpoint)) });
    let messages = ReceiverStream::new(rx).map(|data| Ok(SseEvent::default().data(data)));

    Sse::new(advertisement.chain(messages))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Accept a JSON-RPC request and answer it over the SSE channel.
async fn messages_handler(
    State(server): State<Arc<McpServer>>,
    body: String,
) -> impl IntoResponse {
    let req = match serde_json::from_str::<JsonRpcRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "Unparseable MCP message");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid JSON-RPC request"})),
            );
        }
    };

    tokio::spawn(async move {
        tokio::time::sleep(RESPONSE_DELAY).await;
        if let Some(resp) = server.build_response(&req).await {
            if let Ok(data) = serde_json::to_string(&resp) {
                server.broadcast(&data);
            }
        }
    });

    (StatusCode::ACCEPTED, Json(json!({"status": "accepted"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use streamgate_core::{Tool, ToolContext, ToolError, UserPolicy};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(
            &self,
            arguments: Value,
            _ctx: &ToolContext,
        ) -> Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    fn test_server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        McpServer::new(Arc::new(registry), Arc::new(McpContext::new()))
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server() {
        let server = test_server();
        let resp = server
            .build_response(&request("initialize", json!({})))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(result["serverInfo"]["name"], "streamgate-tools");
    }

    #[tokio::test]
    async fn tools_list_includes_registered_tools() {
        let server = test_server();
        let resp = server
            .build_response(&request("tools/list", json!({})))
            .await
            .unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_wraps_result_as_text_content() {
        let server = test_server();
        let resp = server
            .build_response(&request(
                "tools/call",
                json!({"name": "echo", "arguments": {"text": "hi"}}),
            ))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "hi");
        assert!(result.get("isError").is_none());
    }

    #[tokio::test]
    async fn failed_tool_call_sets_is_error() {
        let server = test_server();
        let resp = server
            .build_response(&request(
                "tools/call",
                json!({"name": "missing", "arguments": {}}),
            ))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error:"));
    }

    #[tokio::test]
    async fn tool_call_without_name_is_invalid_params() {
        let server = test_server();
        let resp = server
            .build_response(&request("tools/call", json!({"arguments": {}})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn disabled_tool_reports_error_content() {
        let server = test_server();
        server.context.set(
            "u1",
            UserPolicy {
                disabled_tools: vec!["echo".into()],
                ..Default::default()
            },
        );
        let resp = server
            .build_response(&request(
                "tools/call",
                json!({"name": "echo", "arguments": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.result.unwrap()["isError"], true);
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let server = test_server();
        let resp = server
            .build_response(&request("ping", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn notifications_are_silent() {
        let server = test_server();
        let req: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .unwrap();
        assert!(server.build_response(&req).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let server = test_server();
        let resp = server
            .build_response(&request("resources/list", json!({})))
            .await
            .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("resources/list"));
    }

    #[tokio::test]
    async fn broadcast_prunes_closed_clients() {
        let server = test_server();
        let rx = server.subscribe();
        drop(rx);
        let mut live = server.subscribe();

        server.broadcast("hello");
        assert_eq!(live.recv().await.unwrap(), "hello");
        assert_eq!(server.subscribers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_message_and_keeps_client() {
        let server = test_server();
        let mut rx = server.subscribe();

        // Saturate the unread client's queue, then send one more.
        for i in 0..CLIENT_QUEUE {
            server.broadcast(&format!("m{i}"));
        }
        server.broadcast("overflow");

        // The client stays subscribed, only the overflow message is lost.
        assert_eq!(server.subscribers.lock().unwrap().len(), 1);
        for i in 0..CLIENT_QUEUE {
            assert_eq!(rx.recv().await.unwrap(), format!("m{i}"));
        }
        assert!(rx.try_recv().is_err());

        // Draining frees the queue for later broadcasts.
        server.broadcast("after");
        assert_eq!(rx.recv().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn messages_endpoint_acknowledges_with_202() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let app = mcp_router(Arc::new(test_server()));
        let req = Request::builder()
            .method("POST")
            .uri("/mcp/messages")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#,
            ))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
