//! Client-facing stream events.
//!
//! The turn orchestrator produces a stream of these; the gateway serializes
//! each one as an SSE `data:` frame. Upstream frames pass through verbatim,
//! synthetic tool-call events are injected around executions so the client
//! can render progress.

use serde_json::{json, Value};

/// One frame of the client-facing SSE stream.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A raw upstream `data:` payload, forwarded byte-for-byte.
    Raw(String),
    /// A synthetic JSON payload produced by the gateway itself.
    Json(Value),
    /// The terminal `[DONE]` sentinel.
    Done,
}

impl ClientEvent {
    /// The string placed after `data: ` on the wire.
    pub fn into_data(self) -> String {
        match self {
            ClientEvent::Raw(s) => s,
            ClientEvent::Json(v) => v.to_string(),
            ClientEvent::Done => "[DONE]".to_string(),
        }
    }

    /// A plain content chunk in OpenAI delta shape, used for gateway-authored
    /// text (error notices, flushed buffers).
    pub fn content_chunk(text: &str) -> Self {
        ClientEvent::Json(json!({
            "choices": [{"delta": {"content": text}}]
        }))
    }

    pub fn tool_call_start(tool: &str) -> Self {
        ClientEvent::Json(json!({"type": "tool_call.start", "tool": tool}))
    }

    pub fn tool_call_arguments(tool: &str, arguments: &Value) -> Self {
        ClientEvent::Json(json!({
            "type": "tool_call.arguments",
            "tool": tool,
            "arguments": arguments,
        }))
    }

    pub fn tool_call_success(tool: &str) -> Self {
        ClientEvent::Json(json!({"type": "tool_call.success", "tool": tool}))
    }

    pub fn tool_call_failure(tool: &str, reason: &str) -> Self {
        ClientEvent::Json(json!({
            "type": "tool_call.failure",
            "tool": tool,
            "reason": reason,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_passthrough_is_verbatim() {
        let payload = r#"{"choices":[{"delta":{"content":"hi"}}]}"#;
        assert_eq!(ClientEvent::Raw(payload.into()).into_data(), payload);
    }

    #[test]
    fn tool_events_carry_type_and_tool() {
        let data = ClientEvent::tool_call_start("search_web").into_data();
        let v: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(v["type"], "tool_call.start");
        assert_eq!(v["tool"], "search_web");
    }

    #[test]
    fn done_sentinel() {
        assert_eq!(ClientEvent::Done.into_data(), "[DONE]");
    }
}
