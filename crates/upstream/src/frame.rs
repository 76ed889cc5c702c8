//! SSE frame parsing.
//!
//! Upstream servers emit two dialects: standard OpenAI chunks
//! (`choices[].delta`) and a custom typed-event format
//! (`{"type":"message.delta","content":...}`, `chat.end`, ...). A frame
//! keeps the raw payload for verbatim passthrough plus the few fields the
//! orchestrator actually inspects.

use serde_json::Value;

/// One parsed `data:` payload from the upstream SSE stream.
#[derive(Debug, Clone)]
pub struct StreamFrame {
    /// The payload string after `data: `, unmodified.
    pub data: String,
    /// Text content carried by this frame, whichever field it arrived in.
    pub content: Option<String>,
    /// Event type for typed-event frames (`message.delta`, `chat.end`, ...).
    pub event_type: Option<String>,
    /// Response id from a `chat.end` frame, used for stateful chaining.
    pub response_id: Option<String>,
    /// True for the `[DONE]` sentinel.
    pub done: bool,
}

impl StreamFrame {
    pub fn parse(data: &str) -> Self {
        if data == "[DONE]" {
            return Self {
                data: data.to_string(),
                content: None,
                event_type: None,
                response_id: None,
                done: true,
            };
        }

        let mut frame = Self {
            data: data.to_string(),
            content: None,
            event_type: None,
            response_id: None,
            done: false,
        };

        let Ok(json) = serde_json::from_str::<Value>(data) else {
            return frame;
        };

        if let Some(t) = json["type"].as_str() {
            frame.event_type = Some(t.to_string());
            if t == "message.delta" {
                frame.content = json["content"].as_str().map(String::from);
            } else if t == "chat.end" || t == "message.end" {
                frame.response_id = json["result"]["response_id"].as_str().map(String::from);
            }
            return frame;
        }

        frame.content = extract_delta_content(&json);
        frame
    }

    /// Whether this frame ends the model's turn (either dialect).
    pub fn is_end(&self) -> bool {
        self.done
            || matches!(
                self.event_type.as_deref(),
                Some("chat.end") | Some("message.end")
            )
    }
}

/// Extract content from an OpenAI-style chunk. Reasoning models put their
/// text in `reasoning_content` or `reasoning` instead of `content`, and
/// some non-streaming-shaped chunks use `message` instead of `delta`.
fn extract_delta_content(json: &Value) -> Option<String> {
    let choice = json["choices"].get(0)?;
    let delta = &choice["delta"];
    if delta.is_object() {
        for field in ["content", "reasoning_content", "reasoning"] {
            if let Some(c) = delta[field].as_str() {
                return Some(c.to_string());
            }
        }
        return None;
    }
    choice["message"]["content"].as_str().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_done_sentinel() {
        let f = StreamFrame::parse("[DONE]");
        assert!(f.done);
        assert!(f.is_end());
    }

    #[test]
    fn parse_standard_delta() {
        let f = StreamFrame::parse(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#);
        assert_eq!(f.content.as_deref(), Some("Hello"));
        assert!(!f.done);
        assert!(f.event_type.is_none());
    }

    #[test]
    fn parse_reasoning_delta() {
        let f = StreamFrame::parse(r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#);
        assert_eq!(f.content.as_deref(), Some("hmm"));
        let f = StreamFrame::parse(r#"{"choices":[{"delta":{"reasoning":"hmm2"}}]}"#);
        assert_eq!(f.content.as_deref(), Some("hmm2"));
    }

    #[test]
    fn parse_message_shaped_chunk() {
        let f = StreamFrame::parse(r#"{"choices":[{"message":{"content":"full"}}]}"#);
        assert_eq!(f.content.as_deref(), Some("full"));
    }

    #[test]
    fn parse_typed_message_delta() {
        let f = StreamFrame::parse(r#"{"type":"message.delta","content":"chunk"}"#);
        assert_eq!(f.event_type.as_deref(), Some("message.delta"));
        assert_eq!(f.content.as_deref(), Some("chunk"));
    }

    #[test]
    fn parse_chat_end_captures_response_id() {
        let f = StreamFrame::parse(r#"{"type":"chat.end","result":{"response_id":"resp_42"}}"#);
        assert_eq!(f.event_type.as_deref(), Some("chat.end"));
        assert_eq!(f.response_id.as_deref(), Some("resp_42"));
        assert!(f.is_end());
    }

    #[test]
    fn parse_garbage_is_passthrough() {
        let f = StreamFrame::parse("not json at all");
        assert_eq!(f.data, "not json at all");
        assert!(f.content.is_none());
        assert!(!f.done);
    }

    #[test]
    fn empty_delta_has_no_content() {
        let f = StreamFrame::parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(f.content.is_none());
    }
}
