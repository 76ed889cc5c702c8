//! Client for the upstream OpenAI-compatible inference server.
//!
//! Two endpoint shapes are supported:
//! - standard: `POST /v1/chat/completions` with a `messages` array
//! - stateful: `POST /api/v1/chat` with `input` + `previous_response_id`,
//!   where the server keeps the conversation thread itself
//!
//! Streaming responses are read as SSE via `bytes_stream()` with manual
//! line buffering; each `data:` payload is forwarded raw alongside a
//! lightweight parse so the caller can buffer content without re-parsing.

mod frame;

pub use frame::StreamFrame;

use futures::StreamExt;
use serde_json::Value;
use streamgate_core::UpstreamError;
use tracing::{debug, warn};

/// Bearer token sent when the user configured none. Local inference
/// servers accept any token but reject a missing header.
pub const DEFAULT_TOKEN: &str = "local";

/// Which request shape the upstream server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    Standard,
    Stateful,
}

impl UpstreamMode {
    pub fn from_str(s: &str) -> Self {
        if s == "stateful" {
            UpstreamMode::Stateful
        } else {
            UpstreamMode::Standard
        }
    }
}

/// HTTP client for the upstream inference server.
#[derive(Clone)]
pub struct UpstreamClient {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl UpstreamClient {
    /// `endpoint` must already be normalized (no trailing `/` or `/v1`).
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            token,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bearer(&self) -> &str {
        self.token.as_deref().unwrap_or(DEFAULT_TOKEN)
    }

    /// Chat URL for the given mode.
    pub fn chat_url(&self, mode: UpstreamMode) -> String {
        match mode {
            UpstreamMode::Standard => format!("{}/v1/chat/completions", self.endpoint),
            UpstreamMode::Stateful => format!("{}/api/v1/chat", self.endpoint),
        }
    }

    /// Send a streaming chat request. The request body is forwarded as-is;
    /// the caller owns injection and truncation.
    ///
    /// Returns a channel of parsed SSE frames. Dropping the receiver cancels
    /// the upstream read.
    pub async fn stream_chat(
        &self,
        mode: UpstreamMode,
        body: &Value,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamFrame, UpstreamError>>, UpstreamError>
    {
        let url = self.chat_url(mode);
        debug!(%url, "Sending streaming chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bearer()))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Upstream returned error");
            return Err(classify_error(status, &error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(UpstreamError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = trimmed.strip_prefix("data: ") {
                        let frame = StreamFrame::parse(data.trim());
                        let done = frame.done;
                        if tx.send(Ok(frame)).await.is_err() {
                            return; // receiver dropped, cancel the read
                        }
                        if done {
                            return;
                        }
                    }
                    // Non-data lines (event: ...) carry no payload we need;
                    // the frame parser recovers event types from the data body.
                }
            }
        });

        Ok(rx)
    }

    /// Non-streaming chat completion. Used by the pattern learner and the
    /// memory pipelines, which always speak the standard endpoint shape.
    pub async fn complete(&self, body: &Value) -> Result<String, UpstreamError> {
        let url = self.chat_url(UpstreamMode::Standard);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bearer()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &error_body));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(UpstreamError::NoChoices)
    }

    /// Fetch the raw `/v1/models` body for proxying.
    pub async fn list_models_raw(&self) -> Result<String, UpstreamError> {
        let url = format!("{}/v1/models", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.bearer()))
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        if status != 200 {
            return Err(classify_error(status, &body));
        }
        Ok(body)
    }

    /// Whether the upstream server answers at all.
    pub async fn reachable(&self) -> bool {
        let url = format!("{}/v1/models", self.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Map an upstream error response onto a distinct error class.
///
/// Auth failures, tool-integration denials, and context overflows each get
/// their own variant so the gateway can emit the matching client marker.
pub fn classify_error(status: u16, body: &str) -> UpstreamError {
    if status == 401 || body.contains("invalid_api_key") || body.contains("Malformed") {
        return UpstreamError::AuthenticationFailed(body.to_string());
    }
    if status == 403 && body.contains("Permission denied to use plugin") {
        return UpstreamError::IntegrationDenied(body.to_string());
    }
    if body.contains("Context size has been exceeded") || body.contains("context_length_exceeded")
    {
        return UpstreamError::ContextLengthExceeded(
            "Context limit reached. Please clear the chat and try again.".to_string(),
        );
    }
    UpstreamError::ApiError {
        status_code: status,
        message: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_per_mode() {
        let c = UpstreamClient::new("http://localhost:1234", None);
        assert_eq!(
            c.chat_url(UpstreamMode::Standard),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            c.chat_url(UpstreamMode::Stateful),
            "http://localhost:1234/api/v1/chat"
        );
    }

    #[test]
    fn classify_auth_error() {
        let err = classify_error(401, "bad key");
        assert!(matches!(err, UpstreamError::AuthenticationFailed(_)));
        // Some servers report bad keys with a 400 and a body marker.
        let err = classify_error(400, r#"{"error":{"code":"invalid_api_key"}}"#);
        assert!(matches!(err, UpstreamError::AuthenticationFailed(_)));
    }

    #[test]
    fn classify_integration_denied() {
        let err = classify_error(403, "Permission denied to use plugin xyz");
        assert!(matches!(err, UpstreamError::IntegrationDenied(_)));
        // A plain 403 without the plugin marker is not an integration denial.
        let err = classify_error(403, "forbidden");
        assert!(matches!(err, UpstreamError::ApiError { .. }));
    }

    #[test]
    fn classify_context_overflow() {
        let err = classify_error(400, "Context size has been exceeded");
        assert!(matches!(err, UpstreamError::ContextLengthExceeded(_)));
        let err = classify_error(500, "context_length_exceeded");
        assert!(matches!(err, UpstreamError::ContextLengthExceeded(_)));
    }

    #[test]
    fn classify_generic_error() {
        let err = classify_error(500, "boom");
        assert!(matches!(
            err,
            UpstreamError::ApiError {
                status_code: 500,
                ..
            }
        ));
    }

    #[test]
    fn default_bearer_when_no_token() {
        let c = UpstreamClient::new("http://x", None);
        assert_eq!(c.bearer(), DEFAULT_TOKEN);
        let c = UpstreamClient::new("http://x", Some("abc".into()));
        assert_eq!(c.bearer(), "abc");
    }

    #[test]
    fn mode_from_str() {
        assert_eq!(UpstreamMode::from_str("stateful"), UpstreamMode::Stateful);
        assert_eq!(UpstreamMode::from_str("standard"), UpstreamMode::Standard);
        assert_eq!(UpstreamMode::from_str("anything"), UpstreamMode::Standard);
    }
}
