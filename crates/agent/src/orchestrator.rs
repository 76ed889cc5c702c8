//! The chat turn orchestrator.
//!
//! One request may span several upstream turns: the model's stream is
//! watched by the detector, a captured tool call is executed, and the
//! result is fed back as a synthetic turn until the model answers in plain
//! text or the turn bound is hit. Upstream frames pass through to the
//! client verbatim; the orchestrator only injects synthetic tool-call
//! events and gateway-authored content chunks around them.

use crate::correction::{flags_missed_tool_call, flags_suspicious_buffer};
use crate::detector::{DetectedCall, DetectorOutput, FinishOutput, StreamDetector};
use crate::learner::{PatternLearner, PatternStore};
use crate::prompts;
use serde_json::{json, Value};
use std::sync::Arc;
use streamgate_core::{ChatMessage, ClientEvent, ToolContext, ToolRegistry, UpstreamError, UserPolicy};
use streamgate_memory::{log_chat_turn, MemoryStore};
use streamgate_upstream::{UpstreamClient, UpstreamMode};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct OrchestratorOptions {
    pub mode: UpstreamMode,
    pub max_turns: usize,
    pub history_keep: usize,
    pub buffer_threshold: usize,
    pub enable_mcp: bool,
    /// Integration name advertised to the upstream server, without the
    /// `mcp/` prefix.
    pub integration_id: String,
    /// Cap on preloaded memory characters in the system prompt.
    pub preload_char_limit: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            mode: UpstreamMode::Standard,
            max_turns: 10,
            history_keep: 10,
            buffer_threshold: 8000,
            enable_mcp: true,
            integration_id: "streamgate-tools".into(),
            preload_char_limit: 10_000,
        }
    }
}

/// Per-request identity and policy.
#[derive(Clone, Default)]
pub struct RequestScope {
    pub user_id: String,
    pub policy: UserPolicy,
}

pub struct ChatOrchestrator {
    upstream: UpstreamClient,
    registry: Arc<ToolRegistry>,
    store: Arc<MemoryStore>,
    patterns: Arc<PatternStore>,
    options: OrchestratorOptions,
}

impl ChatOrchestrator {
    pub fn new(
        upstream: UpstreamClient,
        registry: Arc<ToolRegistry>,
        store: Arc<MemoryStore>,
        patterns: Arc<PatternStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            upstream,
            registry,
            store,
            patterns,
            options,
        }
    }

    /// Run one chat request to completion, emitting client events on `tx`.
    /// All failures are reported into the stream; the SSE response is
    /// already underway when this runs.
    pub async fn run(&self, mut body: Value, scope: RequestScope, tx: Sender<ClientEvent>) {
        let model = body["model"].as_str().unwrap_or_default().to_string();
        let messages_for_memory = extract_chat_messages(&body);

        self.prepare_body(&mut body, &scope);

        let tool_ctx = ToolContext::for_user(scope.user_id.clone(), scope.policy.clone());
        let integration = format!("mcp/{}", self.options.integration_id);

        let mut full_response = String::new();
        let mut memory_logged = false;
        let mut needs_correction = false;
        let mut bad_content = String::new();
        let mut last_response_id = String::new();

        for turn in 0..self.options.max_turns {
            let mut rx = match self.upstream.stream_chat(self.options.mode, &body).await {
                Ok(rx) => rx,
                Err(e) => {
                    self.emit_upstream_error(&tx, &e).await;
                    return;
                }
            };

            let learned = self.patterns.matcher(&model);
            let mut detector = StreamDetector::new(self.options.buffer_threshold, learned);
            let mut call: Option<DetectedCall> = None;
            let mut turn_ended = false;

            while let Some(frame_result) = rx.recv().await {
                let frame = match frame_result {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "Stream interrupted");
                        let _ = tx
                            .send(ClientEvent::content_chunk(&format!("\n[{e}]")))
                            .await;
                        break;
                    }
                };

                if frame.done {
                    turn_ended = true;
                    // A call captured mid-stream already emptied the detector;
                    // finishing would discard it and end the loop early.
                    if call.is_none() {
                        call = self.finish_turn(&mut detector, &tx, &mut full_response, &model,
                            &mut needs_correction, &mut bad_content).await;
                    }
                    if call.is_none() {
                        if tx.send(ClientEvent::Done).await.is_err() {
                            return;
                        }
                        self.maybe_log_memory(
                            &scope, &messages_for_memory, &full_response, &model,
                            &mut memory_logged,
                        );
                    }
                    break;
                }

                // Typed-event dialect: forward everything, watch deltas and ends.
                if let Some(event_type) = frame.event_type.as_deref() {
                    if event_type == "message.delta" {
                        if let Some(content) = &frame.content {
                            full_response.push_str(content);
                            if detector.encoding().is_none() && flags_missed_tool_call(content) {
                                needs_correction = true;
                                bad_content = content.clone();
                            }
                        }
                    } else if event_type == "chat.end" || event_type == "message.end" {
                        if let Some(rid) = &frame.response_id {
                            debug!(response_id = %rid, "Captured response id for chaining");
                            last_response_id = rid.clone();
                        }
                        turn_ended = true;
                        self.maybe_log_memory(
                            &scope, &messages_for_memory, &full_response, &model,
                            &mut memory_logged,
                        );
                    }
                    if tx.send(ClientEvent::Raw(frame.data)).await.is_err() {
                        return;
                    }
                    continue;
                }

                let Some(content) = frame.content.clone() else {
                    if tx.send(ClientEvent::Raw(frame.data)).await.is_err() {
                        return;
                    }
                    continue;
                };

                match detector.feed(&content) {
                    DetectorOutput::Forward => {
                        full_response.push_str(&content);
                        if detector.encoding().is_none() && flags_missed_tool_call(&content) {
                            needs_correction = true;
                            bad_content = content;
                        }
                        if tx.send(ClientEvent::Raw(frame.data)).await.is_err() {
                            return;
                        }
                    }
                    DetectorOutput::Buffered => {}
                    DetectorOutput::Flush(text) => {
                        full_response.push_str(&text);
                        self.handle_flush(&text, &model, &mut needs_correction, &mut bad_content);
                        if tx.send(ClientEvent::content_chunk(&text)).await.is_err() {
                            return;
                        }
                    }
                    DetectorOutput::Call(c) => {
                        self.emit_call_events(&tx, &c).await;
                        call = Some(c);
                    }
                }
            }

            // Stream closed without an end frame: resolve leftovers the same
            // way a done sentinel would.
            if call.is_none() && !turn_ended {
                call = self.finish_turn(&mut detector, &tx, &mut full_response, &model,
                    &mut needs_correction, &mut bad_content).await;
            }

            let Some(call) = call else {
                break;
            };

            info!(turn, tool = %call.name, "Executing detected tool call");
            let result = match self
                .registry
                .execute(&call.name, &call.arguments_json, &tool_ctx)
                .await
            {
                Ok(result) => {
                    let _ = tx.send(ClientEvent::tool_call_success(&call.name)).await;
                    result
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    let _ = tx
                        .send(ClientEvent::tool_call_failure(&call.name, &e.to_string()))
                        .await;
                    format!("Error executing tool {}: {e}", call.name)
                }
            };

            body = self.followup_body(&body, &model, &call, &result, &last_response_id);
            if self.options.enable_mcp && self.options.mode != UpstreamMode::Standard {
                ensure_integration(&mut body, &integration);
            }
        }

        if needs_correction && !bad_content.is_empty() {
            self.run_correction(&body, &model, &full_response, &bad_content, &last_response_id, &integration, &tx)
                .await;
        }

        if !memory_logged {
            self.maybe_log_memory(
                &scope, &messages_for_memory, &full_response, &model, &mut memory_logged,
            );
        }
    }

    /// End-of-turn detector resolution: emit a structured call or flush the
    /// leftover buffer as content.
    async fn finish_turn(
        &self,
        detector: &mut StreamDetector,
        tx: &Sender<ClientEvent>,
        full_response: &mut String,
        model: &str,
        needs_correction: &mut bool,
        bad_content: &mut String,
    ) -> Option<DetectedCall> {
        match detector.finish() {
            FinishOutput::None => None,
            FinishOutput::Flush(text) => {
                full_response.push_str(&text);
                self.handle_flush(&text, model, needs_correction, bad_content);
                let _ = tx.send(ClientEvent::content_chunk(&text)).await;
                None
            }
            FinishOutput::Call(call) => {
                self.emit_call_events(tx, &call).await;
                Some(call)
            }
        }
    }

    /// A flushed buffer that still looks tool-ish flags the correction pass
    /// and feeds the self-evolution learner.
    fn handle_flush(
        &self,
        text: &str,
        model: &str,
        needs_correction: &mut bool,
        bad_content: &mut String,
    ) {
        if !flags_suspicious_buffer(text) {
            return;
        }
        *needs_correction = true;
        *bad_content = text.to_string();

        if !model.is_empty() && self.patterns.get(model).is_none() {
            let learner = PatternLearner::new(self.patterns.clone(), self.upstream.clone());
            let model = model.to_string();
            let sample = text.to_string();
            tokio::spawn(async move {
                learner.learn(&model, &sample).await;
            });
        }
    }

    async fn emit_call_events(&self, tx: &Sender<ClientEvent>, call: &DetectedCall) {
        let _ = tx.send(ClientEvent::tool_call_start(&call.name)).await;
        let arguments = call
            .arguments
            .clone()
            .unwrap_or_else(|| Value::String(call.arguments_json.clone()));
        let _ = tx
            .send(ClientEvent::tool_call_arguments(&call.name, &arguments))
            .await;
    }

    /// Build the next turn's request carrying the tool result back.
    fn followup_body(
        &self,
        body: &Value,
        model: &str,
        call: &DetectedCall,
        result: &str,
        last_response_id: &str,
    ) -> Value {
        let result_line = format!("Tool Result ({}): {}", call.name, result);
        if self.options.mode == UpstreamMode::Stateful {
            if last_response_id.is_empty() {
                warn!("No response id captured, stateful chaining may break");
            }
            return json!({
                "model": model,
                "input": result_line,
                "previous_response_id": last_response_id,
                "stream": true,
            });
        }

        // Standard mode: replay the call as an assistant turn, then the
        // result as a user turn.
        let mut next = body.clone();
        let assistant_turn = json!({
            "name": call.name,
            "arguments": call.arguments.clone().unwrap_or_else(|| json!({})),
        })
        .to_string();
        if let Some(messages) = next["messages"].as_array_mut() {
            messages.push(json!({"role": "assistant", "content": assistant_turn}));
            messages.push(json!({"role": "user", "content": result_line}));
        }
        next
    }

    /// One corrective follow-up at low temperature, streamed through as-is.
    async fn run_correction(
        &self,
        body: &Value,
        model: &str,
        full_response: &str,
        bad_content: &str,
        last_response_id: &str,
        integration: &str,
        tx: &Sender<ClientEvent>,
    ) {
        info!("Triggering self-correction for invalid tool format");
        let prompt = prompts::self_correction_prompt(bad_content);

        let mut request = if self.options.mode == UpstreamMode::Stateful {
            let mut req = json!({
                "model": model,
                "input": prompt,
                "stream": true,
                "temperature": 0.1,
            });
            let parent = if !last_response_id.is_empty() {
                last_response_id.to_string()
            } else {
                body["previous_response_id"].as_str().unwrap_or_default().to_string()
            };
            if !parent.is_empty() {
                req["previous_response_id"] = Value::String(parent);
            }
            req
        } else {
            let mut messages = body["messages"].as_array().cloned().unwrap_or_default();
            messages.push(json!({"role": "assistant", "content": full_response}));
            messages.push(json!({"role": "system", "content": prompt}));
            json!({
                "model": model,
                "messages": messages,
                "stream": true,
                "temperature": 0.1,
            })
        };
        if self.options.enable_mcp && self.options.mode != UpstreamMode::Standard {
            ensure_integration(&mut request, integration);
        }

        let mut rx = match self.upstream.stream_chat(self.options.mode, &request).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Self-correction request failed");
                return;
            }
        };
        while let Some(frame_result) = rx.recv().await {
            let Ok(frame) = frame_result else {
                return;
            };
            let event = if frame.done {
                ClientEvent::Done
            } else {
                ClientEvent::Raw(frame.data)
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }

    fn maybe_log_memory(
        &self,
        scope: &RequestScope,
        messages: &[ChatMessage],
        full_response: &str,
        model: &str,
        memory_logged: &mut bool,
    ) {
        if *memory_logged
            || !scope.policy.memory_enabled
            || messages.is_empty()
            || full_response.is_empty()
        {
            return;
        }
        debug!(user = %scope.user_id, "Logging chat turn to memory");
        if let Err(e) = log_chat_turn(&self.store, &scope.user_id, messages, full_response, model)
        {
            warn!(user = %scope.user_id, error = %e, "Failed to log chat turn");
        } else {
            *memory_logged = true;
        }
    }

    /// First-turn request preparation: history truncation, guideline and
    /// memory injection, integration advertisement. Standard mode is left
    /// untouched; a follow-up stateful turn (carrying a response id) skips
    /// the prompt injection its thread already holds.
    fn prepare_body(&self, body: &mut Value, scope: &RequestScope) {
        if !self.options.enable_mcp || self.options.mode == UpstreamMode::Standard {
            debug!("Request injection skipped");
            return;
        }

        ensure_integration(body, &format!("mcp/{}", self.options.integration_id));

        let is_stateful_turn = body["previous_response_id"]
            .as_str()
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if is_stateful_turn {
            debug!("Follow-up stateful turn, skipping prompt injection");
            return;
        }

        let mut extra = prompts::tool_usage_guidelines(&environment_info());
        if scope.policy.memory_enabled {
            let summary = self.store.prompt_summary(&scope.user_id);
            if !summary.is_empty() {
                let capped: String = summary
                    .chars()
                    .take(self.options.preload_char_limit)
                    .collect();
                extra.push_str(&prompts::memory_context(&capped));
            }
        }

        if let Some(messages) = body["messages"].as_array_mut() {
            truncate_messages(messages, self.options.history_keep);
        }
        inject_system_extra(body, &extra);
    }

    async fn emit_upstream_error(&self, tx: &Sender<ClientEvent>, error: &UpstreamError) {
        let text = match error.client_marker() {
            Some(marker) => format!("{marker} {error}"),
            None => format!("Upstream error: {error}"),
        };
        let _ = tx.send(ClientEvent::content_chunk(&text)).await;
        let _ = tx.send(ClientEvent::Done).await;
    }
}

/// Paths the tools can reach, stated so the model asks for real locations.
fn environment_info() -> String {
    let mut info = String::new();
    if let Ok(cwd) = std::env::current_dir() {
        info.push_str(&format!("- Current Working Directory: {}\n", cwd.display()));
    }
    if let Ok(home) = std::env::var("HOME") {
        info.push_str(&format!("- Desktop Path: {home}/Desktop\n"));
    }
    info
}

/// Sliding history window. A leading system message survives truncation.
fn truncate_messages(messages: &mut Vec<Value>, keep: usize) {
    if messages.len() <= keep {
        return;
    }
    debug!(from = messages.len(), to = keep, "Truncating chat history");
    let system = messages
        .first()
        .filter(|m| m["role"].as_str() == Some("system"))
        .cloned();
    let tail: Vec<Value> = messages[messages.len() - keep..].to_vec();
    let mut result = Vec::with_capacity(keep + 1);
    if let Some(system) = system {
        if tail.first().map(|m| m["role"].as_str()) != Some(Some("system")) {
            result.push(system);
        }
    }
    result.extend(tail);
    *messages = result;
}

/// Append `extra` to the system prompt, wherever this body keeps it. The
/// guideline marker prevents double injection. Returns whether a system
/// slot was found or created.
fn inject_system_extra(body: &mut Value, extra: &str) -> bool {
    // Standard shape: a messages array with an optional system entry.
    if let Some(messages) = body["messages"].as_array_mut() {
        for message in messages.iter_mut() {
            if message["role"].as_str() == Some("system") {
                let content = message["content"].as_str().unwrap_or_default();
                if !content.contains(prompts::GUIDELINE_MARKER) {
                    message["content"] = Value::String(format!("{content}{extra}"));
                }
                return true;
            }
        }
        messages.insert(
            0,
            json!({
                "role": "system",
                "content": format!("You are a helpful assistant.{extra}"),
            }),
        );
        return true;
    }

    // Stateful shape: a flat system_prompt field.
    if let Some(sp) = body["system_prompt"].as_str() {
        if !sp.contains(prompts::GUIDELINE_MARKER) {
            body["system_prompt"] = Value::String(format!("{sp}{extra}"));
        }
        return true;
    }
    false
}

/// Add an integration id to the request, deduplicated.
fn ensure_integration(body: &mut Value, integration: &str) {
    let existing = body["integrations"].as_array().cloned().unwrap_or_default();
    if existing.iter().any(|v| v.as_str() == Some(integration)) {
        return;
    }
    let mut integrations = existing;
    integrations.push(Value::String(integration.to_string()));
    body["integrations"] = Value::Array(integrations);
}

/// Messages (or the stateful `input` field) as typed chat messages, for the
/// memory history log.
fn extract_chat_messages(body: &Value) -> Vec<ChatMessage> {
    if let Some(messages) = body["messages"].as_array() {
        return messages
            .iter()
            .filter_map(|m| {
                let role = m["role"].as_str()?;
                let content = m["content"].as_str()?;
                Some(ChatMessage {
                    role: role.to_string(),
                    content: content.to_string(),
                })
            })
            .collect();
    }
    if let Some(input) = body["input"].as_str() {
        if !input.is_empty() {
            return vec![ChatMessage::user(input)];
        }
    }
    Vec::new()
}
