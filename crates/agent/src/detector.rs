//! Stream pattern detector.
//!
//! Local models emit tool calls as plain text in several encodings. The
//! detector watches the content stream, switches into buffering mode when a
//! trigger appears, and reports a parsed call once the active matcher
//! captures both a name and an arguments group. The buffer is bounded; past
//! the threshold it is flushed back to the client as ordinary content.

use regex_lite::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

/// How far into the stream a bare `{` still counts as a possible
/// structured-output call.
const BARE_JSON_WINDOW: usize = 50;

/// Tool-call encodings the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `<|channel|>...<|message|>{...}` and `<|tool_code|>` prefixes.
    Channel,
    /// `<tool_call>{...}</tool_call>` tags.
    TagDelimited,
    /// A `{` within the first characters of the stream; resolved against the
    /// structured envelope at end of stream.
    BareJson,
    /// `{"tool_name": ..., "tool_arguments": ...}` envelope.
    Structured,
    /// A per-model regex produced by the self-evolution learner.
    Learned,
}

impl Encoding {
    fn matcher(self) -> Option<&'static str> {
        match self {
            Encoding::TagDelimited => Some(r"(?s)(<tool_call>)\s*(\{[\s\S]*?\})\s*</tool_call>"),
            Encoding::Channel => Some(r"(?s)(<\|channel\|>.*?<\|message\|>)\s*(\{[\s\S]*\})"),
            _ => None,
        }
    }
}

/// A tool call recovered from stream text.
#[derive(Debug, Clone)]
pub struct DetectedCall {
    pub name: String,
    /// Raw arguments text as captured; may be invalid JSON, in which case
    /// execution will surface the error as a tool failure.
    pub arguments_json: String,
    /// Parsed arguments when the captured text was valid JSON.
    pub arguments: Option<Value>,
}

/// What the caller should do with the frame that was just fed in.
#[derive(Debug)]
pub enum DetectorOutput {
    /// Not a tool call so far; forward the frame to the client.
    Forward,
    /// Swallowed into the buffer; do not forward.
    Buffered,
    /// Buffer overflowed without a match; emit this text as a content chunk.
    Flush(String),
    /// A complete tool call was captured.
    Call(DetectedCall),
}

/// Outcome of the end-of-stream check.
#[derive(Debug)]
pub enum FinishOutput {
    None,
    /// Leftover buffered text to emit as a content chunk.
    Flush(String),
    Call(DetectedCall),
}

pub struct StreamDetector {
    threshold: usize,
    encoding: Option<Encoding>,
    matcher: Option<Regex>,
    buffering: bool,
    buffer: String,
    /// Characters seen so far this turn, buffered or forwarded.
    seen: usize,
}

impl StreamDetector {
    /// A detector with a learned per-model pattern starts buffering
    /// immediately; the learned matcher is tried exclusively.
    pub fn new(threshold: usize, learned: Option<Regex>) -> Self {
        let buffering = learned.is_some();
        let encoding = learned.as_ref().map(|_| Encoding::Learned);
        if buffering {
            info!("Custom tool parsing enabled from learned pattern");
        }
        Self {
            threshold,
            encoding,
            matcher: learned,
            buffering,
            buffer: String::new(),
            seen: 0,
        }
    }

    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Feed one content fragment from the stream.
    pub fn feed(&mut self, content: &str) -> DetectorOutput {
        if self.buffering {
            return self.feed_buffered(content);
        }

        // Structured output often begins with a bare brace right at the
        // start of the turn.
        if self.seen < BARE_JSON_WINDOW && content.trim_start().starts_with('{') {
            debug!("Potential JSON start detected, switching to buffering mode");
            self.start_buffering(Encoding::BareJson);
            return self.feed_buffered(content);
        }

        if content.contains("<tool_call>") {
            debug!("Tag-delimited tool call trigger detected");
            self.start_buffering(Encoding::TagDelimited);
            return self.feed_buffered(content);
        }
        if content.contains("<|channel|>") || content.contains("<|tool_code|>") {
            debug!("Channel-style tool call trigger detected");
            self.start_buffering(Encoding::Channel);
            return self.feed_buffered(content);
        }

        self.seen += content.len();
        DetectorOutput::Forward
    }

    /// End-of-stream: resolve the structured envelope or flush what is left.
    pub fn finish(&mut self) -> FinishOutput {
        if self.buffer.is_empty() {
            return FinishOutput::None;
        }
        let buffer = std::mem::take(&mut self.buffer);
        self.buffering = false;

        if let Some(call) = parse_structured(&buffer) {
            info!(tool = %call.name, "Structured JSON tool call detected");
            self.encoding = Some(Encoding::Structured);
            return FinishOutput::Call(call);
        }
        debug!(chars = buffer.len(), "Final buffer flush at stream end");
        FinishOutput::Flush(buffer)
    }

    /// Switch into buffering mode. The triggering content itself still goes
    /// through [`Self::feed_buffered`] so a call completed in a single chunk
    /// matches immediately.
    fn start_buffering(&mut self, encoding: Encoding) {
        self.buffering = true;
        self.encoding = Some(encoding);
        self.buffer.clear();
        self.matcher = encoding.matcher().and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "Builtin matcher failed to compile");
                None
            }
        });
    }

    fn feed_buffered(&mut self, content: &str) -> DetectorOutput {
        self.buffer.push_str(content);

        if let Some(matcher) = &self.matcher {
            if let Some(caps) = matcher.captures(&self.buffer) {
                if let (Some(g1), Some(g2)) = (caps.get(1), caps.get(2)) {
                    let call = extract_call(g1.as_str(), g2.as_str());
                    info!(tool = %call.name, "Tool call pattern matched");
                    self.buffer.clear();
                    self.buffering = false;
                    return DetectorOutput::Call(call);
                }
            }
        }

        if self.buffer.len() > self.threshold {
            let flushed = std::mem::take(&mut self.buffer);
            self.seen += flushed.len();
            debug!(chars = flushed.len(), "Buffer threshold exceeded, flushing as content");
            return DetectorOutput::Flush(flushed);
        }
        DetectorOutput::Buffered
    }
}

/// Build a call from the two capture groups, resolving channel-prefix names
/// and unwrapping `{name, arguments}` wrapper objects.
fn extract_call(group1: &str, group2: &str) -> DetectedCall {
    let mut name = group1.to_string();

    // Channel prefixes carry the target as "to=NAME".
    if name.contains("<|channel|>") {
        if let Ok(re) = Regex::new(r"to=([a-zA-Z0-9_]+)") {
            if let Some(caps) = re.captures(&name) {
                if let Some(m) = caps.get(1) {
                    name = m.as_str().to_string();
                }
            }
        }
    }

    let parsed: Option<Value> = serde_json::from_str(group2).ok();

    // Wrapper shape: the JSON itself names the tool.
    if let Some(obj) = parsed.as_ref() {
        let wrapper_name = obj["name"].as_str().unwrap_or("");
        if !wrapper_name.is_empty() && !obj["arguments"].is_null() {
            let arguments = obj["arguments"].clone();
            return DetectedCall {
                name: wrapper_name.to_string(),
                arguments_json: arguments.to_string(),
                arguments: Some(arguments),
            };
        }
    }

    DetectedCall {
        name,
        arguments_json: group2.to_string(),
        arguments: parsed,
    }
}

/// The structured-output envelope some models emit instead of tags:
/// `{"thought": ..., "tool_name": ..., "tool_arguments": {...}}`.
fn parse_structured(buffer: &str) -> Option<DetectedCall> {
    let trimmed = buffer.trim();
    if !trimmed.starts_with('{') || !trimmed.contains("\"tool_name\"") {
        return None;
    }
    let json: Value = serde_json::from_str(trimmed).ok()?;
    let name = json["tool_name"].as_str()?;
    if name.is_empty() {
        return None;
    }
    let arguments = json["tool_arguments"].clone();
    let arguments_json = if arguments.is_null() {
        "{}".to_string()
    } else {
        arguments.to_string()
    };
    Some(DetectedCall {
        name: name.to_string(),
        arguments_json,
        arguments: Some(arguments),
    })
}
