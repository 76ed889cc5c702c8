//! Heuristics for spotting malformed tool calls in stream content.
//!
//! A fragment flags the turn for self-correction when it reads like an
//! attempted tool call that no pattern captured. Meta-content (the model
//! talking ABOUT tool calls or regexes rather than making one) is filtered
//! out, otherwise the correction pass recurses on its own prompt.

const TOOL_NAMES: &[&str] = &[
    "search_web",
    "personal_memory",
    "read_user_document",
    "read_web_page",
];

/// Whether a content fragment looks like a missed tool call worth a
/// corrective follow-up.
pub fn flags_missed_tool_call(content: &str) -> bool {
    if content.len() <= 5 {
        return false;
    }
    let lc = content.to_lowercase();

    let has_tool_name = TOOL_NAMES.iter().any(|n| lc.contains(n));
    let triggered = lc.contains("<|")
        || lc.contains("function")
        || lc.contains("tool")
        || lc.contains("execute")
        || has_tool_name
        || (lc.contains("{\"") && lc.contains("args"));
    if !triggered {
        return false;
    }

    if is_meta_content(&lc) {
        return false;
    }

    // A bare mention of "tool" or "function" without structure is just prose.
    lc.contains("<|") || (lc.contains('{') && lc.contains(':'))
}

/// Weaker check for a flushed buffer: the buffer already passed the
/// trigger-word gate by being buffered in the first place.
pub fn flags_suspicious_buffer(buffer: &str) -> bool {
    let lc = buffer.to_lowercase();
    (lc.contains("function") || lc.contains("call") || lc.contains("tool"))
        && lc.contains('{')
        && lc.contains('}')
}

/// Regex literals, code fences, and indexing syntax mean the model is
/// discussing tool calls, not making one.
fn is_meta_content(lc: &str) -> bool {
    lc.contains("(?s)")
        || lc.contains("regex")
        || lc.contains("tool_call[")
        || lc.contains("tool_call [")
        || lc.contains("```")
}
