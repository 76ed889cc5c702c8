//! Prompt templates injected by the orchestrator.
//!
//! The guideline marker doubles as the dedup sentinel: a system prompt that
//! already contains it is never injected twice.

/// Marker string checked before injecting guidelines into a system prompt.
pub const GUIDELINE_MARKER: &str = "### TOOL CALL GUIDELINES ###";

/// Tool usage guidelines appended to the system prompt. Carries the current
/// time so the model does not need a tool call just to know the date.
pub fn tool_usage_guidelines(env_info: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %A");
    let mut prompt = format!(
        "\n\n{GUIDELINE_MARKER}\n\
         1. Use a SINGLE valid <tool_call> block for tool requests.\n\
         2. DO NOT use search_web or read_web_page for person identification or image description unless explicitly asked.\n\
         3. CURRENT_TIME: {now}"
    );
    if !env_info.is_empty() {
        prompt.push_str(&format!("\n4. ENVIRONMENT INFO:\n{env_info}"));
    }
    prompt
}

/// Memory block appended after the guidelines when memory is enabled.
/// The rules stop models from emitting their own save-memory tool calls;
/// persistence runs in the background worker.
pub fn memory_context(user_profile: &str) -> String {
    format!(
        "\n\n### MEMORY CONTEXT ###\n\
         \n\
         #### USER PROFILE (Persistent Long-Term Memory)\n\
         {user_profile}\n\
         \n\
         MEMORY PRIORITY ORDER:\n\
         1. User Profile\n\
         2. Current Conversation\n\
         \n\
         RULES:\n\
         - Do NOT modify or reinterpret the User Profile.\n\
         - Do NOT generate any tool call to save memory.\n\
         - Memory persistence is handled outside the model.\n\
         - Any attempt to manually save memory is considered an error.\n"
    )
}

/// Regex-synthesis prompt for the self-evolution learner.
pub fn evolution_prompt(sample_line: &str) -> String {
    format!(
        "You are an expert at Regular Expressions and LLM Tool Calling patterns.\n\
         I have a log from an LLM that appears to be a tool call, but my current parser missed it.\n\
         The sample content is: \"{sample_line}\"\n\
         \n\
         Please generate a single Regular Expression to capture:\n\
         - Group 1: The Tool Name (e.g., search_web, personal_memory)\n\
         - Group 2: The JSON Arguments or parameters block.\n\
         \n\
         REQUIREMENTS:\n\
         1. Return ONLY the regex string. Do not wrap in markdown or code blocks.\n\
         2. The regex must be robust (use (?s) if it spans multiple lines).\n\
         3. If no tool call found, return \"NONE\"."
    )
}

/// Corrective follow-up sent once when a model emits a malformed tool call.
/// The bad content is capped so the prompt stays small.
pub fn self_correction_prompt(bad_content: &str) -> String {
    let snippet: String = bad_content.chars().take(100).collect();
    format!(
        "SYSTEM ALERT: INVALID TOOL CALL FORMAT DETECTED.\n\
         \n\
         You MUST correct this immediately.\n\
         \n\
         If you output anything other than a single <tool_call> block, the request will fail.\n\
         \n\
         WRONG:\n\
         <tool_call>\n\
         name: search_web\n\
         query: test\n\
         </tool_call>\n\
         \n\
         CORRECT:\n\
         <tool_call>{{\"name\":\"search_web\",\"arguments\":{{\"query\":\"weather in Seoul\"}}}}</tool_call>\n\
         \n\
         Output ONLY the corrected <tool_call> block.\n\
         Do not apologize.\n\
         \n\
         DETECTED CONTENT:\n\
         {snippet}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guidelines_carry_marker_and_time() {
        let p = tool_usage_guidelines("");
        assert!(p.contains(GUIDELINE_MARKER));
        assert!(p.contains("CURRENT_TIME: "));
        assert!(!p.contains("ENVIRONMENT INFO"));
    }

    #[test]
    fn guidelines_include_env_info_when_present() {
        let p = tool_usage_guidelines("- Current Working Directory: /tmp\n");
        assert!(p.contains("4. ENVIRONMENT INFO:"));
        assert!(p.contains("/tmp"));
    }

    #[test]
    fn memory_context_forbids_manual_saves() {
        let p = memory_context("- name: Alice");
        assert!(p.contains("- name: Alice"));
        assert!(p.contains("Do NOT generate any tool call to save memory."));
    }

    #[test]
    fn evolution_prompt_embeds_sample() {
        let p = evolution_prompt("Function call: search_web({})");
        assert!(p.contains("Function call: search_web({})"));
        assert!(p.contains("return \"NONE\""));
    }

    #[test]
    fn correction_prompt_caps_bad_content() {
        let long = "x".repeat(500);
        let p = self_correction_prompt(&long);
        assert!(p.contains(&"x".repeat(100)));
        assert!(!p.contains(&"x".repeat(101)));
    }
}
