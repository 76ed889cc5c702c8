//! Fetch a page and reduce it to readable text.
//!
//! Script and style blocks are stripped before the tag pass so their
//! bodies never leak into the text. Output is capped so one large page
//! cannot blow up the chat context.

use async_trait::async_trait;
use regex_lite::Regex;
use std::time::Duration;
use streamgate_core::{Tool, ToolContext, ToolError};
use tracing::info;

const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PAGE_CHARS: usize = 20_000;

pub struct ReadWebPageTool {
    client: reqwest::Client,
}

impl ReadWebPageTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PAGE_TIMEOUT)
                .user_agent(super::search_web::BROWSER_USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ReadWebPageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadWebPageTool {
    fn name(&self) -> &str {
        "read_web_page"
    }

    fn description(&self) -> &str {
        "Read the text content of a specific URL. Use this ONLY when the user provides a URL \
         or explicitly asks to read a specific page. DO NOT use this for describing images or \
         identifying people in photos unless specifically requested."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to visit" }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        info!(%url, "Reading page");
        let html = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(&e.to_string()))?
            .text()
            .await
            .map_err(|e| fetch_failed(&e.to_string()))?;

        Ok(truncate_chars(&html_to_text(&html), MAX_PAGE_CHARS))
    }
}

fn fetch_failed(reason: &str) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "read_web_page".to_string(),
        reason: format!("failed to read page: {reason}"),
    }
}

/// Strip markup down to visible text with blank-line collapsing.
pub(crate) fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for pattern in [
        r"(?s)<script\b.*?</script>",
        r"(?s)<style\b.*?</style>",
        r"(?s)<!--.*?-->",
        r"(?s)<[^>]+>",
    ] {
        if let Ok(re) = Regex::new(pattern) {
            text = re.replace_all(&text, " ").into_owned();
        }
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_tags_are_stripped() {
        let html = "<html><head><style>body { color: red }</style></head>\
                    <body><script>var x = 1;</script><h1>Hello</h1><p>World &amp; more</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World & more"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn blank_lines_are_collapsed() {
        let text = html_to_text("<p>a</p>\n\n\n<p>b</p>");
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(25_000);
        let out = truncate_chars(&long, MAX_PAGE_CHARS);
        assert!(out.ends_with("... (truncated)"));
        assert!(out.len() < long.len());
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_chars("short", MAX_PAGE_CHARS), "short");
    }

    #[tokio::test]
    async fn non_http_url_is_rejected() {
        let tool = ReadWebPageTool::new();
        let result = tool
            .execute(
                serde_json::json!({"url": "file:///etc/passwd"}),
                &ToolContext::default(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn tool_definition() {
        let tool = ReadWebPageTool::new();
        let def = tool.to_definition();
        assert_eq!(def.name, "read_web_page");
        assert_eq!(def.input_schema["required"], serde_json::json!(["url"]));
    }
}
