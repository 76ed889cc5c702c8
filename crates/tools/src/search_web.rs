//! Web search via DuckDuckGo Lite.
//!
//! The lite frontend renders results as plain table rows, which a pair of
//! small regexes can pick apart without an HTML parser. Fragile against
//! markup changes, so a parse miss degrades to a "no results" message
//! instead of an error.

use async_trait::async_trait;
use regex_lite::Regex;
use std::time::Duration;
use streamgate_core::{Tool, ToolContext, ToolError};
use tracing::{debug, info};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESULTS: usize = 5;
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

pub struct SearchWebTool {
    client: reqwest::Client,
}

impl SearchWebTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SEARCH_TIMEOUT)
                .user_agent(BROWSER_USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for SearchWebTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the internet using DuckDuckGo. Use this to find current information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        info!(%query, "Searching web");
        let url = format!(
            "https://lite.duckduckgo.com/lite/?q={}",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| execution_failed("search_web", &e.to_string()))?;
        let html = response
            .text()
            .await
            .map_err(|e| execution_failed("search_web", &e.to_string()))?;

        debug!(bytes = html.len(), "Search page fetched");
        Ok(parse_lite_results(&html))
    }
}

/// Pull titles, links, and snippets out of the DDG Lite result table.
pub(crate) fn parse_lite_results(html: &str) -> String {
    let Ok(link_regex) = Regex::new(r#"(?s)href="(.*?)" class='result-link'>(.*?)</a>"#) else {
        return "No results found or parsing failed.".into();
    };
    let Ok(snippet_regex) = Regex::new(r"(?s)class='result-snippet'>(.*?)</td>") else {
        return "No results found or parsing failed.".into();
    };

    let links: Vec<(&str, &str)> = link_regex
        .captures_iter(html)
        .take(MAX_RESULTS)
        .filter_map(|c| {
            Some((c.get(1)?.as_str(), c.get(2)?.as_str()))
        })
        .collect();
    let snippets: Vec<&str> = snippet_regex
        .captures_iter(html)
        .take(MAX_RESULTS)
        .filter_map(|c| Some(c.get(1)?.as_str()))
        .collect();

    let results: Vec<String> = links
        .iter()
        .zip(snippets.iter())
        .map(|((link, title), snippet)| {
            format!(
                "Title: {}\nLink: {}\nSnippet: {}\n",
                clean_entities(&title.replace("<b>", "").replace("</b>", "")),
                link,
                clean_entities(snippet)
            )
        })
        .collect();

    if results.is_empty() {
        return "No results found or parsing failed.".into();
    }
    results.join("\n---\n")
}

fn clean_entities(s: &str) -> String {
    s.replace("&quot;", "\"").replace("&amp;", "&")
}

fn execution_failed(tool_name: &str, reason: &str) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: reason.to_string(),
    }
}
