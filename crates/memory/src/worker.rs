//! The background memory worker.
//!
//! Every few minutes it claims each user's pending chat history, asks the
//! same model that produced the conversation to extract durable facts, and
//! routes each extracted bullet through the fact log. When a user's
//! profile document grows past the threshold it is consolidated by a
//! second LLM pass.

use crate::history::{clear_pending, render_conversation, take_pending};
use crate::store::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use streamgate_upstream::UpstreamClient;
use tracing::{debug, info, warn};

/// Sentinel the extraction prompt demands when nothing qualifies.
pub const NO_CONTENT_SENTINEL: &str = "NO_IMPORTANT_CONTENT";

/// A consolidated rewrite shorter than this is assumed broken and dropped.
const MIN_CONSOLIDATED_LEN: usize = 10;

#[derive(Clone)]
pub struct WorkerOptions {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub consolidation_threshold_bytes: u64,
    /// Model used when the history entries carry none.
    pub fallback_model: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            interval: Duration::from_secs(180),
            consolidation_threshold_bytes: 5000,
            fallback_model: "local-model".into(),
        }
    }
}

pub struct MemoryWorker {
    store: Arc<MemoryStore>,
    upstream: UpstreamClient,
    options: WorkerOptions,
    /// Per-user memory switch, read fresh each pass.
    memory_enabled: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl MemoryWorker {
    pub fn new(
        store: Arc<MemoryStore>,
        upstream: UpstreamClient,
        options: WorkerOptions,
        memory_enabled: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    ) -> Self {
        Self {
            store,
            upstream,
            options,
            memory_enabled,
        }
    }

    /// Run forever: an initial delay to let startup settle, then periodic
    /// scans.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Memory worker started");
            tokio::time::sleep(self.options.initial_delay).await;
            self.scan_all().await;

            let mut ticker = tokio::time::interval(self.options.interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                self.scan_all().await;
            }
        })
    }

    async fn scan_all(&self) {
        let users = self.store.user_ids();
        debug!(count = users.len(), "Scanning user memory directories");
        for user_id in users {
            if !(self.memory_enabled)(&user_id) {
                debug!(user = %user_id, "Memory disabled, skipping");
                continue;
            }
            self.process_user(&user_id).await;
        }
    }

    async fn process_user(&self, user_id: &str) {
        let entries = match take_pending(&self.store, user_id) {
            Ok(Some(entries)) => entries,
            Ok(None) => return,
            Err(e) => {
                warn!(user = user_id, error = %e, "Failed to claim chat history");
                return;
            }
        };

        let model = entries
            .iter()
            .rev()
            .find(|e| !e.model.is_empty())
            .map(|e| e.model.clone())
            .unwrap_or_else(|| self.options.fallback_model.clone());

        info!(user = user_id, count = entries.len(), %model, "Analyzing chat history");
        let conversation = render_conversation(&entries);
        self.extract_facts(user_id, &conversation, &model).await;

        if let Err(e) = clear_pending(&self.store, user_id) {
            warn!(user = user_id, error = %e, "Failed to clear processed history");
        }

        self.maybe_consolidate(user_id, &model).await;
    }

    async fn extract_facts(&self, user_id: &str, conversation: &str, model: &str) {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": "You summarize conversations for memory."},
                {"role": "user", "content": chat_summary_prompt(conversation)},
            ],
            "temperature": 0.0,
            "stream": false,
        });

        let result = match self.upstream.complete(&body).await {
            Ok(r) => r,
            Err(e) => {
                warn!(user = user_id, error = %e, "Fact extraction call failed");
                return;
            }
        };

        let result = result.trim();
        if result.is_empty() || result == NO_CONTENT_SENTINEL {
            debug!(user = user_id, "Nothing durable in this batch");
            return;
        }

        let bullets = extract_bullets(result);
        for bullet in &bullets {
            if let Err(e) = self.store.remember(user_id, bullet) {
                warn!(user = user_id, error = %e, "Failed to save extracted fact");
            }
        }
        info!(user = user_id, count = bullets.len(), "Saved extracted facts");
    }

    /// Consolidate the profile document once it grows past the threshold.
    async fn maybe_consolidate(&self, user_id: &str, model: &str) {
        let path = self.store.file_path(user_id, "personal.md");
        let Ok(meta) = std::fs::metadata(&path) else {
            return;
        };
        if meta.len() <= self.options.consolidation_threshold_bytes {
            return;
        }

        info!(user = user_id, size = meta.len(), "Consolidating profile document");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return;
        };

        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": "You are a helpful assistant that organizes information."},
                {"role": "user", "content": consolidation_prompt(&content)},
            ],
            "temperature": 0.1,
            "stream": false,
        });

        let consolidated = match self.upstream.complete(&body).await {
            Ok(r) => r,
            Err(e) => {
                warn!(user = user_id, error = %e, "Consolidation call failed");
                return;
            }
        };

        let consolidated = consolidated.trim();
        if consolidated.len() < MIN_CONSOLIDATED_LEN {
            warn!(user = user_id, "Consolidated output too short, keeping original");
            return;
        }
        if let Err(e) = std::fs::write(&path, consolidated) {
            warn!(user = user_id, error = %e, "Failed to write consolidated profile");
        }
    }
}

/// Pull bullet lines out of the extraction output; a response without
/// bullets is treated as one fact.
fn extract_bullets(text: &str) -> Vec<String> {
    let bullets: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .map(|rest| rest.trim().to_string())
        })
        .filter(|b| !b.is_empty())
        .collect();
    if bullets.is_empty() {
        vec![text.trim().to_string()]
    } else {
        bullets
    }
}

/// Extraction prompt: durable facts only, with an explicit empty sentinel.
pub fn chat_summary_prompt(conversation: &str) -> String {
    format!(
        "You are a Long-term Memory Extraction Agent.\n\
         \n\
         Extract ONLY new, stable, and long-term user facts.\n\
         \n\
         STRICT RULES:\n\
         \n\
         1. Extract atomic, stable traits only.\n\
         2. DO NOT extract temporary goals.\n\
         3. DO NOT extract debugging issues.\n\
         4. DO NOT extract one-time problems.\n\
         5. DO NOT extract session-specific context.\n\
         6. DO NOT extract information already stored.\n\
         7. DO NOT infer or speculate.\n\
         8. If unsure whether a fact is long-term, DO NOT include it.\n\
         \n\
         Only include:\n\
         - Stable preferences\n\
         - Ongoing projects\n\
         - Long-term technical domains\n\
         - Repeated behavioral patterns\n\
         \n\
         If nothing qualifies, output exactly:\n\
         \n\
         {NO_CONTENT_SENTINEL}\n\
         \n\
         OUTPUT:\n\
         - Bullet list only\n\
         - No explanations\n\
         \n\
         CONVERSATION:\n\
         {conversation}"
    )
}

/// Consolidation prompt: dedup and resolve conflicts without inventing.
pub fn consolidation_prompt(current_memory: &str) -> String {
    format!(
        "You are a Memory Optimization Agent.\n\
         \n\
         Your task:\n\
         \n\
         1. Remove duplicates.\n\
         2. If conflict:\n\
            - Prefer the more specific fact.\n\
            - If a timestamp exists, prefer the newer one.\n\
            - If unsure, keep both and mark the conflict.\n\
            - NEVER invent new facts.\n\
         3. Preserve technical specificity.\n\
         4. Do NOT remove domain names, versions, technologies.\n\
         5. Remove:\n\
            - Transient logs\n\
            - Working directories\n\
            - IP addresses\n\
            - Debug context\n\
            - Action descriptions\n\
         6. Remove empty sections.\n\
         \n\
         OUTPUT:\n\
         - Markdown\n\
         - ## Section headers\n\
         - Bullet points only\n\
         - No filler text\n\
         \n\
         CURRENT MEMORY:\n\
         {current_memory}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_are_extracted() {
        let text = "- uses helix as editor\n- prefers dark roast\n";
        let bullets = extract_bullets(text);
        assert_eq!(bullets, vec!["uses helix as editor", "prefers dark roast"]);
    }

    #[test]
    fn star_bullets_also_work() {
        let bullets = extract_bullets("* fact one\n* fact two");
        assert_eq!(bullets.len(), 2);
    }

    #[test]
    fn plain_text_becomes_single_fact() {
        let bullets = extract_bullets("uses helix as editor");
        assert_eq!(bullets, vec!["uses helix as editor"]);
    }

    #[test]
    fn extraction_prompt_carries_sentinel_and_conversation() {
        let prompt = chat_summary_prompt("User: hi\nAssistant: hello");
        assert!(prompt.contains(NO_CONTENT_SENTINEL));
        assert!(prompt.contains("User: hi"));
    }

    #[test]
    fn consolidation_prompt_carries_memory() {
        let prompt = consolidation_prompt("# Personal Memory\n- name: Alice");
        assert!(prompt.contains("name: Alice"));
        assert!(prompt.contains("NEVER invent new facts"));
    }
}
