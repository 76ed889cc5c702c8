//! Self-evolution: learn a parsing regex for an unrecognized format.
//!
//! When a model keeps emitting tool-ish text no builtin encoding captures,
//! the learner asks that same model to describe its own format as a regex.
//! A candidate is accepted only if it compiles and captures at least a name
//! and an arguments group from the triggering sample; anything else is
//! discarded without a retry. One accepted pattern per model, immutable.

use crate::prompts::evolution_prompt;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use streamgate_upstream::UpstreamClient;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub regex: String,
    pub format: String,
    pub created_at: String,
    /// The line that triggered learning, kept for later inspection.
    pub sample: String,
}

/// Per-model learned patterns, persisted as one JSON file.
pub struct PatternStore {
    path: PathBuf,
    patterns: RwLock<HashMap<String, LearnedPattern>>,
}

impl PatternStore {
    /// Load the store from disk; a missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let patterns = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self {
            path,
            patterns: RwLock::new(patterns),
        }
    }

    pub fn get(&self, model_id: &str) -> Option<LearnedPattern> {
        self.patterns
            .read()
            .ok()
            .and_then(|p| p.get(model_id).cloned())
    }

    /// Compiled matcher for a model, or `None` when there is no pattern or
    /// the stored pattern no longer compiles.
    pub fn matcher(&self, model_id: &str) -> Option<Regex> {
        let pattern = self.get(model_id)?;
        match Regex::new(&pattern.regex) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(model = model_id, error = %e, "Stored pattern no longer compiles");
                None
            }
        }
    }

    /// Store a pattern unless the model already has one. Returns whether the
    /// pattern was stored.
    pub fn insert_if_absent(&self, model_id: &str, pattern: LearnedPattern) -> bool {
        let inserted = match self.patterns.write() {
            Ok(mut patterns) => {
                if patterns.contains_key(model_id) {
                    false
                } else {
                    patterns.insert(model_id.to_string(), pattern);
                    true
                }
            }
            Err(_) => false,
        };
        if inserted {
            self.persist();
        }
        inserted
    }

    fn persist(&self) {
        let Ok(patterns) = self.patterns.read() else {
            return;
        };
        let Ok(data) = serde_json::to_string_pretty(&*patterns) else {
            return;
        };
        if let Some(dir) = self.path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(&self.path, data) {
            warn!(error = %e, "Failed to persist learned patterns");
        }
    }
}

/// Asks the model for a regex describing its own tool-call format.
pub struct PatternLearner {
    store: std::sync::Arc<PatternStore>,
    upstream: UpstreamClient,
}

impl PatternLearner {
    pub fn new(store: std::sync::Arc<PatternStore>, upstream: UpstreamClient) -> Self {
        Self { store, upstream }
    }

    /// Attempt to learn a pattern for `model_id` from a sample that looked
    /// like a missed tool call. All failure paths discard silently.
    pub async fn learn(&self, model_id: &str, sample: &str) {
        if self.store.get(model_id).is_some() {
            return;
        }
        info!(model = model_id, "Analyzing potential missed tool call");

        let body = json!({
            "model": model_id,
            "messages": [
                {"role": "system", "content": "You are a coding assistant optimized for regex generation."},
                {"role": "user", "content": evolution_prompt(sample)},
            ],
            "temperature": 0.1,
        });

        let candidate = match self.upstream.complete(&body).await {
            Ok(c) => strip_fences(&c),
            Err(e) => {
                warn!(model = model_id, error = %e, "Pattern generation call failed");
                return;
            }
        };
        if candidate.is_empty() || candidate == "NONE" {
            debug!(model = model_id, "Model reported no tool call in sample");
            return;
        }
        debug!(model = model_id, regex = %candidate, "Proposed pattern");

        let compiled = match Regex::new(&candidate) {
            Ok(re) => re,
            Err(e) => {
                warn!(model = model_id, error = %e, "Generated regex does not compile");
                return;
            }
        };

        // Accept only if it captures name + arguments from the sample.
        let valid = compiled
            .captures(sample)
            .map(|caps| caps.get(1).is_some() && caps.get(2).is_some())
            .unwrap_or(false);
        if !valid {
            warn!(model = model_id, "Generated regex did not match the sample, discarding");
            return;
        }

        let pattern = LearnedPattern {
            regex: candidate,
            format: "auto_generated".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sample: sample.to_string(),
        };
        if self.store.insert_if_absent(model_id, pattern) {
            info!(model = model_id, "Learned new tool-call pattern");
        }
    }
}

/// Strip markdown fences a model may wrap the regex in.
fn strip_fences(text: &str) -> String {
    let mut s = text.trim();
    for prefix in ["```regex", "```rust", "```go", "```"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern() -> LearnedPattern {
        LearnedPattern {
            regex: r"Function call: (\w+)\((.*)\)".to_string(),
            format: "auto_generated".to_string(),
            created_at: "2026-02-06T00:00:00Z".to_string(),
            sample: "Function call: search_web({})".to_string(),
        }
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_fences("```regex\n(\\w+)\n```"), r"(\w+)");
        assert_eq!(strip_fences("``` (\\w+) ```"), r"(\w+)");
        assert_eq!(strip_fences(r"(\w+)"), r"(\w+)");
    }

    #[test]
    fn store_roundtrip_and_immutability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned_patterns.json");
        let store = PatternStore::load(&path);

        assert!(store.insert_if_absent("model-a", sample_pattern()));
        // Second insert for the same model is refused.
        let mut other = sample_pattern();
        other.regex = "changed".into();
        assert!(!store.insert_if_absent("model-a", other));
        assert_eq!(store.get("model-a").unwrap().regex, sample_pattern().regex);

        // Reload from disk sees the persisted pattern.
        let reloaded = PatternStore::load(&path);
        assert!(reloaded.matcher("model-a").is_some());
        assert!(reloaded.get("model-b").is_none());
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatternStore::load(dir.path().join("nope.json"));
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn broken_stored_regex_yields_no_matcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned_patterns.json");
        let store = PatternStore::load(&path);
        let mut broken = sample_pattern();
        broken.regex = "([unclosed".into();
        store.insert_if_absent("model-x", broken);
        assert!(store.matcher("model-x").is_none());
    }
}
