//! The per-user memory store.
//!
//! One directory per user under the memory root:
//!
//! ```text
//! memory/<user_id>/log.md             append-only fact log (source of truth)
//! memory/<user_id>/index.json         rebuilt snapshot
//! memory/<user_id>/index.md           human-readable overview
//! memory/<user_id>/personal.md        category projection
//! memory/<user_id>/work.md            category projection
//! memory/<user_id>/chat_history.log   JSONL turn log for the worker
//! ```

use crate::extract::extract_key_value;
use crate::index::{build_index, load_index, save_index, MemoryIndex};
use crate::log::{append_to_log, parse_log, LogAction};
use crate::projection::{write_category_files, write_index_md};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use streamgate_core::MemoryError;
use tracing::{debug, warn};

pub struct MemoryStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        let id = if user_id.is_empty() { "default" } else { user_id };
        self.root.join(id)
    }

    pub fn file_path(&self, user_id: &str, filename: &str) -> PathBuf {
        self.user_dir(user_id).join(filename)
    }

    fn log_path(&self, user_id: &str) -> PathBuf {
        self.file_path(user_id, "log.md")
    }

    /// Rebuild the index from the log, refresh the snapshot, projections,
    /// overview, and cache.
    pub fn rebuild(&self, user_id: &str) -> Result<MemoryIndex, MemoryError> {
        let entries = parse_log(&self.log_path(user_id))?;
        let index = build_index(&entries);

        let dir = self.user_dir(user_id);
        if let Err(e) = write_category_files(&dir, &index) {
            warn!(user = user_id, error = %e, "Failed to write category files");
        }
        save_index(&self.file_path(user_id, "index.json"), &index)?;
        if let Err(e) = write_index_md(&dir, &index) {
            warn!(user = user_id, error = %e, "Failed to write index.md");
        }

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(user_id.to_string(), index.clone());
        }
        Ok(index)
    }

    /// Current index: cache, then snapshot, then a rebuild from the log.
    pub fn index(&self, user_id: &str) -> Result<MemoryIndex, MemoryError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(index) = cache.get(user_id) {
                return Ok(index.clone());
            }
        }
        let index = load_index(&self.file_path(user_id, "index.json"))?;
        if !index.facts.is_empty() {
            if let Ok(mut cache) = self.cache.write() {
                cache.insert(user_id.to_string(), index.clone());
            }
            return Ok(index);
        }
        self.rebuild(user_id)
    }

    /// Save a fact. The key is auto-extracted from the content.
    pub fn remember(&self, user_id: &str, content: &str) -> Result<String, MemoryError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MemoryError::InvalidEntry(
                "content cannot be empty for remember".into(),
            ));
        }
        let (key, value) = extract_key_value(content);
        append_to_log(&self.log_path(user_id), LogAction::Set, &key, &value)?;
        self.rebuild(user_id)?;
        debug!(user = user_id, %key, "Remembered fact");
        Ok(format!("Remembered: {key}: {value}"))
    }

    /// Remove a fact from the index. The log keeps the full history; only
    /// a DELETE entry is appended.
    pub fn forget(&self, user_id: &str, content: &str) -> Result<String, MemoryError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MemoryError::InvalidEntry(
                "content to forget cannot be empty".into(),
            ));
        }

        let index = self.index(user_id)?;
        let direct = content.to_lowercase();
        let key = if index.facts.contains_key(&direct) {
            direct
        } else {
            let (extracted, _) = extract_key_value(content);
            if !index.facts.contains_key(&extracted) {
                return Ok("Fact not found in memory.".into());
            }
            extracted
        };

        append_to_log(&self.log_path(user_id), LogAction::Delete, &key, "")?;
        self.rebuild(user_id)?;
        Ok(format!("Forgot: {key}"))
    }

    /// Substring lookup over keys and values.
    pub fn query(&self, user_id: &str, query: &str) -> Result<String, MemoryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MemoryError::InvalidEntry("query cannot be empty".into()));
        }
        let index = self.index(user_id)?;
        let needle = query.to_lowercase();
        let matches: Vec<String> = index
            .facts
            .iter()
            .filter(|(k, v)| k.contains(&needle) || v.to_lowercase().contains(&needle))
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();

        if matches.is_empty() {
            return Ok(format!("No memory found for '{query}'."));
        }
        Ok(matches.join("\n"))
    }

    /// The full index, rendered for the model.
    pub fn read(&self, user_id: &str) -> Result<String, MemoryError> {
        let index = self.index(user_id)?;
        if index.facts.is_empty() {
            return Ok("Memory is empty.".into());
        }
        let lines: Vec<String> = index
            .facts
            .iter()
            .map(|(k, v)| format!("- {k}: {v}"))
            .collect();
        Ok(lines.join("\n"))
    }

    /// Compact block for system prompt injection. States the account id and
    /// display name explicitly so the model never conflates the two.
    pub fn prompt_summary(&self, user_id: &str) -> String {
        let Ok(index) = self.index(user_id) else {
            return String::new();
        };
        if index.facts.is_empty() {
            return String::new();
        }

        let mut lines = vec![format!("- ACCOUNT_ID: {user_id}")];
        if let Some(name) = index.facts.get("name") {
            lines.push(format!("- USER_NAME: {name}"));
        }
        for (k, v) in &index.facts {
            if k == "name" {
                continue;
            }
            lines.push(format!("- {k}: {v}"));
        }
        lines.join("\n")
    }

    /// List the markdown documents in a user's memory directory.
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<String>, MemoryError> {
        let dir = self.user_dir(user_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MemoryError::Io(e)),
        };
        let mut files: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.ends_with(".md"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read one document by name. Rejects anything that could escape the
    /// user's directory.
    pub fn read_document(&self, user_id: &str, filename: &str) -> Result<String, MemoryError> {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(MemoryError::InvalidEntry(format!(
                "invalid filename: {filename}"
            )));
        }
        let path = self.file_path(user_id, filename);
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MemoryError::Storage(
                format!("document '{filename}' not found"),
            )),
            Err(e) => Err(MemoryError::Io(e)),
        }
    }

    /// All user ids that have a memory directory.
    pub fn user_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect()
    }
}
