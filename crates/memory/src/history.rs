//! The chat-turn history log.
//!
//! Each completed chat request appends one JSONL entry to the user's
//! `chat_history.log`. The background worker consumes the file by renaming
//! it to `.processing` first, so a crash mid-extraction never loses turns
//! and a rerun picks up where it left off.

use crate::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::io::Write;
use streamgate_core::{ChatMessage, MemoryError};
use tracing::debug;

pub const HISTORY_FILE: &str = "chat_history.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub user: String,
    pub assistant: String,
    #[serde(default)]
    pub model: String,
}

/// Append one chat turn. The most recent user message is paired with the
/// assistant's full response; turns without a user message are skipped.
pub fn log_chat_turn(
    store: &MemoryStore,
    user_id: &str,
    messages: &[ChatMessage],
    assistant_response: &str,
    model: &str,
) -> Result<(), MemoryError> {
    let Some(last_user) = messages.iter().rev().find(|m| m.role == "user") else {
        debug!(user = user_id, "No user message in history, skipping turn log");
        return Ok(());
    };

    let entry = HistoryEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        user: last_user.content.clone(),
        assistant: assistant_response.to_string(),
        model: model.to_string(),
    };
    let line = serde_json::to_string(&entry).map_err(|e| MemoryError::Storage(e.to_string()))?;

    let path = store.file_path(user_id, HISTORY_FILE);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Claim pending history for processing.
///
/// A leftover `.processing` file from an interrupted run is consumed as-is;
/// otherwise the live log is renamed into place. Returns `None` when there
/// is nothing to do.
pub fn take_pending(
    store: &MemoryStore,
    user_id: &str,
) -> Result<Option<Vec<HistoryEntry>>, MemoryError> {
    let log_path = store.file_path(user_id, HISTORY_FILE);
    let processing_path = store.file_path(user_id, &format!("{HISTORY_FILE}.processing"));

    if !processing_path.exists() {
        match std::fs::metadata(&log_path) {
            Ok(meta) if meta.len() > 0 => {
                std::fs::rename(&log_path, &processing_path)?;
            }
            _ => return Ok(None),
        }
    }

    let content = std::fs::read_to_string(&processing_path)?;
    let entries: Vec<HistoryEntry> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();

    if entries.is_empty() {
        std::fs::remove_file(&processing_path)?;
        return Ok(None);
    }
    Ok(Some(entries))
}

/// Drop the claimed batch after successful processing.
pub fn clear_pending(store: &MemoryStore, user_id: &str) -> Result<(), MemoryError> {
    let processing_path = store.file_path(user_id, &format!("{HISTORY_FILE}.processing"));
    match std::fs::remove_file(&processing_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MemoryError::Io(e)),
    }
}

/// Render claimed entries into the transcript form the extraction prompt
/// expects.
pub fn render_conversation(entries: &[HistoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let ts = if entry.timestamp.is_empty() {
            "Unknown Time"
        } else {
            &entry.timestamp
        };
        out.push_str(&format!(
            "[{ts}]\nUser: {}\nAssistant: {}\n",
            entry.user, entry.assistant
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn log_and_take_roundtrip() {
        let (_dir, store) = store();
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("remember I use helix"),
        ];
        log_chat_turn(&store, "u1", &messages, "Noted!", "test-model").unwrap();

        let entries = take_pending(&store, "u1").unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user, "remember I use helix");
        assert_eq!(entries[0].assistant, "Noted!");
        assert_eq!(entries[0].model, "test-model");

        // The live log was renamed away.
        assert!(!store.file_path("u1", HISTORY_FILE).exists());
        clear_pending(&store, "u1").unwrap();
        assert!(take_pending(&store, "u1").unwrap().is_none());
    }

    #[test]
    fn turn_without_user_message_is_skipped() {
        let (_dir, store) = store();
        let messages = vec![ChatMessage::system("rules")];
        log_chat_turn(&store, "u1", &messages, "response", "m").unwrap();
        assert!(take_pending(&store, "u1").unwrap().is_none());
    }

    #[test]
    fn leftover_processing_file_is_reused() {
        let (_dir, store) = store();
        let messages = vec![ChatMessage::user("hello")];
        log_chat_turn(&store, "u1", &messages, "hi", "m").unwrap();

        // First claim renames the log. Simulate a crash by not clearing.
        let first = take_pending(&store, "u1").unwrap().unwrap();
        assert_eq!(first.len(), 1);

        // New turns land in a fresh live log while .processing exists.
        log_chat_turn(&store, "u1", &messages, "hi again", "m").unwrap();

        // The next claim returns the old batch, not the new one.
        let second = take_pending(&store, "u1").unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].assistant, "hi");
    }

    #[test]
    fn render_conversation_format() {
        let entries = vec![HistoryEntry {
            timestamp: "2026-02-06T10:00:00Z".into(),
            user: "hi".into(),
            assistant: "hello".into(),
            model: "m".into(),
        }];
        let text = render_conversation(&entries);
        assert!(text.contains("[2026-02-06T10:00:00Z]"));
        assert!(text.contains("User: hi"));
        assert!(text.contains("Assistant: hello"));
    }
}
