//! The rebuildable fact index.
//!
//! `index.json` is a snapshot for fast reads; the fact log stays the source
//! of truth. Rebuilding is a pure fold over the log with last-write-wins
//! per key.

use crate::log::{LogAction, LogEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use streamgate_core::MemoryError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryIndex {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    #[serde(default)]
    pub summary: String,
}

/// Keys surfaced first in summaries.
const PRIORITY_KEYS: &[&str] = &["name", "nickname", "language", "preference"];

/// Fold log entries into an index. Later entries win; DELETE removes the key.
pub fn build_index(entries: &[LogEntry]) -> MemoryIndex {
    let mut facts = BTreeMap::new();
    for entry in entries {
        match entry.action {
            LogAction::Set => {
                facts.insert(entry.key.clone(), entry.value.clone());
            }
            LogAction::Delete => {
                facts.remove(&entry.key);
            }
        }
    }
    let summary = generate_summary(&facts);
    MemoryIndex {
        version: 1,
        updated_at: chrono::Utc::now().to_rfc3339(),
        facts,
        summary,
    }
}

/// Compact one-line summary: priority keys first, then others, capped at 10.
pub fn generate_summary(facts: &BTreeMap<String, String>) -> String {
    if facts.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = Vec::new();
    for key in PRIORITY_KEYS {
        if let Some(val) = facts.get(*key) {
            parts.push(format!("{key}: {val}"));
        }
    }
    for (k, v) in facts {
        if parts.len() >= 10 {
            break;
        }
        if PRIORITY_KEYS.contains(&k.as_str()) {
            continue;
        }
        parts.push(format!("{k}: {v}"));
    }
    parts.join("; ")
}

pub fn save_index(path: &Path, index: &MemoryIndex) -> Result<(), MemoryError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_string_pretty(index)
        .map_err(|e| MemoryError::Storage(e.to_string()))?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Load the snapshot; a missing file is an empty index.
pub fn load_index(path: &Path) -> Result<MemoryIndex, MemoryError> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MemoryIndex::default()),
        Err(e) => return Err(MemoryError::Io(e)),
    };
    serde_json::from_str(&data).map_err(|e| MemoryError::InvalidEntry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn entry(action: LogAction, key: &str, value: &str) -> LogEntry {
        LogEntry {
            timestamp: NaiveDateTime::parse_from_str(
                "2026-02-06 10:00:00",
                crate::log::TIMESTAMP_FORMAT,
            )
            .unwrap(),
            action,
            key: key.into(),
            value: value.into(),
        }
    }

    #[test]
    fn last_write_wins() {
        let entries = vec![
            entry(LogAction::Set, "name", "Alice"),
            entry(LogAction::Set, "name", "Bob"),
        ];
        let index = build_index(&entries);
        assert_eq!(index.facts["name"], "Bob");
    }

    #[test]
    fn delete_removes_key() {
        let entries = vec![
            entry(LogAction::Set, "name", "Alice"),
            entry(LogAction::Delete, "name", ""),
        ];
        let index = build_index(&entries);
        assert!(index.facts.is_empty());
        assert!(index.summary.is_empty());
    }

    #[test]
    fn set_after_delete_restores_key() {
        let entries = vec![
            entry(LogAction::Set, "name", "Alice"),
            entry(LogAction::Delete, "name", ""),
            entry(LogAction::Set, "name", "Carol"),
        ];
        let index = build_index(&entries);
        assert_eq!(index.facts["name"], "Carol");
    }

    #[test]
    fn summary_puts_priority_keys_first() {
        let entries = vec![
            entry(LogAction::Set, "zebra", "stripes"),
            entry(LogAction::Set, "name", "Alice"),
        ];
        let index = build_index(&entries);
        assert!(index.summary.starts_with("name: Alice"));
        assert!(index.summary.contains("zebra: stripes"));
    }

    #[test]
    fn summary_caps_at_ten_facts() {
        let entries: Vec<_> = (0..20)
            .map(|i| entry(LogAction::Set, &format!("key{i:02}"), "v"))
            .collect();
        let index = build_index(&entries);
        assert_eq!(index.summary.split("; ").count(), 10);
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = build_index(&[entry(LogAction::Set, "name", "Alice")]);
        save_index(&path, &index).unwrap();
        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded.facts["name"], "Alice");
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_index(&dir.path().join("index.json")).unwrap();
        assert!(loaded.facts.is_empty());
    }
}
