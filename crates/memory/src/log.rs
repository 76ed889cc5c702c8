//! The append-only fact log.
//!
//! Every mutation is a line in `log.md`:
//!
//! ```text
//! [2026-02-06 10:00:00] SET name: Alice
//! [2026-02-06 10:05:00] DELETE name:
//! ```
//!
//! Lines without an action prefix are legacy entries and read as SET.
//! The log is never rewritten; the index is a pure fold over it.

use chrono::NaiveDateTime;
use regex_lite::Regex;
use std::io::Write;
use std::path::Path;
use streamgate_core::MemoryError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    Set,
    Delete,
}

/// A single parsed log line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub action: LogAction,
    pub key: String,
    pub value: String,
}

/// Parse the whole fact log. A missing file is an empty log; malformed
/// lines are skipped so one bad entry never poisons the index.
pub fn parse_log(path: &Path) -> Result<Vec<LogEntry>, MemoryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MemoryError::Io(e)),
    };

    let timestamp_re = Regex::new(r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\]\s*(.+)$")
        .map_err(|e| MemoryError::Storage(e.to_string()))?;

    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = timestamp_re.captures(line) else {
            continue;
        };
        let Ok(timestamp) = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT) else {
            continue;
        };

        let mut rest = caps[2].to_string();
        let action = if let Some(stripped) = rest.strip_prefix("DELETE ") {
            rest = stripped.to_string();
            LogAction::Delete
        } else if let Some(stripped) = rest.strip_prefix("SET ") {
            rest = stripped.to_string();
            LogAction::Set
        } else {
            LogAction::Set
        };

        let Some((key_part, value_part)) = rest.split_once(':') else {
            continue;
        };
        let key = key_part.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        entries.push(LogEntry {
            timestamp,
            action,
            key,
            value: value_part.trim().to_string(),
        });
    }
    Ok(entries)
}

/// Append one entry to the fact log, creating the file and its directory
/// if needed.
pub fn append_to_log(
    path: &Path,
    action: LogAction,
    key: &str,
    value: &str,
) -> Result<(), MemoryError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;

    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
    let line = match action {
        LogAction::Delete => format!("[{timestamp}] DELETE {key}:\n"),
        LogAction::Set => format!("[{timestamp}] SET {key}: {value}\n"),
    };
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_and_delete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.md");
        std::fs::write(
            &path,
            "[2026-02-06 10:00:00] SET name: Alice\n\
             [2026-02-06 10:05:00] DELETE name:\n\
             [2026-02-06 10:06:00] language: korean\n",
        )
        .unwrap();

        let entries = parse_log(&path).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, LogAction::Set);
        assert_eq!(entries[0].key, "name");
        assert_eq!(entries[0].value, "Alice");
        assert_eq!(entries[1].action, LogAction::Delete);
        // Legacy line without action prefix reads as SET.
        assert_eq!(entries[2].action, LogAction::Set);
        assert_eq!(entries[2].key, "language");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.md");
        std::fs::write(
            &path,
            "not a log line\n\
             [2026-02-06 10:00:00] no separator here\n\
             [2026-02-06 10:01:00] SET color: blue\n",
        )
        .unwrap();

        let entries = parse_log(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "color");
    }

    #[test]
    fn missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let entries = parse_log(&dir.path().join("absent.md")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn append_then_parse_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("log.md");
        append_to_log(&path, LogAction::Set, "name", "Bob").unwrap();
        append_to_log(&path, LogAction::Delete, "name", "").unwrap();

        let entries = parse_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, LogAction::Set);
        assert_eq!(entries[1].action, LogAction::Delete);
        assert_eq!(entries[1].key, "name");
    }

    #[test]
    fn keys_are_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.md");
        std::fs::write(&path, "[2026-02-06 10:00:00] SET Favorite Color: red\n").unwrap();
        let entries = parse_log(&path).unwrap();
        assert_eq!(entries[0].key, "favorite color");
    }
}
