//! Derived markdown files.
//!
//! `personal.md` and `work.md` are keyword-categorized projections of the
//! index; `index.md` is a human-readable overview the model can read via
//! `read_user_document`. All three are regenerated from the index and can
//! always be thrown away.

use crate::index::MemoryIndex;
use std::path::Path;
use streamgate_core::MemoryError;

const WORK_KEYWORDS: &[&str] = &[
    "project",
    "work",
    "company",
    "job",
    "task",
    "deadline",
    "meeting",
    "client",
    "code",
    "programming",
    "development",
    "report",
    "presentation",
    "team",
];

/// Whether a fact reads as work-related or personal.
pub fn determine_category(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    for kw in WORK_KEYWORDS {
        if lower.contains(kw) {
            return "work";
        }
    }
    "personal"
}

/// Regenerate `personal.md` and `work.md` from the index facts.
pub fn write_category_files(dir: &Path, index: &MemoryIndex) -> Result<(), MemoryError> {
    std::fs::create_dir_all(dir)?;

    let mut personal_lines = Vec::new();
    let mut work_lines = Vec::new();
    for (k, v) in &index.facts {
        let line = format!("- **{k}**: {v}");
        if determine_category(&format!("{k} {v}")) == "work" {
            work_lines.push(line);
        } else {
            personal_lines.push(line);
        }
    }

    if !personal_lines.is_empty() {
        let content = format!("# Personal Memory\n\n{}\n", personal_lines.join("\n"));
        std::fs::write(dir.join("personal.md"), content)?;
    }
    if !work_lines.is_empty() {
        let content = format!("# Work Memory\n\n{}\n", work_lines.join("\n"));
        std::fs::write(dir.join("work.md"), content)?;
    }
    Ok(())
}

/// Regenerate `index.md`: available documents, quick facts, file previews.
pub fn write_index_md(dir: &Path, index: &MemoryIndex) -> Result<(), MemoryError> {
    std::fs::create_dir_all(dir)?;

    let mut out = String::from("# User Memory Index\n\n");
    out.push_str(&format!(
        "*Updated: {}*\n\n",
        chrono::Local::now().format(crate::log::TIMESTAMP_FORMAT)
    ));

    out.push_str("## Available Documents\n\n");
    let mut docs: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| name.ends_with(".md") && name != "index.md")
                .collect()
        })
        .unwrap_or_default();
    docs.sort();
    if docs.is_empty() {
        out.push_str("- No documents yet\n");
    } else {
        for doc in &docs {
            out.push_str(&format!("- **{doc}**\n"));
        }
    }

    if !index.facts.is_empty() {
        out.push_str("\n## Quick Facts\n\n");
        for (count, (k, v)) in index.facts.iter().enumerate() {
            if count >= 15 {
                out.push_str("- *(more facts available in log.md)*\n");
                break;
            }
            out.push_str(&format!("- **{k}**: {v}\n"));
        }
    }

    for (filename, heading) in [("personal.md", "Personal"), ("work.md", "Work")] {
        if let Ok(data) = std::fs::read_to_string(dir.join(filename)) {
            if !data.is_empty() {
                let lines: Vec<&str> = data.lines().collect();
                let preview = lines[..lines.len().min(5)].join("\n");
                out.push_str(&format!("\n## {heading} (Preview)\n\n{preview}\n"));
                if lines.len() > 5 {
                    out.push_str(&format!("*...more in {filename}*\n"));
                }
            }
        }
    }

    std::fs::write(dir.join("index.md"), out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn index_with(facts: &[(&str, &str)]) -> MemoryIndex {
        let facts: BTreeMap<String, String> = facts
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MemoryIndex {
            version: 1,
            updated_at: String::new(),
            summary: crate::index::generate_summary(&facts),
            facts,
        }
    }

    #[test]
    fn work_keywords_categorize_as_work() {
        assert_eq!(determine_category("current project is a compiler"), "work");
        assert_eq!(determine_category("meeting every monday"), "work");
        assert_eq!(determine_category("favorite color blue"), "personal");
    }

    #[test]
    fn category_files_split_facts() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_with(&[("name", "Alice"), ("project", "compiler rewrite")]);
        write_category_files(dir.path(), &index).unwrap();

        let personal = std::fs::read_to_string(dir.path().join("personal.md")).unwrap();
        assert!(personal.contains("**name**: Alice"));
        let work = std::fs::read_to_string(dir.path().join("work.md")).unwrap();
        assert!(work.contains("**project**: compiler rewrite"));
    }

    #[test]
    fn empty_categories_write_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_with(&[("name", "Alice")]);
        write_category_files(dir.path(), &index).unwrap();
        assert!(!dir.path().join("work.md").exists());
    }

    #[test]
    fn index_md_lists_documents_and_facts() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_with(&[("name", "Alice")]);
        write_category_files(dir.path(), &index).unwrap();
        write_index_md(dir.path(), &index).unwrap();

        let md = std::fs::read_to_string(dir.path().join("index.md")).unwrap();
        assert!(md.contains("# User Memory Index"));
        assert!(md.contains("- **personal.md**"));
        assert!(md.contains("**name**: Alice"));
        // index.md never lists itself.
        assert!(!md.contains("- **index.md**"));
    }
}
