//! Key extraction from free-form memory content.
//!
//! The `remember` action receives natural language ("my name is Alice",
//! "favorite color: blue"). We pull a stable key out of it so the fact
//! lands in the index under something queryable.

use regex_lite::Regex;

/// Extract a `(key, value)` pair from content.
///
/// Tried in order: explicit `key: value` / `key = value`, a few natural
/// language patterns, then a fallback key built from the first words.
pub fn extract_key_value(content: &str) -> (String, String) {
    let content = content.trim();

    // Explicit "Key: Value" or "Key = Value"
    if let Some(caps) = Regex::new(r"^([^:=]+)[:=]\s*(.+)$")
        .ok()
        .and_then(|re| re.captures(content))
    {
        let key = caps[1].trim().to_lowercase();
        let value = caps[2].trim().to_string();
        if !key.is_empty() && !value.is_empty() {
            return (key, value);
        }
    }

    let patterns: &[(&str, &str)] = &[
        (r"(?i)my name is\s+(.+)", "name"),
        (r"(?i)^(?:i am|i'm)\s+(.+)", "name"),
        (r"(?i)my birthday is\s+(.+)", "birthday"),
        (r"(?i)\bi (?:prefer|like)\s+(.+)", "preference"),
    ];
    for (pattern, key) in patterns {
        if let Some(caps) = Regex::new(pattern).ok().and_then(|re| re.captures(content)) {
            return ((*key).to_string(), caps[1].trim().to_string());
        }
    }

    // Fallback: first few words become the key.
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() >= 2 {
        let key_part: String = words[..words.len().min(3)]
            .join("_")
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !key_part.is_empty() {
            return (key_part, content.to_string());
        }
    }

    ("note".to_string(), content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_value() {
        let (k, v) = extract_key_value("Favorite Color: blue");
        assert_eq!(k, "favorite color");
        assert_eq!(v, "blue");
    }

    #[test]
    fn explicit_equals_form() {
        let (k, v) = extract_key_value("editor = helix");
        assert_eq!(k, "editor");
        assert_eq!(v, "helix");
    }

    #[test]
    fn name_pattern() {
        let (k, v) = extract_key_value("my name is Alice");
        assert_eq!(k, "name");
        assert_eq!(v, "Alice");
    }

    #[test]
    fn birthday_pattern() {
        let (k, v) = extract_key_value("My birthday is March 3rd");
        assert_eq!(k, "birthday");
        assert_eq!(v, "March 3rd");
    }

    #[test]
    fn preference_pattern() {
        let (k, v) = extract_key_value("i prefer dark roast coffee");
        assert_eq!(k, "preference");
        assert_eq!(v, "dark roast coffee");
    }

    #[test]
    fn fallback_uses_first_words() {
        let (k, v) = extract_key_value("works at the observatory downtown");
        assert_eq!(k, "works_at_the");
        assert_eq!(v, "works at the observatory downtown");
    }

    #[test]
    fn single_word_falls_back_to_note() {
        let (k, v) = extract_key_value("hungry");
        assert_eq!(k, "note");
        assert_eq!(v, "hungry");
    }
}
