//! Per-user policy flags threaded through tool execution.

use serde::{Deserialize, Serialize};

/// User-level settings that restrict what tools may do on their behalf.
///
/// These travel with every tool execution so that individual tools can
/// enforce them (e.g. the document reader refusing disallowed directories)
/// and the registry can refuse disabled tools outright.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPolicy {
    /// Whether the memory engine is active for this user.
    #[serde(default)]
    pub memory_enabled: bool,

    /// Tool names this user has switched off.
    #[serde(default)]
    pub disabled_tools: Vec<String>,

    /// Shell-command substrings the user has forbidden.
    #[serde(default)]
    pub disallowed_commands: Vec<String>,

    /// Filesystem prefixes tools must not read from.
    #[serde(default)]
    pub disallowed_directories: Vec<String>,
}

impl UserPolicy {
    pub fn tool_disabled(&self, name: &str) -> bool {
        self.disabled_tools.iter().any(|t| t == name)
    }

    pub fn directory_disallowed(&self, path: &str) -> bool {
        self.disallowed_directories
            .iter()
            .any(|d| !d.is_empty() && path.starts_with(d.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tools_are_matched_exactly() {
        let policy = UserPolicy {
            disabled_tools: vec!["search_web".into()],
            ..Default::default()
        };
        assert!(policy.tool_disabled("search_web"));
        assert!(!policy.tool_disabled("search"));
    }

    #[test]
    fn directory_prefix_check() {
        let policy = UserPolicy {
            disallowed_directories: vec!["/etc".into()],
            ..Default::default()
        };
        assert!(policy.directory_disallowed("/etc/passwd"));
        assert!(!policy.directory_disallowed("/home/user/notes.txt"));
    }
}
