//! The personal memory tool.
//!
//! A thin dispatcher over [`MemoryStore`]: the store owns the append-only
//! log and index rebuilds, this tool only maps actions and enforces the
//! per-user memory switch.

use async_trait::async_trait;
use std::sync::Arc;
use streamgate_core::{Tool, ToolContext, ToolError};
use streamgate_memory::MemoryStore;
use tracing::info;

pub struct PersonalMemoryTool {
    store: Arc<MemoryStore>,
}

impl PersonalMemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PersonalMemoryTool {
    fn name(&self) -> &str {
        "personal_memory"
    }

    fn description(&self) -> &str {
        "Manage the user's long-term personal memory. Actions: 'remember' to save facts \
         (server auto-extracts key), 'forget' to remove (log preserved), 'query' for fast \
         lookup, 'read' for full index. Data is protected with Append-Only logging."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "Action: 'remember' (save fact, auto-key), 'forget' (remove from index), 'query' (fast lookup), 'read' (full memory).",
                    "enum": ["remember", "forget", "query", "read", "search"]
                },
                "content": {
                    "type": "string",
                    "description": "For 'remember': the fact to save. For 'forget'/'query': the key to lookup."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError> {
        if !ctx.policy.memory_enabled {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().to_string(),
                reason: "memory feature is disabled by user settings".into(),
            });
        }

        let action = arguments["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'action' argument".into()))?;
        let content = arguments["content"].as_str().unwrap_or("");

        info!(user = %ctx.user_id, %action, "Memory action");
        let result = match action {
            "remember" => self.store.remember(&ctx.user_id, content),
            "forget" => self.store.forget(&ctx.user_id, content),
            // 'search' is an alias some models reach for.
            "query" | "search" => self.store.query(&ctx.user_id, content),
            "read" => self.store.read(&ctx.user_id),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown action: {other}. Supported: read, remember, forget, query"
                )));
            }
        };
        result.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamgate_core::UserPolicy;

    fn setup() -> (tempfile::TempDir, PersonalMemoryTool, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path()));
        let tool = PersonalMemoryTool::new(store);
        let ctx = ToolContext::for_user(
            "u1",
            UserPolicy {
                memory_enabled: true,
                ..Default::default()
            },
        );
        (dir, tool, ctx)
    }

    #[tokio::test]
    async fn remember_query_forget_cycle() {
        let (_dir, tool, ctx) = setup();

        let saved = tool
            .execute(
                serde_json::json!({"action": "remember", "content": "my name is Alice"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(saved.contains("Remembered"));

        let found = tool
            .execute(serde_json::json!({"action": "query", "content": "name"}), &ctx)
            .await
            .unwrap();
        assert!(found.contains("Alice"));

        let forgot = tool
            .execute(serde_json::json!({"action": "forget", "content": "name"}), &ctx)
            .await
            .unwrap();
        assert!(forgot.contains("name"));

        let read = tool
            .execute(serde_json::json!({"action": "read"}), &ctx)
            .await
            .unwrap();
        assert_eq!(read, "Memory is empty.");
    }

    #[tokio::test]
    async fn search_is_an_alias_for_query() {
        let (_dir, tool, ctx) = setup();
        tool.execute(
            serde_json::json!({"action": "remember", "content": "language: rust"}),
            &ctx,
        )
        .await
        .unwrap();
        let found = tool
            .execute(serde_json::json!({"action": "search", "content": "rust"}), &ctx)
            .await
            .unwrap();
        assert!(found.contains("language"));
    }

    #[tokio::test]
    async fn disabled_memory_is_refused() {
        let (_dir, tool, _) = setup();
        let ctx = ToolContext::for_user("u1", UserPolicy::default());
        let err = tool
            .execute(serde_json::json!({"action": "read"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let (_dir, tool, ctx) = setup();
        let err = tool
            .execute(serde_json::json!({"action": "erase"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
