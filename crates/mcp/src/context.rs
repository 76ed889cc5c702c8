//! Execution context for MCP tool calls.
//!
//! MCP clients do not carry StreamGate's user identity, so the gateway
//! pushes the identity of the most recent chat request here and every
//! MCP tool call runs as that user. Last write wins; the expected
//! deployment is a single local user.

use std::sync::RwLock;
use streamgate_core::{ToolContext, UserPolicy};

#[derive(Default)]
pub struct McpContext {
    current: RwLock<(String, UserPolicy)>,
}

impl McpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identity and policy MCP calls should execute under.
    pub fn set(&self, user_id: &str, policy: UserPolicy) {
        if let Ok(mut current) = self.current.write() {
            *current = (user_id.to_string(), policy);
        }
    }

    /// Context for the next tool execution. An unset context runs as the
    /// anonymous default user with everything disabled by default policy.
    pub fn tool_context(&self) -> ToolContext {
        match self.current.read() {
            Ok(current) => ToolContext::for_user(current.0.clone(), current.1.clone()),
            Err(_) => ToolContext::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let ctx = McpContext::new();
        ctx.set("alice", UserPolicy::default());
        ctx.set(
            "bob",
            UserPolicy {
                memory_enabled: true,
                ..Default::default()
            },
        );
        let tc = ctx.tool_context();
        assert_eq!(tc.user_id, "bob");
        assert!(tc.policy.memory_enabled);
    }

    #[test]
    fn unset_context_is_anonymous() {
        let ctx = McpContext::new();
        let tc = ctx.tool_context();
        assert!(tc.user_id.is_empty());
        assert!(!tc.policy.memory_enabled);
    }
}
