//! Read one document from the user's memory directory.
//!
//! `index.md` is regenerated on demand so the model always sees a current
//! overview. A miss lists the available files instead of a bare error, so
//! the model can self-correct on the next call.

use async_trait::async_trait;
use std::sync::Arc;
use streamgate_core::{Tool, ToolContext, ToolError};
use streamgate_memory::MemoryStore;
use tracing::{info, warn};

pub struct ReadUserDocumentTool {
    store: Arc<MemoryStore>,
}

impl ReadUserDocumentTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadUserDocumentTool {
    fn name(&self) -> &str {
        "read_user_document"
    }

    fn description(&self) -> &str {
        "Read a specific document from the user's memory folder. Available files: \
         personal.md, work.md, index.md, log.md. Use index.md first to understand \
         available information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "The filename to read (e.g., 'personal.md', 'work.md', 'index.md')"
                }
            },
            "required": ["filename"]
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

        let filename = match arguments["filename"].as_str() {
            Some(f) if !f.is_empty() => f,
            _ => "index.md",
        };
        info!(user = %ctx.user_id, %filename, "Reading user document");

        if filename == "index.md" {
            if let Err(e) = self.store.rebuild(&ctx.user_id) {
                warn!(user = %ctx.user_id, error = %e, "Failed to regenerate index.md");
            }
        }

        match self.store.read_document(&ctx.user_id, filename) {
            Ok(content) => Ok(content),
            Err(streamgate_core::MemoryError::InvalidEntry(msg)) => {
                Err(ToolError::InvalidArguments(msg))
            }
            Err(_) => {
                let files = self.store.list_documents(&ctx.user_id).unwrap_or_default();
                if files.is_empty() {
                    Ok(format!(
                        "Document '{filename}' not found. No memory documents exist yet."
                    ))
                } else {
                    Ok(format!(
                        "Document '{filename}' not found. Available files: {}",
                        files.join(", ")
                    ))
                }
            }
        }
    }
}
