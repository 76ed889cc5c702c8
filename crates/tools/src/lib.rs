//! Built-in tool implementations for StreamGate.
//!
//! These back both the intercepted text tool calls in the chat turn loop
//! and the MCP `tools/call` endpoint: web search, page reading, the
//! personal memory engine, memory documents, and the local clock.

pub mod current_time;
pub mod personal_memory;
pub mod read_user_document;
pub mod read_web_page;
pub mod search_web;

use std::sync::Arc;
use streamgate_core::ToolRegistry;
use streamgate_memory::MemoryStore;

pub use current_time::CurrentTimeTool;
pub use personal_memory::PersonalMemoryTool;
pub use read_user_document::ReadUserDocumentTool;
pub use read_web_page::ReadWebPageTool;
pub use search_web::SearchWebTool;

/// Create the default tool registry with all built-in tools.
///
/// The memory-backed tools share one store; per-user enablement is
/// enforced inside each tool from the execution context.
pub fn default_registry(store: Arc<MemoryStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchWebTool::new()));
    registry.register(Box::new(ReadWebPageTool::new()));
    registry.register(Box::new(PersonalMemoryTool::new(store.clone())));
    registry.register(Box::new(ReadUserDocumentTool::new(store)));
    registry.register(Box::new(CurrentTimeTool));
    registry
}
