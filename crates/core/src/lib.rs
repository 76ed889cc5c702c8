//! StreamGate core — shared domain types.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! errors, chat messages, client stream events, per-user policy, and the
//! Tool trait + registry that both the turn orchestrator and the MCP
//! server execute through.

pub mod chat;
pub mod error;
pub mod event;
pub mod policy;
pub mod tool;

pub use chat::ChatMessage;
pub use error::{Error, MemoryError, Result, ToolError, UpstreamError};
pub use event::ClientEvent;
pub use policy::UserPolicy;
pub use tool::{Tool, ToolContext, ToolDefinition, ToolRegistry};
