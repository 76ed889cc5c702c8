//! Error types for the StreamGate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all StreamGate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Upstream (inference server) errors ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the upstream inference server.
///
/// The first three variants carry distinct client-facing markers so the
/// frontend can react to each class (re-auth, plugin grant, trim history)
/// instead of showing a generic failure.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Tool integration denied: {0}")]
    IntegrationDenied(String),

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Upstream returned no choices")]
    NoChoices,

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl UpstreamError {
    /// Marker prefix emitted into the client stream for error classes the
    /// frontend handles specially. `None` means plain error text.
    pub fn client_marker(&self) -> Option<&'static str> {
        match self {
            UpstreamError::AuthenticationFailed(_) => Some("UPSTREAM_AUTH_ERROR:"),
            UpstreamError::IntegrationDenied(_) => Some("UPSTREAM_PERMISSION_ERROR:"),
            UpstreamError::ContextLengthExceeded(_) => Some("UPSTREAM_CONTEXT_ERROR:"),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid log entry: {0}")]
    InvalidEntry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool disabled by user policy: {0}")]
    Disabled(String),

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_displays_correctly() {
        let err = Error::Upstream(UpstreamError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Disabled("search_web".into()));
        assert!(err.to_string().contains("search_web"));
    }

    #[test]
    fn client_markers_only_for_special_classes() {
        assert_eq!(
            UpstreamError::AuthenticationFailed("bad token".into()).client_marker(),
            Some("UPSTREAM_AUTH_ERROR:")
        );
        assert_eq!(
            UpstreamError::ContextLengthExceeded("too long".into()).client_marker(),
            Some("UPSTREAM_CONTEXT_ERROR:")
        );
        assert_eq!(UpstreamError::NoChoices.client_marker(), None);
    }
}
