//! MCP tool server for StreamGate.
//!
//! Exposes the gateway's tool registry to external MCP clients over the
//! SSE transport: JSON-RPC requests in, responses broadcast to every
//! connected stream. Rides the same `ToolRegistry` the chat turn loop
//! executes through, so a tool behaves identically from either side.

pub mod context;
pub mod protocol;
pub mod server;

pub use context::McpContext;
pub use protocol::{JsonRpcRequest, JsonRpcResponse, RpcError, PROTOCOL_VERSION};
pub use server::{mcp_router, McpServer};
