//! JSON-RPC 2.0 message model shared by every mcpfuse transport.
//!
//! This crate has no networking or async runtime dependency: it only
//! describes the wire envelope (`Message`) and the MCP-specific
//! `tools/list` / `tools/call` payload shapes layered on top of it.

pub mod error;
pub mod message;
pub mod tool;

pub use error::{ProtocolError, Result};
pub use message::{ErrorObject, Message, MessageKind, RequestId, codes};
pub use tool::{CallToolParams, CallToolResult, ListToolsResult, ToolInfo};
