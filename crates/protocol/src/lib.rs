//! Wire types for the pwmcp server.
//!
//! Two layers live here:
//!
//! - [`jsonrpc`] - the JSON-RPC 2.0 envelope (requests, responses, errors,
//!   notifications) used by every transport.
//! - [`mcp`] - the Model Context Protocol subset this server speaks:
//!   initialize, tool listing/calls, and resource listing/reads.
//!
//! Everything in this crate is pure data; transports and handlers live in
//! `pwmcp-server`.


pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::{
	ErrorCode, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
	JSONRPC_VERSION,
};
pub use mcp::{
	CallToolResult, InitializeResult, ResourceContents, ResourceLink, ServerCapabilities,
	ServerInfo, ToolContent, ToolDescriptor, PROTOCOL_VERSION,
};
