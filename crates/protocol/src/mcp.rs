//! MCP result and descriptor types.
//!
//! Field names follow the MCP wire convention (camelCase). Only the subset
//! the server implements is modelled: initialize, tools, and resources.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Result of the `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
	pub protocol_version: String,
	pub capabilities: ServerCapabilities,
	pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resources: Option<Value>,
}

impl ServerCapabilities {
	/// Capabilities advertised by this server: tools plus listChanged resources.
	pub fn advertised() -> Self {
		Self {
			tools: Some(Value::Object(Default::default())),
			resources: Some(serde_json::json!({ "listChanged": true })),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
	pub name: String,
	pub version: String,
}

/// One entry of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
	pub name: String,
	pub description: String,
	pub input_schema: Value,
}

/// One content block of a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
	Text {
		text: String,
	},
	#[serde(rename_all = "camelCase")]
	Image {
		/// Base64-encoded image bytes.
		data: String,
		mime_type: String,
	},
}

impl ToolContent {
	pub fn text(text: impl Into<String>) -> Self {
		ToolContent::Text { text: text.into() }
	}
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
	pub content: Vec<ToolContent>,
	pub is_error: bool,
}

impl CallToolResult {
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			content: vec![ToolContent::text(text)],
			is_error: false,
		}
	}

	pub fn error(text: impl Into<String>) -> Self {
		Self {
			content: vec![ToolContent::text(text)],
			is_error: true,
		}
	}

	pub fn push_text(mut self, text: impl Into<String>) -> Self {
		self.content.push(ToolContent::text(text));
		self
	}
}

/// Public link to a server-generated downloadable artifact.
///
/// This is what clients see; the backing storage path never leaves the
/// resource store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
	pub uri: String,
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
}

/// One entry of a `resources/read` result.
///
/// Exactly one of `text` or `blob` is set: UTF-8 text for textual MIME
/// types, base64 for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
	pub uri: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub blob: Option<String>,
}
