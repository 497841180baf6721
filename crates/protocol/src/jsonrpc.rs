//! JSON-RPC 2.0 envelope types.
//!
//! The server accepts single request objects (no batching) and replies with
//! either a result or an error object. Notifications are requests without an
//! `id` and never receive a reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes used by this server.
///
/// The reserved JSON-RPC range plus `-32000`, which the MCP streamable HTTP
/// convention uses for session-level rejections (missing or unknown session).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
	/// Missing, unknown, or expired session id.
	InvalidSession,
	/// Body was not valid JSON.
	ParseError,
	/// Envelope was JSON but not a valid request object.
	InvalidRequest,
	/// Method is not part of the supported MCP subset.
	MethodNotFound,
	/// Parameters failed validation.
	InvalidParams,
	/// Anything else.
	InternalError,
	/// Requested resource does not exist or has expired.
	ResourceNotFound,
}

impl ErrorCode {
	pub fn as_i64(self) -> i64 {
		match self {
			ErrorCode::InvalidSession => -32000,
			ErrorCode::ParseError => -32700,
			ErrorCode::InvalidRequest => -32600,
			ErrorCode::MethodNotFound => -32601,
			ErrorCode::InvalidParams => -32602,
			ErrorCode::InternalError => -32603,
			ErrorCode::ResourceNotFound => -32002,
		}
	}
}

/// A single inbound request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
	pub jsonrpc: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
	/// Absent for notifications.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<Value>,
}

impl JsonRpcRequest {
	/// Whether this request opens a new session.
	///
	/// Matches the MCP `initialize` request shape: correct method name and a
	/// request id (an `initialize` notification is not a handshake).
	pub fn is_initialize(&self) -> bool {
		self.method == "initialize" && self.id.is_some()
	}

	/// Whether this is a notification (no reply expected).
	pub fn is_notification(&self) -> bool {
		self.id.is_none()
	}
}

/// Error member of a response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// A single outbound response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
	pub jsonrpc: String,
	/// `null` when the request id could not be recovered.
	pub id: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
	pub fn success(id: Value, result: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn error(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			result: None,
			error: Some(JsonRpcError {
				code: code.as_i64(),
				message: message.into(),
				data: None,
			}),
		}
	}
}

/// Server-initiated notification (e.g. `notifications/resources/list_changed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
	pub jsonrpc: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
}

impl JsonRpcNotification {
	pub fn new(method: impl Into<String>) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			method: method.into(),
			params: Value::Null,
		}
	}

	/// The notification the resource store emits after its list changes.
	pub fn resources_list_changed() -> Self {
		Self::new("notifications/resources/list_changed")
	}
}
