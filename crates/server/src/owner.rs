//! Per-session ownership of browser, stores, and request dispatch.
//!
//! An [`Owner`] is the logical session: it holds one browser manager, the
//! console log buffer, an in-memory screenshot cache, and the session's view
//! into the shared resource and upload stores. Transports hand requests to
//! [`Owner::handle_request`] and relay the answer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use pwmcp_protocol::jsonrpc::{ErrorCode, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use pwmcp_protocol::mcp::{
	InitializeResult, PROTOCOL_VERSION, ResourceContents, ResourceLink, ServerCapabilities,
	ServerInfo,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::browser::{BrowserManager, BrowserSettings, ConsoleSink};
use crate::resources::ResourceStore;
use crate::tools::ToolKind;
use crate::uploads::UploadStore;

/// Process-unique identifier of an [`Owner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
	pub fn next() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(1);
		OwnerId(COUNTER.fetch_add(1, Ordering::Relaxed))
	}
}

impl std::fmt::Display for OwnerId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "owner-{}", self.0)
	}
}

/// All state belonging to one logical session.
pub struct Owner {
	pub id: OwnerId,
	session_id: OnceLock<String>,
	browser: BrowserManager,
	console: ConsoleSink,
	screenshots: StdMutex<HashMap<String, String>>,
	api_client: OnceLock<reqwest::Client>,
	settings: StdMutex<BrowserSettings>,
	resources: ResourceStore,
	uploads: UploadStore,
	events: broadcast::Sender<String>,
	closed: AtomicBool,
}

impl Owner {
	pub fn new(
		defaults: BrowserSettings,
		resources: ResourceStore,
		uploads: UploadStore,
	) -> Arc<Self> {
		let console: ConsoleSink = Arc::new(StdMutex::new(Vec::new()));
		let (events, _) = broadcast::channel(64);
		Arc::new(Self {
			id: OwnerId::next(),
			session_id: OnceLock::new(),
			browser: BrowserManager::new(Arc::clone(&console)),
			console,
			screenshots: StdMutex::new(HashMap::new()),
			api_client: OnceLock::new(),
			settings: StdMutex::new(defaults),
			resources,
			uploads,
			events,
			closed: AtomicBool::new(false),
		})
	}

	/// Binds the external transport session id. Set once, at session
	/// creation; stdio owners never get one.
	pub fn bind_session(&self, session_id: &str) {
		let _ = self.session_id.set(session_id.to_string());
	}

	pub fn session_id(&self) -> Option<&str> {
		self.session_id.get().map(String::as_str)
	}

	/// Subscribes to the server-to-client notification stream (SSE).
	pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
		self.events.subscribe()
	}

	/// Emits a resource list-changed notification to any connected stream.
	///
	/// Delivery is best-effort: with no stream connected the notification
	/// is dropped, matching the transport's semantics.
	pub fn notify_resources_changed(&self) {
		let note = JsonRpcNotification::resources_list_changed();
		match serde_json::to_string(&note) {
			Ok(payload) => {
				if self.events.send(payload).is_err() {
					debug!(
						target = "pwmcp.session",
						owner = %self.id,
						"resource notification dropped, no stream connected"
					);
				}
			}
			Err(err) => {
				debug!(target = "pwmcp.session", error = %err, "failed to encode notification");
			}
		}
	}

	pub fn browser(&self) -> &BrowserManager {
		&self.browser
	}

	pub fn resources(&self) -> &ResourceStore {
		&self.resources
	}

	pub fn uploads(&self) -> &UploadStore {
		&self.uploads
	}

	pub fn console(&self) -> &ConsoleSink {
		&self.console
	}

	/// Snapshot of the current launch settings.
	pub fn settings(&self) -> BrowserSettings {
		self.settings
			.lock()
			.map(|guard| guard.clone())
			.unwrap_or_default()
	}

	/// Applies a settings update; takes effect on the next `page()` call.
	pub fn update_settings(&self, update: impl FnOnce(&mut BrowserSettings)) {
		if let Ok(mut guard) = self.settings.lock() {
			update(&mut guard);
		}
	}

	/// Returns a live page for the current settings, launching on demand.
	pub async fn page(&self) -> crate::error::Result<chromiumoxide::Page> {
		let settings = self.settings();
		self.browser.ensure(&settings).await
	}

	/// Shared HTTP client for the API tools, built lazily.
	pub fn api_client(&self) -> &reqwest::Client {
		self.api_client.get_or_init(reqwest::Client::new)
	}

	/// Caches a screenshot by name for later retrieval via
	/// `screenshot://<name>`.
	pub fn store_screenshot(&self, name: String, base64_data: String) {
		if let Ok(mut shots) = self.screenshots.lock() {
			shots.insert(name, base64_data);
		}
	}

	pub fn screenshot_names(&self) -> Vec<String> {
		self.screenshots
			.lock()
			.map(|shots| shots.keys().cloned().collect())
			.unwrap_or_default()
	}

	pub fn screenshot_data(&self, name: &str) -> Option<String> {
		self.screenshots
			.lock()
			.ok()
			.and_then(|shots| shots.get(name).cloned())
	}

	/// Dispatches one MCP request. Returns `None` for notifications.
	pub async fn handle_request(self: &Arc<Self>, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
		if request.is_notification() {
			debug!(
				target = "pwmcp.session",
				owner = %self.id,
				method = %request.method,
				"notification received"
			);
			return None;
		}
		let id = request.id.clone().unwrap_or(Value::Null);

		let response = match request.method.as_str() {
			"initialize" => JsonRpcResponse::success(
				id,
				json!(InitializeResult {
					protocol_version: PROTOCOL_VERSION.to_string(),
					capabilities: ServerCapabilities::advertised(),
					server_info: ServerInfo {
						name: env!("CARGO_PKG_NAME").to_string(),
						version: env!("CARGO_PKG_VERSION").to_string(),
					},
				}),
			),
			"ping" => JsonRpcResponse::success(id, json!({})),
			"tools/list" => {
				let tools: Vec<_> = ToolKind::ALL.iter().map(|kind| kind.descriptor()).collect();
				JsonRpcResponse::success(id, json!({ "tools": tools }))
			}
			"tools/call" => self.handle_tool_call(id, &request.params).await,
			"resources/list" => {
				let mut resources = self.resources.list(self.id).await;
				for name in self.screenshot_names() {
					resources.push(ResourceLink {
						uri: format!("screenshot://{name}"),
						name,
						description: None,
						mime_type: Some("image/png".to_string()),
						size: None,
					});
				}
				JsonRpcResponse::success(id, json!({ "resources": resources }))
			}
			"resources/read" => self.handle_resource_read(id, &request.params).await,
			other => {
				debug!(target = "pwmcp.session", method = other, "unsupported method");
				JsonRpcResponse::error(
					id,
					ErrorCode::MethodNotFound,
					format!("method not found: {other}"),
				)
			}
		};
		Some(response)
	}

	async fn handle_tool_call(self: &Arc<Self>, id: Value, params: &Value) -> JsonRpcResponse {
		let Some(name) = params.get("name").and_then(Value::as_str) else {
			return JsonRpcResponse::error(id, ErrorCode::InvalidParams, "missing tool name");
		};
		let Some(kind) = ToolKind::from_name(name) else {
			return JsonRpcResponse::error(
				id,
				ErrorCode::MethodNotFound,
				format!("unknown tool: {name}"),
			);
		};
		let args = params.get("arguments").cloned().unwrap_or(Value::Null);
		let result = crate::tools::dispatch(self, kind, args).await;
		JsonRpcResponse::success(id, json!(result))
	}

	async fn handle_resource_read(&self, id: Value, params: &Value) -> JsonRpcResponse {
		let Some(uri) = params.get("uri").and_then(Value::as_str) else {
			return JsonRpcResponse::error(id, ErrorCode::InvalidParams, "missing resource uri");
		};
		if let Some(name) = uri.strip_prefix("screenshot://") {
			return match self.screenshot_data(name) {
				Some(data) => JsonRpcResponse::success(
					id,
					json!({
						"contents": [ResourceContents {
							uri: uri.to_string(),
							mime_type: Some("image/png".to_string()),
							text: None,
							blob: Some(data),
						}]
					}),
				),
				None => JsonRpcResponse::error(
					id,
					ErrorCode::ResourceNotFound,
					format!("resource not found: {uri}"),
				),
			};
		}
		match self.resources.read(uri, self.id).await {
			Some(contents) => JsonRpcResponse::success(id, json!({ "contents": [contents] })),
			None => JsonRpcResponse::error(
				id,
				ErrorCode::ResourceNotFound,
				format!("resource not found: {uri}"),
			),
		}
	}

	/// Closes the browser. The first call wins; later calls are no-ops.
	pub async fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		info!(target = "pwmcp.session", owner = %self.id, "closing session owner");
		self.browser.close().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_owner() -> Arc<Owner> {
		Owner::new(
			BrowserSettings::default(),
			ResourceStore::new(),
			UploadStore::new(),
		)
	}

	#[test]
	fn owner_ids_are_unique() {
		let a = OwnerId::next();
		let b = OwnerId::next();
		assert_ne!(a, b);
	}

	#[test]
	fn session_id_binds_once() {
		let owner = test_owner();
		owner.bind_session("first");
		owner.bind_session("second");
		assert_eq!(owner.session_id(), Some("first"));
	}

	#[tokio::test]
	async fn initialize_reports_capabilities() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "initialize",
			"params": { "protocolVersion": PROTOCOL_VERSION },
			"id": 1
		}))
		.unwrap();

		let response = owner.handle_request(request).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["result"]["protocolVersion"], PROTOCOL_VERSION);
		assert_eq!(body["result"]["capabilities"]["resources"]["listChanged"], true);
	}

	#[tokio::test]
	async fn notifications_get_no_reply() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "notifications/initialized"
		}))
		.unwrap();
		assert!(owner.handle_request(request).await.is_none());
	}

	#[tokio::test]
	async fn tools_list_is_nonempty_and_named() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "tools/list",
			"id": 2
		}))
		.unwrap();

		let response = owner.handle_request(request).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		let tools = body["result"]["tools"].as_array().unwrap();
		assert!(!tools.is_empty());
		assert!(
			tools
				.iter()
				.any(|tool| tool["name"] == "playwright_navigate")
		);
	}

	#[tokio::test]
	async fn unknown_method_yields_method_not_found() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "prompts/list",
			"id": 3
		}))
		.unwrap();

		let response = owner.handle_request(request).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["error"]["code"], -32601);
	}

	#[tokio::test]
	async fn unknown_tool_yields_method_not_found() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "tools/call",
			"params": { "name": "playwright_teleport", "arguments": {} },
			"id": 4
		}))
		.unwrap();

		let response = owner.handle_request(request).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["error"]["code"], -32601);
	}

	#[tokio::test]
	async fn missing_resource_yields_resource_not_found() {
		let owner = test_owner();
		let request: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "resources/read",
			"params": { "uri": "mcp-resource://missing" },
			"id": 5
		}))
		.unwrap();

		let response = owner.handle_request(request).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["error"]["code"], -32002);
	}

	#[tokio::test]
	async fn cached_screenshots_are_listed_and_readable() {
		let owner = test_owner();
		owner.store_screenshot("login-page".to_string(), "aGVsbG8=".to_string());

		let list: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "resources/list",
			"id": 6
		}))
		.unwrap();
		let response = owner.handle_request(list).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		let resources = body["result"]["resources"].as_array().unwrap();
		assert!(
			resources
				.iter()
				.any(|entry| entry["uri"] == "screenshot://login-page")
		);

		let read: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "resources/read",
			"params": { "uri": "screenshot://login-page" },
			"id": 7
		}))
		.unwrap();
		let response = owner.handle_request(read).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["result"]["contents"][0]["blob"], "aGVsbG8=");
		assert_eq!(body["result"]["contents"][0]["mimeType"], "image/png");

		let missing: JsonRpcRequest = serde_json::from_value(json!({
			"jsonrpc": "2.0",
			"method": "resources/read",
			"params": { "uri": "screenshot://never-taken" },
			"id": 8
		}))
		.unwrap();
		let response = owner.handle_request(missing).await.expect("response");
		let body = serde_json::to_value(&response).unwrap();
		assert_eq!(body["error"]["code"], -32002);
	}

	#[tokio::test]
	async fn close_is_idempotent() {
		let owner = test_owner();
		owner.close().await;
		owner.close().await;
	}
}
