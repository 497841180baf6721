//! Tool catalog and dispatch.
//!
//! Every tool the server exposes is a [`ToolKind`] variant; there is no
//! dynamic registration. `tools/list` is generated from the descriptors here
//! and `tools/call` routes through [`dispatch`], which converts execution
//! failures into error-flagged tool results so the session survives them.

mod api;
mod browser;

pub use browser::filter_console_logs;

use std::sync::Arc;

use pwmcp_protocol::mcp::{CallToolResult, ToolDescriptor};
use serde_json::{Value, json};
use tracing::debug;

use crate::owner::Owner;

/// The complete tool surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
	Navigate,
	Screenshot,
	SaveAsPdf,
	Click,
	IframeClick,
	Fill,
	Select,
	Hover,
	Evaluate,
	ConsoleLogs,
	GetVisibleText,
	GetHtml,
	UploadFile,
	Close,
	ApiGet,
	ApiPost,
	ApiPut,
	ApiPatch,
	ApiDelete,
}

impl ToolKind {
	pub const ALL: [ToolKind; 19] = [
		ToolKind::Navigate,
		ToolKind::Screenshot,
		ToolKind::SaveAsPdf,
		ToolKind::Click,
		ToolKind::IframeClick,
		ToolKind::Fill,
		ToolKind::Select,
		ToolKind::Hover,
		ToolKind::Evaluate,
		ToolKind::ConsoleLogs,
		ToolKind::GetVisibleText,
		ToolKind::GetHtml,
		ToolKind::UploadFile,
		ToolKind::Close,
		ToolKind::ApiGet,
		ToolKind::ApiPost,
		ToolKind::ApiPut,
		ToolKind::ApiPatch,
		ToolKind::ApiDelete,
	];

	pub fn name(self) -> &'static str {
		match self {
			ToolKind::Navigate => "playwright_navigate",
			ToolKind::Screenshot => "playwright_screenshot",
			ToolKind::SaveAsPdf => "playwright_save_as_pdf",
			ToolKind::Click => "playwright_click",
			ToolKind::IframeClick => "playwright_iframe_click",
			ToolKind::Fill => "playwright_fill",
			ToolKind::Select => "playwright_select",
			ToolKind::Hover => "playwright_hover",
			ToolKind::Evaluate => "playwright_evaluate",
			ToolKind::ConsoleLogs => "playwright_console_logs",
			ToolKind::GetVisibleText => "playwright_get_visible_text",
			ToolKind::GetHtml => "playwright_get_visible_html",
			ToolKind::UploadFile => "playwright_upload_file",
			ToolKind::Close => "playwright_close",
			ToolKind::ApiGet => "playwright_get",
			ToolKind::ApiPost => "playwright_post",
			ToolKind::ApiPut => "playwright_put",
			ToolKind::ApiPatch => "playwright_patch",
			ToolKind::ApiDelete => "playwright_delete",
		}
	}

	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|kind| kind.name() == name)
	}

	/// Whether invoking this tool requires a live page.
	///
	/// Tools that do not touch the browser must not launch one as a side
	/// effect of being called.
	pub fn requires_browser(self) -> bool {
		!matches!(
			self,
			ToolKind::ConsoleLogs
				| ToolKind::Close
				| ToolKind::ApiGet
				| ToolKind::ApiPost
				| ToolKind::ApiPut
				| ToolKind::ApiPatch
				| ToolKind::ApiDelete
		)
	}

	pub fn descriptor(self) -> ToolDescriptor {
		let (description, input_schema) = match self {
			ToolKind::Navigate => (
				"Navigate to a URL",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to navigate to" },
						"browserType": {
							"type": "string",
							"enum": ["chromium", "chrome", "edge"],
							"description": "Browser engine to use (default: chromium)"
						},
						"width": { "type": "number", "description": "Viewport width in pixels (default: 1280)" },
						"height": { "type": "number", "description": "Viewport height in pixels (default: 720)" },
						"timeout": { "type": "number", "description": "Navigation timeout in milliseconds" },
						"headless": { "type": "boolean", "description": "Run browser headless (default: false)" }
					},
					"required": ["url"]
				}),
			),
			ToolKind::Screenshot => (
				"Take a screenshot of the current page or a specific element",
				json!({
					"type": "object",
					"properties": {
						"name": { "type": "string", "description": "Name for the screenshot" },
						"selector": { "type": "string", "description": "CSS selector for element to screenshot" },
						"fullPage": { "type": "boolean", "description": "Capture the full scrollable page (default: false)" },
						"savePng": { "type": "boolean", "description": "Register the PNG as a downloadable resource (default: true)" },
						"storeBase64": { "type": "boolean", "description": "Keep a base64 copy in memory (default: false)" }
					},
					"required": ["name"]
				}),
			),
			ToolKind::SaveAsPdf => (
				"Save the current page as a PDF resource",
				json!({
					"type": "object",
					"properties": {
						"name": { "type": "string", "description": "Name for the PDF file (default: page.pdf)" }
					}
				}),
			),
			ToolKind::Click => (
				"Click an element on the page",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string", "description": "CSS selector for the element to click" }
					},
					"required": ["selector"]
				}),
			),
			ToolKind::IframeClick => (
				"Click an element inside an iframe",
				json!({
					"type": "object",
					"properties": {
						"iframeSelector": { "type": "string", "description": "CSS selector for the iframe" },
						"selector": { "type": "string", "description": "CSS selector for the element inside the iframe" }
					},
					"required": ["iframeSelector", "selector"]
				}),
			),
			ToolKind::Fill => (
				"Fill an input field",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string", "description": "CSS selector for the input field" },
						"value": { "type": "string", "description": "Value to fill" }
					},
					"required": ["selector", "value"]
				}),
			),
			ToolKind::Select => (
				"Select an option in a select element",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string", "description": "CSS selector for the select element" },
						"value": { "type": "string", "description": "Value of the option to select" }
					},
					"required": ["selector", "value"]
				}),
			),
			ToolKind::Hover => (
				"Hover over an element",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string", "description": "CSS selector for the element to hover" }
					},
					"required": ["selector"]
				}),
			),
			ToolKind::Evaluate => (
				"Execute JavaScript in the page and return the result",
				json!({
					"type": "object",
					"properties": {
						"script": { "type": "string", "description": "JavaScript to execute" }
					},
					"required": ["script"]
				}),
			),
			ToolKind::ConsoleLogs => (
				"Retrieve console logs captured from the page",
				json!({
					"type": "object",
					"properties": {
						"type": {
							"type": "string",
							"enum": ["all", "error", "warning", "log", "info", "debug"],
							"description": "Log level to return (default: all)"
						},
						"search": { "type": "string", "description": "Only return logs containing this text" },
						"limit": { "type": "number", "description": "Maximum number of logs to return" },
						"clear": { "type": "boolean", "description": "Clear the log buffer after reading (default: false)" }
					}
				}),
			),
			ToolKind::GetVisibleText => (
				"Get the visible text content of the current page",
				json!({ "type": "object", "properties": {} }),
			),
			ToolKind::GetHtml => (
				"Get the HTML content of the current page",
				json!({ "type": "object", "properties": {} }),
			),
			ToolKind::UploadFile => (
				"Attach a previously uploaded file to a file input element",
				json!({
					"type": "object",
					"properties": {
						"selector": { "type": "string", "description": "CSS selector for the file input" },
						"uploadUri": { "type": "string", "description": "URI returned by the upload endpoint" }
					},
					"required": ["selector", "uploadUri"]
				}),
			),
			ToolKind::Close => (
				"Close the browser and release its resources",
				json!({ "type": "object", "properties": {} }),
			),
			ToolKind::ApiGet => (
				"Perform an HTTP GET request",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to request" }
					},
					"required": ["url"]
				}),
			),
			ToolKind::ApiPost => (
				"Perform an HTTP POST request with a JSON body",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to request" },
						"value": { "type": "string", "description": "JSON body to send" }
					},
					"required": ["url", "value"]
				}),
			),
			ToolKind::ApiPut => (
				"Perform an HTTP PUT request with a JSON body",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to request" },
						"value": { "type": "string", "description": "JSON body to send" }
					},
					"required": ["url", "value"]
				}),
			),
			ToolKind::ApiPatch => (
				"Perform an HTTP PATCH request with a JSON body",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to request" },
						"value": { "type": "string", "description": "JSON body to send" }
					},
					"required": ["url", "value"]
				}),
			),
			ToolKind::ApiDelete => (
				"Perform an HTTP DELETE request",
				json!({
					"type": "object",
					"properties": {
						"url": { "type": "string", "description": "URL to request" }
					},
					"required": ["url"]
				}),
			),
		};
		ToolDescriptor {
			name: self.name().to_string(),
			description: description.to_string(),
			input_schema,
		}
	}
}

/// Executes one tool call against `owner`.
///
/// Failures come back as error-flagged results, never transport errors.
pub async fn dispatch(owner: &Arc<Owner>, kind: ToolKind, args: Value) -> CallToolResult {
	debug!(
		target = "pwmcp.tools",
		owner = %owner.id,
		tool = kind.name(),
		"dispatching tool call"
	);
	let outcome = match kind {
		ToolKind::Navigate => browser::navigate(owner, &args).await,
		ToolKind::Screenshot => browser::screenshot(owner, &args).await,
		ToolKind::SaveAsPdf => browser::save_as_pdf(owner, &args).await,
		ToolKind::Click => browser::click(owner, &args).await,
		ToolKind::IframeClick => browser::iframe_click(owner, &args).await,
		ToolKind::Fill => browser::fill(owner, &args).await,
		ToolKind::Select => browser::select(owner, &args).await,
		ToolKind::Hover => browser::hover(owner, &args).await,
		ToolKind::Evaluate => browser::evaluate(owner, &args).await,
		ToolKind::ConsoleLogs => browser::console_logs(owner, &args),
		ToolKind::GetVisibleText => browser::get_visible_text(owner).await,
		ToolKind::GetHtml => browser::get_html(owner).await,
		ToolKind::UploadFile => browser::upload_file(owner, &args).await,
		ToolKind::Close => browser::close(owner).await,
		ToolKind::ApiGet => api::request(owner, api::Method::Get, &args).await,
		ToolKind::ApiPost => api::request(owner, api::Method::Post, &args).await,
		ToolKind::ApiPut => api::request(owner, api::Method::Put, &args).await,
		ToolKind::ApiPatch => api::request(owner, api::Method::Patch, &args).await,
		ToolKind::ApiDelete => api::request(owner, api::Method::Delete, &args).await,
	};
	match outcome {
		Ok(result) => result,
		Err(err) => {
			debug!(
				target = "pwmcp.tools",
				tool = kind.name(),
				error = %err,
				"tool call failed"
			);
			CallToolResult::error(format!("Error executing tool {}: {err}", kind.name()))
		}
	}
}

/// Extracts a required string argument or produces an invalid-params error.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> crate::error::Result<&'a str> {
	args.get(key)
		.and_then(Value::as_str)
		.ok_or_else(|| crate::error::ServerError::Tool(format!("missing required argument: {key}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_round_trip() {
		for kind in ToolKind::ALL {
			assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
		}
		assert_eq!(ToolKind::from_name("playwright_fly"), None);
	}

	#[test]
	fn descriptors_declare_required_fields() {
		let nav = ToolKind::Navigate.descriptor();
		assert_eq!(nav.input_schema["required"][0], "url");
		let shot = ToolKind::Screenshot.descriptor();
		assert_eq!(shot.input_schema["required"][0], "name");
	}

	#[test]
	fn api_and_log_tools_skip_browser_launch() {
		assert!(!ToolKind::ApiGet.requires_browser());
		assert!(!ToolKind::ConsoleLogs.requires_browser());
		assert!(!ToolKind::Close.requires_browser());
		assert!(ToolKind::Navigate.requires_browser());
		assert!(ToolKind::Screenshot.requires_browser());
	}

	#[test]
	fn required_str_reports_missing_key() {
		let args = json!({ "url": "https://example.com" });
		assert_eq!(required_str(&args, "url").unwrap(), "https://example.com");
		assert!(required_str(&args, "selector").is_err());
	}
}
