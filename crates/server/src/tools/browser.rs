//! Browser automation tools.
//!
//! Each function takes the owning session and the raw `arguments` object and
//! returns either a successful tool result or a `ServerError::Tool`, which
//! the dispatcher flattens into an error-flagged result.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::{
	CaptureScreenshotFormat, PrintToPdfParams,
};
use pwmcp_protocol::mcp::{CallToolResult, ToolContent};
use serde_json::Value;
use tracing::info;

use crate::browser::{BrowserKind, screenshot_params};
use crate::error::{Result, ServerError};
use crate::owner::Owner;

use super::required_str;

const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

pub async fn navigate(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let url = required_str(args, "url")?.to_string();
	owner.update_settings(|settings| {
		if let Some(kind) = args.get("browserType").and_then(Value::as_str) {
			settings.kind = BrowserKind::parse_lenient(kind);
		}
		if let Some(headless) = args.get("headless").and_then(Value::as_bool) {
			settings.headless = headless;
		}
		if let Some(width) = args.get("width").and_then(Value::as_u64) {
			settings.width = width as u32;
		}
		if let Some(height) = args.get("height").and_then(Value::as_u64) {
			settings.height = height as u32;
		}
	});

	let timeout_ms = args
		.get("timeout")
		.and_then(Value::as_u64)
		.filter(|ms| *ms > 0)
		.unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS);

	let page = owner.page().await?;
	let navigation = tokio::time::timeout(Duration::from_millis(timeout_ms), page.goto(url.clone()));
	match navigation.await {
		Ok(Ok(_)) => {
			info!(target = "pwmcp.tools", url = %url, "navigated");
			Ok(CallToolResult::text(format!("Navigated to {url}")))
		}
		Ok(Err(err)) => Err(ServerError::tool(err)),
		Err(_) => Err(ServerError::Tool(format!(
			"navigation to {url} timed out after {timeout_ms}ms"
		))),
	}
}

pub async fn screenshot(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let name = required_str(args, "name")?.to_string();
	let full_page = args.get("fullPage").and_then(Value::as_bool).unwrap_or(false);
	let save_png = args.get("savePng").and_then(Value::as_bool).unwrap_or(true);
	let store_base64 = args
		.get("storeBase64")
		.and_then(Value::as_bool)
		.unwrap_or(false);

	let page = owner.page().await?;
	let bytes = match args.get("selector").and_then(Value::as_str) {
		Some(selector) => {
			let element = page
				.find_element(selector)
				.await
				.map_err(|err| ServerError::Tool(format!("element not found: {selector} ({err})")))?;
			element
				.screenshot(CaptureScreenshotFormat::Png)
				.await
				.map_err(ServerError::tool)?
		}
		None => page
			.screenshot(screenshot_params(full_page))
			.await
			.map_err(ServerError::tool)?,
	};

	let mut result = CallToolResult::text(format!("Screenshot '{name}' taken"));

	if save_png {
		if let Some(link) = register_artifact(owner, &name, "png", &bytes).await? {
			result = result.push_text(format!("Screenshot saved as resource: {}", link.uri));
		}
	}

	if store_base64 {
		let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
		owner.store_screenshot(name.clone(), data.clone());
		result.content.push(ToolContent::Image {
			data,
			mime_type: "image/png".to_string(),
		});
	}

	Ok(result)
}

pub async fn save_as_pdf(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let name = args
		.get("name")
		.and_then(Value::as_str)
		.unwrap_or("page")
		.trim_end_matches(".pdf")
		.to_string();

	let page = owner.page().await?;
	let bytes = page
		.pdf(PrintToPdfParams::default())
		.await
		.map_err(ServerError::tool)?;

	let mut result = CallToolResult::text(format!("Saved page as {name}.pdf"));
	if let Some(link) = register_artifact(owner, &name, "pdf", &bytes).await? {
		result = result.push_text(format!("PDF saved as resource: {}", link.uri));
	}
	Ok(result)
}

/// Writes tool output to a temp file, registers it as a resource, and
/// removes the temp copy. Returns `None` when resource links are disabled.
async fn register_artifact(
	owner: &Arc<Owner>,
	name: &str,
	extension: &str,
	bytes: &[u8],
) -> Result<Option<pwmcp_protocol::mcp::ResourceLink>> {
	let dir = std::env::temp_dir().join("pwmcp").join("artifacts");
	tokio::fs::create_dir_all(&dir).await?;
	let stamp = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis())
		.unwrap_or_default();
	let path = dir.join(format!("{name}-{stamp}.{extension}"));
	tokio::fs::write(&path, bytes).await?;

	let link = owner
		.resources()
		.register(
			owner.id,
			&path,
			Some(&format!("{name}.{extension}")),
			None,
			None,
		)
		.await?;

	// The store keeps its own copy; the staging file is no longer needed.
	let _ = tokio::fs::remove_file(&path).await;
	Ok(link)
}

pub async fn click(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let selector = required_str(args, "selector")?;
	let page = owner.page().await?;
	let element = page
		.find_element(selector)
		.await
		.map_err(|err| ServerError::Tool(format!("element not found: {selector} ({err})")))?;
	element.click().await.map_err(ServerError::tool)?;
	Ok(CallToolResult::text(format!("Clicked element: {selector}")))
}

pub async fn iframe_click(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let iframe_selector = required_str(args, "iframeSelector")?;
	let selector = required_str(args, "selector")?;
	let page = owner.page().await?;

	let script = format!(
		r#"(() => {{
			const iframe = document.querySelector({iframe});
			if (!iframe) return 'iframe-not-found';
			const doc = iframe.contentDocument;
			if (!doc) return 'iframe-not-accessible';
			const el = doc.querySelector({inner});
			if (!el) return 'element-not-found';
			el.click();
			return 'ok';
		}})()"#,
		iframe = serde_json::to_string(iframe_selector)?,
		inner = serde_json::to_string(selector)?,
	);
	let outcome: String = page
		.evaluate(script)
		.await
		.map_err(ServerError::tool)?
		.into_value()
		.map_err(ServerError::tool)?;

	match outcome.as_str() {
		"ok" => Ok(CallToolResult::text(format!(
			"Clicked element {selector} inside iframe {iframe_selector}"
		))),
		"iframe-not-found" => Err(ServerError::Tool(format!("iframe not found: {iframe_selector}"))),
		"iframe-not-accessible" => Err(ServerError::Tool(format!(
			"iframe is cross-origin and not scriptable: {iframe_selector}"
		))),
		_ => Err(ServerError::Tool(format!(
			"element not found inside iframe: {selector}"
		))),
	}
}

pub async fn fill(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let selector = required_str(args, "selector")?;
	let value = required_str(args, "value")?;
	let page = owner.page().await?;
	let element = page
		.find_element(selector)
		.await
		.map_err(|err| ServerError::Tool(format!("element not found: {selector} ({err})")))?;
	element
		.click()
		.await
		.map_err(ServerError::tool)?
		.type_str(value)
		.await
		.map_err(ServerError::tool)?;
	Ok(CallToolResult::text(format!("Filled {selector} with: {value}")))
}

pub async fn select(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let selector = required_str(args, "selector")?;
	let value = required_str(args, "value")?;
	let page = owner.page().await?;

	let script = format!(
		r#"(() => {{
			const el = document.querySelector({selector});
			if (!el) return false;
			el.value = {value};
			el.dispatchEvent(new Event('input', {{ bubbles: true }}));
			el.dispatchEvent(new Event('change', {{ bubbles: true }}));
			return true;
		}})()"#,
		selector = serde_json::to_string(selector)?,
		value = serde_json::to_string(value)?,
	);
	let found: bool = page
		.evaluate(script)
		.await
		.map_err(ServerError::tool)?
		.into_value()
		.map_err(ServerError::tool)?;
	if !found {
		return Err(ServerError::Tool(format!("element not found: {selector}")));
	}
	Ok(CallToolResult::text(format!("Selected {value} in {selector}")))
}

pub async fn hover(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let selector = required_str(args, "selector")?;
	let page = owner.page().await?;

	let script = format!(
		r#"(() => {{
			const el = document.querySelector({selector});
			if (!el) return false;
			el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true }}));
			el.dispatchEvent(new MouseEvent('mouseenter', {{ bubbles: true }}));
			return true;
		}})()"#,
		selector = serde_json::to_string(selector)?,
	);
	let found: bool = page
		.evaluate(script)
		.await
		.map_err(ServerError::tool)?
		.into_value()
		.map_err(ServerError::tool)?;
	if !found {
		return Err(ServerError::Tool(format!("element not found: {selector}")));
	}
	Ok(CallToolResult::text(format!("Hovered over {selector}")))
}

pub async fn evaluate(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let script = required_str(args, "script")?;
	let page = owner.page().await?;
	let evaluation = page.evaluate(script).await.map_err(ServerError::tool)?;
	let rendered = match evaluation.value() {
		Some(value) => serde_json::to_string_pretty(value)?,
		None => "undefined".to_string(),
	};
	Ok(CallToolResult::text(format!("Execution result:\n{rendered}")))
}

/// Reads and optionally clears the captured console buffer.
///
/// Browser-free on purpose: asking for logs must never launch a browser.
pub fn console_logs(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let level = args.get("type").and_then(Value::as_str).unwrap_or("all");
	let search = args.get("search").and_then(Value::as_str);
	let limit = args
		.get("limit")
		.and_then(Value::as_u64)
		.map(|limit| limit as usize);
	let clear = args.get("clear").and_then(Value::as_bool).unwrap_or(false);

	let mut sink = owner
		.console()
		.lock()
		.map_err(|_| ServerError::Tool("console buffer poisoned".into()))?;
	let selected = filter_console_logs(&sink, level, search, limit);
	if clear {
		sink.clear();
	}
	drop(sink);

	if selected.is_empty() {
		return Ok(CallToolResult::text("No console logs matching the criteria"));
	}
	let mut text = format!("Retrieved {} console log(s):\n", selected.len());
	text.push_str(&selected.join("\n"));
	Ok(CallToolResult::text(text))
}

/// Applies level, substring, and count filters to captured console lines.
///
/// `error` also matches page errors; `limit` keeps the most recent entries.
pub fn filter_console_logs(
	logs: &[String],
	level: &str,
	search: Option<&str>,
	limit: Option<usize>,
) -> Vec<String> {
	let mut selected: Vec<String> = logs
		.iter()
		.filter(|line| match level {
			"all" => true,
			"error" => line.starts_with("[error]") || line.starts_with("[pageerror]"),
			other => line.starts_with(&format!("[{other}]")),
		})
		.filter(|line| search.is_none_or(|needle| line.contains(needle)))
		.cloned()
		.collect();
	if let Some(limit) = limit {
		if selected.len() > limit {
			selected.drain(..selected.len() - limit);
		}
	}
	selected
}

pub async fn get_visible_text(owner: &Arc<Owner>) -> Result<CallToolResult> {
	let page = owner.page().await?;
	let text: String = page
		.evaluate("document.body ? document.body.innerText : ''")
		.await
		.map_err(ServerError::tool)?
		.into_value()
		.map_err(ServerError::tool)?;
	Ok(CallToolResult::text(format!("Visible text content:\n{text}")))
}

pub async fn get_html(owner: &Arc<Owner>) -> Result<CallToolResult> {
	let page = owner.page().await?;
	let html = page.content().await.map_err(ServerError::tool)?;
	Ok(CallToolResult::text(format!("HTML content:\n{html}")))
}

pub async fn upload_file(owner: &Arc<Owner>, args: &Value) -> Result<CallToolResult> {
	let selector = required_str(args, "selector")?;
	let upload_uri = required_str(args, "uploadUri")?;
	let Some(session_id) = owner.session_id().map(str::to_string) else {
		return Err(ServerError::Tool(
			"file uploads are only available over the HTTP transport".into(),
		));
	};

	let record = owner
		.uploads()
		.resolve(upload_uri, &session_id)
		.await
		.ok_or_else(|| ServerError::Tool(format!("upload not found: {upload_uri}")))?;

	let page = owner.page().await?;
	let element = page
		.find_element(selector)
		.await
		.map_err(|err| ServerError::Tool(format!("element not found: {selector} ({err})")))?;

	let params = SetFileInputFilesParams::builder()
		.files(vec![record.file_path.to_string_lossy().into_owned()])
		.backend_node_id(element.backend_node_id)
		.build()
		.map_err(ServerError::Tool)?;
	page.execute(params).await.map_err(ServerError::tool)?;

	// The file has been handed to the page; the staged copy can go.
	owner.uploads().cleanup_upload(&session_id, &record.id).await;

	Ok(CallToolResult::text(format!(
		"Attached {} to {selector}",
		record.name
	)))
}

pub async fn close(owner: &Arc<Owner>) -> Result<CallToolResult> {
	if owner.browser().close().await {
		Ok(CallToolResult::text("Browser successfully closed"))
	} else {
		Ok(CallToolResult::text("No active browser to close"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_logs() -> Vec<String> {
		vec![
			"[log] page loaded".to_string(),
			"[error] fetch failed".to_string(),
			"[warning] deprecated api".to_string(),
			"[pageerror] TypeError: x is undefined".to_string(),
			"[info] metrics ready".to_string(),
			"[error] second failure".to_string(),
		]
	}

	#[test]
	fn level_all_returns_everything() {
		let logs = sample_logs();
		assert_eq!(filter_console_logs(&logs, "all", None, None).len(), 6);
	}

	#[test]
	fn level_error_includes_page_errors() {
		let logs = sample_logs();
		let selected = filter_console_logs(&logs, "error", None, None);
		assert_eq!(selected.len(), 3);
		assert!(selected.iter().any(|line| line.starts_with("[pageerror]")));
	}

	#[test]
	fn level_warning_is_exact() {
		let logs = sample_logs();
		let selected = filter_console_logs(&logs, "warning", None, None);
		assert_eq!(selected, vec!["[warning] deprecated api".to_string()]);
	}

	#[test]
	fn search_narrows_results() {
		let logs = sample_logs();
		let selected = filter_console_logs(&logs, "all", Some("failure"), None);
		assert_eq!(selected, vec!["[error] second failure".to_string()]);
	}

	#[test]
	fn limit_keeps_most_recent() {
		let logs = sample_logs();
		let selected = filter_console_logs(&logs, "all", None, Some(2));
		assert_eq!(
			selected,
			vec![
				"[info] metrics ready".to_string(),
				"[error] second failure".to_string(),
			]
		);
	}

	#[test]
	fn limit_larger_than_set_is_harmless() {
		let logs = sample_logs();
		assert_eq!(filter_console_logs(&logs, "all", None, Some(100)).len(), 6);
	}
}
