//! Browser lifecycle management over the Chrome DevTools protocol.
//!
//! One [`BrowserManager`] drives at most one browser process and one active
//! page. Launch is lazy: nothing starts until a tool needs a page. The CDP
//! event loop runs in a background task; when it ends the browser is
//! considered disconnected and the next `ensure` relaunches.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use clap::ValueEnum;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};

/// Shared sink of console/page-error lines captured from the active page.
pub type ConsoleSink = Arc<std::sync::Mutex<Vec<String>>>;

/// Supported browser engines. All speak CDP; the kind picks the executable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	#[default]
	Chromium,
	Chrome,
	Edge,
}

impl std::fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BrowserKind::Chromium => write!(f, "chromium"),
			BrowserKind::Chrome => write!(f, "chrome"),
			BrowserKind::Edge => write!(f, "edge"),
		}
	}
}

impl BrowserKind {
	/// Parses a client-supplied engine name, tolerating unknown values by
	/// falling back to chromium.
	pub fn parse_lenient(name: &str) -> Self {
		match name.to_ascii_lowercase().as_str() {
			"chrome" => BrowserKind::Chrome,
			"edge" | "msedge" => BrowserKind::Edge,
			_ => BrowserKind::Chromium,
		}
	}

	/// Locates an executable for this engine on `PATH`, when one is needed
	/// beyond the bundled default lookup.
	fn find_executable(self) -> Option<PathBuf> {
		let candidates: &[&str] = match self {
			BrowserKind::Chromium => &["chromium", "chromium-browser"],
			BrowserKind::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
			BrowserKind::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
		};
		candidates.iter().find_map(|name| which::which(name).ok())
	}
}

/// Launch-time knobs; changing `kind` or `headless` forces a relaunch.
#[derive(Clone, Debug, PartialEq)]
pub struct BrowserSettings {
	pub kind: BrowserKind,
	pub headless: bool,
	pub executable_path: Option<PathBuf>,
	pub width: u32,
	pub height: u32,
	pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
	fn default() -> Self {
		Self {
			kind: BrowserKind::default(),
			headless: false,
			executable_path: None,
			width: 1280,
			height: 720,
			user_agent: None,
		}
	}
}

struct BrowserState {
	kind: BrowserKind,
	headless: bool,
	browser: Browser,
	handler_task: JoinHandle<()>,
	disconnected: Arc<AtomicBool>,
	page: Option<Page>,
	relay_tasks: Vec<JoinHandle<()>>,
}

/// Owns the browser process and its active page for one logical session.
pub struct BrowserManager {
	state: tokio::sync::Mutex<Option<BrowserState>>,
	console: ConsoleSink,
}

impl BrowserManager {
	pub fn new(console: ConsoleSink) -> Self {
		Self {
			state: tokio::sync::Mutex::new(None),
			console,
		}
	}

	/// Returns a live page matching `settings`, launching or relaunching
	/// the browser as needed.
	///
	/// A failed attempt tears everything down and retries once from
	/// scratch; a second failure is the caller's problem.
	pub async fn ensure(&self, settings: &BrowserSettings) -> Result<Page> {
		match self.try_ensure(settings).await {
			Ok(page) => Ok(page),
			Err(err) => {
				warn!(
					target = "pwmcp.browser",
					error = %err,
					"browser ensure failed, retrying after teardown"
				);
				self.reset().await;
				self.try_ensure(settings).await
			}
		}
	}

	async fn try_ensure(&self, settings: &BrowserSettings) -> Result<Page> {
		let mut guard = self.state.lock().await;

		let must_relaunch = guard.as_ref().is_some_and(|state| {
			needs_relaunch(
				state.kind,
				state.headless,
				state.disconnected.load(Ordering::SeqCst),
				settings.kind,
				settings.headless,
			)
		});
		if must_relaunch {
			if let Some(state) = guard.take() {
				info!(
					target = "pwmcp.browser",
					from = %state.kind,
					to = %settings.kind,
					"relaunching browser"
				);
				teardown(state).await;
			}
		}

		if guard.is_none() {
			*guard = Some(self.launch(settings).await?);
		}

		let state = guard.as_mut().ok_or_else(|| {
			ServerError::BrowserLaunch("browser state missing after launch".into())
		})?;

		// Drop the cached page when its target is gone (tab closed).
		if let Some(page) = state.page.as_ref() {
			let target_id = page.target_id().clone();
			let alive = state
				.browser
				.pages()
				.await
				.map(|pages| pages.iter().any(|p| *p.target_id() == target_id))
				.unwrap_or(false);
			if !alive {
				debug!(target = "pwmcp.browser", "active page target is gone");
				for task in state.relay_tasks.drain(..) {
					task.abort();
				}
				state.page = None;
			}
		}

		if state.page.is_none() {
			let page = state
				.browser
				.new_page("about:blank")
				.await
				.map_err(|err| ServerError::BrowserLaunch(err.to_string()))?;
			state.relay_tasks = spawn_console_relays(&page, Arc::clone(&self.console)).await;
			state.page = Some(page);
		}

		state
			.page
			.clone()
			.ok_or_else(|| ServerError::BrowserLaunch("no active page".into()))
	}

	async fn launch(&self, settings: &BrowserSettings) -> Result<BrowserState> {
		let mut builder = BrowserConfig::builder().viewport(Viewport {
			width: settings.width,
			height: settings.height,
			device_scale_factor: Some(1.0),
			..Default::default()
		});
		if !settings.headless {
			builder = builder.with_head();
		}
		let executable = settings
			.executable_path
			.clone()
			.or_else(|| match settings.kind {
				BrowserKind::Chromium => None,
				kind => kind.find_executable(),
			});
		if let Some(path) = executable {
			builder = builder.chrome_executable(path);
		}
		if let Some(user_agent) = &settings.user_agent {
			builder = builder.arg(format!("--user-agent={user_agent}"));
		}
		builder = builder.arg("--no-first-run").arg("--no-default-browser-check");

		let config = builder.build().map_err(ServerError::BrowserLaunch)?;
		let (browser, mut handler) = Browser::launch(config)
			.await
			.map_err(|err| ServerError::BrowserLaunch(err.to_string()))?;

		info!(
			target = "pwmcp.browser",
			kind = %settings.kind,
			headless = settings.headless,
			"browser launched"
		);

		let disconnected = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&disconnected);
		let handler_task = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if event.is_err() {
					break;
				}
			}
			// Stream end means the process died or the connection dropped.
			flag.store(true, Ordering::SeqCst);
			debug!(target = "pwmcp.browser", "cdp event loop ended");
		});

		Ok(BrowserState {
			kind: settings.kind,
			headless: settings.headless,
			browser,
			handler_task,
			disconnected,
			page: None,
			relay_tasks: Vec::new(),
		})
	}

	/// Replaces the active page, e.g. after a popup became the page of
	/// interest. Console relays move to the new page.
	pub async fn set_active_page(&self, page: Page) {
		let mut guard = self.state.lock().await;
		if let Some(state) = guard.as_mut() {
			let _ = page.bring_to_front().await;
			for task in state.relay_tasks.drain(..) {
				task.abort();
			}
			state.relay_tasks = spawn_console_relays(&page, Arc::clone(&self.console)).await;
			state.page = Some(page);
		}
	}

	/// Forgets the browser without attempting a graceful close. Used when
	/// the connection is already known dead.
	pub async fn reset(&self) {
		if let Some(state) = self.state.lock().await.take() {
			abort_tasks(&state);
		}
	}

	/// Gracefully closes the browser if one is running.
	///
	/// Returns whether there was anything to close. Idempotent.
	pub async fn close(&self) -> bool {
		let Some(mut state) = self.state.lock().await.take() else {
			return false;
		};
		abort_tasks(&state);
		if let Err(err) = state.browser.close().await {
			debug!(target = "pwmcp.browser", error = %err, "browser close failed");
		}
		let _ = state.browser.wait().await;
		info!(target = "pwmcp.browser", "browser closed");
		true
	}

	pub fn console(&self) -> ConsoleSink {
		Arc::clone(&self.console)
	}
}

async fn teardown(state: BrowserState) {
	abort_tasks(&state);
	let mut browser = state.browser;
	if let Err(err) = browser.close().await {
		debug!(target = "pwmcp.browser", error = %err, "browser close failed during relaunch");
	}
	let _ = browser.wait().await;
}

fn abort_tasks(state: &BrowserState) {
	for task in &state.relay_tasks {
		task.abort();
	}
	state.handler_task.abort();
}

/// Pure relaunch predicate: an engine or headless-mode change, or a dead
/// connection, forces a fresh process.
fn needs_relaunch(
	current_kind: BrowserKind,
	current_headless: bool,
	disconnected: bool,
	requested_kind: BrowserKind,
	requested_headless: bool,
) -> bool {
	disconnected || current_kind != requested_kind || current_headless != requested_headless
}

/// Wires console and exception events from `page` into the shared sink.
async fn spawn_console_relays(page: &Page, console: ConsoleSink) -> Vec<JoinHandle<()>> {
	let mut tasks = Vec::with_capacity(2);

	if let Ok(mut events) = page.event_listener::<EventConsoleApiCalled>().await {
		let sink = Arc::clone(&console);
		tasks.push(tokio::spawn(async move {
			while let Some(event) = events.next().await {
				let line = format_console_event(&event);
				if let Ok(mut sink) = sink.lock() {
					sink.push(line);
				}
			}
		}));
	}

	if let Ok(mut events) = page.event_listener::<EventExceptionThrown>().await {
		tasks.push(tokio::spawn(async move {
			while let Some(event) = events.next().await {
				let details = &event.exception_details;
				let message = details
					.exception
					.as_ref()
					.and_then(|exception| exception.description.clone())
					.unwrap_or_else(|| details.text.clone());
				if let Ok(mut sink) = console.lock() {
					sink.push(format!("[pageerror] {message}"));
				}
			}
		}));
	}

	tasks
}

fn format_console_event(event: &EventConsoleApiCalled) -> String {
	let level = format!("{:?}", event.r#type).to_ascii_lowercase();
	let args: Vec<String> = event
		.args
		.iter()
		.map(|arg| {
			arg.value
				.as_ref()
				.map(|value| match value {
					serde_json::Value::String(s) => s.clone(),
					other => other.to_string(),
				})
				.or_else(|| arg.description.clone())
				.unwrap_or_else(|| "<object>".to_string())
		})
		.collect();
	format!("[{level}] {}", args.join(" "))
}

/// Shared screenshot parameter assembly for the capture tools.
pub fn screenshot_params(full_page: bool) -> ScreenshotParams {
	ScreenshotParams::builder()
		.format(CaptureScreenshotFormat::Png)
		.full_page(full_page)
		.build()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relaunch_on_engine_switch() {
		assert!(needs_relaunch(
			BrowserKind::Chromium,
			true,
			false,
			BrowserKind::Chrome,
			true
		));
	}

	#[test]
	fn relaunch_on_headless_toggle() {
		assert!(needs_relaunch(
			BrowserKind::Chromium,
			true,
			false,
			BrowserKind::Chromium,
			false
		));
	}

	#[test]
	fn relaunch_on_disconnect_even_when_settings_match() {
		assert!(needs_relaunch(
			BrowserKind::Chrome,
			true,
			true,
			BrowserKind::Chrome,
			true
		));
	}

	#[test]
	fn no_relaunch_when_settings_match_and_connected() {
		assert!(!needs_relaunch(
			BrowserKind::Edge,
			false,
			false,
			BrowserKind::Edge,
			false
		));
	}

	#[test]
	fn engine_names_parse_leniently() {
		assert_eq!(BrowserKind::parse_lenient("chrome"), BrowserKind::Chrome);
		assert_eq!(BrowserKind::parse_lenient("msedge"), BrowserKind::Edge);
		assert_eq!(BrowserKind::parse_lenient("firefox"), BrowserKind::Chromium);
		assert_eq!(BrowserKind::parse_lenient("CHROMIUM"), BrowserKind::Chromium);
	}
}
