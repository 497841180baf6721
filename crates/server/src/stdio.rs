//! Stdio transport: newline-delimited JSON-RPC over stdin/stdout.
//!
//! A single owner serves the whole process lifetime; there is no session
//! header and no download endpoint, so resource links stay disabled and
//! registration quietly becomes a no-op. All logging goes to stderr to keep
//! stdout clean for the protocol.

use pwmcp_protocol::jsonrpc::{ErrorCode, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::owner::Owner;
use crate::resources::{ResourceStore, ResourceStoreConfig};
use crate::uploads::UploadStore;

/// Runs the stdio transport until stdin closes.
pub async fn run(config: ServerConfig) -> crate::error::Result<()> {
	let resources = ResourceStore::new();
	resources
		.configure(ResourceStoreConfig {
			enabled: false,
			ttl_seconds: Some(config.ttl_seconds),
			..Default::default()
		})
		.await;
	let uploads = UploadStore::new();
	let owner = Owner::new(config.browser.clone(), resources.clone(), uploads.clone());
	info!(target = "pwmcp.stdio", owner = %owner.id, "stdio transport ready");

	let stdin = BufReader::new(tokio::io::stdin());
	let mut stdout = tokio::io::stdout();
	let mut lines = stdin.lines();

	while let Some(line) = lines.next_line().await? {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let response = match serde_json::from_str::<JsonRpcRequest>(line) {
			Ok(request) => owner.handle_request(request).await,
			Err(err) => {
				debug!(target = "pwmcp.stdio", error = %err, "unparseable line");
				Some(JsonRpcResponse::error(
					Value::Null,
					ErrorCode::ParseError,
					"request line is not a valid JSON-RPC message",
				))
			}
		};
		if let Some(response) = response {
			let mut payload = serde_json::to_vec(&response)?;
			payload.push(b'\n');
			stdout.write_all(&payload).await?;
			stdout.flush().await?;
		}
	}

	info!(target = "pwmcp.stdio", "stdin closed, shutting down");
	owner.close().await;
	resources.clear_for_owner(owner.id).await;
	Ok(())
}
