//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::browser::{BrowserKind, BrowserSettings};
use crate::config::ServerConfig;

/// Browser automation tools over the Model Context Protocol.
#[derive(Debug, Parser)]
#[command(name = "pwmcp", version, about)]
pub struct Cli {
	/// Increase log verbosity (-v, -vv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// HTTP port to listen on; omit to use the stdio transport.
	#[arg(long)]
	pub port: Option<u16>,

	/// Address the HTTP listener binds to.
	#[arg(long, default_value = "0.0.0.0")]
	pub listen_address: String,

	/// Host name used in generated resource download URLs.
	#[arg(long, default_value = "localhost")]
	pub host_name: String,

	/// Generate http:// resource URLs instead of https://.
	#[arg(long)]
	pub insecure: bool,

	/// Seconds before a registered resource expires.
	#[arg(long, default_value_t = 600)]
	pub resource_ttl: u64,

	/// Disable downloadable resource links entirely.
	#[arg(long)]
	pub no_resource_links: bool,

	/// Browser engine to launch.
	#[arg(long, value_enum, default_value_t = BrowserKind::Chromium)]
	pub browser: BrowserKind,

	/// Run the browser headless.
	#[arg(long)]
	pub headless: bool,

	/// Explicit browser executable path.
	#[arg(long)]
	pub executable_path: Option<PathBuf>,

	/// Default viewport width in pixels.
	#[arg(long, default_value_t = 1280)]
	pub viewport_width: u32,

	/// Default viewport height in pixels.
	#[arg(long, default_value_t = 720)]
	pub viewport_height: u32,

	/// User agent override for the browser.
	#[arg(long)]
	pub user_agent: Option<String>,
}

impl Cli {
	pub fn config(&self) -> ServerConfig {
		ServerConfig {
			resource_links: !self.no_resource_links,
			ttl_seconds: self.resource_ttl,
			host_name: self.host_name.clone(),
			insecure: self.insecure,
			listen_address: self.listen_address.clone(),
			port: self.port,
			browser: BrowserSettings {
				kind: self.browser,
				headless: self.headless,
				executable_path: self.executable_path.clone(),
				width: self.viewport_width,
				height: self.viewport_height,
				user_agent: self.user_agent.clone(),
			},
		}
	}
}
