use crate::browser::BrowserSettings;

/// Recognized server configuration, assembled from CLI flags.
///
/// `port: None` selects the stdio transport; resource links are disabled
/// there because a stdio client has nothing to download from.
#[derive(Clone, Debug)]
pub struct ServerConfig {
	/// Whether registered files become downloadable resource links.
	pub resource_links: bool,
	/// Seconds before a registered resource expires (floored to 1 by the store).
	pub ttl_seconds: u64,
	/// Host name placed into generated resource URLs.
	pub host_name: String,
	/// Generate `http://` instead of `https://` resource URLs.
	pub insecure: bool,
	/// Address the HTTP listener binds to.
	pub listen_address: String,
	/// HTTP port; `None` runs the stdio transport.
	pub port: Option<u16>,
	/// Default browser settings for new sessions.
	pub browser: BrowserSettings,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			resource_links: true,
			ttl_seconds: 600,
			host_name: "localhost".to_string(),
			insecure: false,
			listen_address: "0.0.0.0".to_string(),
			port: None,
			browser: BrowserSettings::default(),
		}
	}
}

impl ServerConfig {
	/// Base URL prefix for generated download links, e.g. `https://host:1234`.
	pub fn external_base_url(&self) -> String {
		let scheme = if self.insecure { "http" } else { "https" };
		match self.port {
			Some(port) => format!("{scheme}://{}:{port}", self.host_name),
			None => format!("{scheme}://{}", self.host_name),
		}
	}
}
