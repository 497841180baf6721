//! Tracing setup.
//!
//! Logs go to stderr so the stdio transport can own stdout. `RUST_LOG`
//! overrides the verbosity-derived default filter when set.

use tracing_subscriber::EnvFilter;

pub fn init_logging(verbosity: u8) {
	let default_filter = match verbosity {
		0 => "info,chromiumoxide=off,hyper=warn",
		1 => "debug,chromiumoxide=warn,hyper=info",
		_ => "trace,chromiumoxide=debug",
	};
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.compact()
		.init();
}
