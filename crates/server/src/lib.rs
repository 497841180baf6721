//! Browser automation tools served over the Model Context Protocol.
//!
//! Two transports share one core: streamable HTTP (sessions keyed by the
//! `mcp-session-id` header, SSE notifications, uploads, downloadable
//! resources) and stdio (a single anonymous session). Each session owns at
//! most one browser process, driven over the Chrome DevTools protocol.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod owner;
pub mod resources;
pub mod router;
pub mod stdio;
pub mod tools;
pub mod uploads;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
