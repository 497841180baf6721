use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error("browser launch failed: {0}")]
	BrowserLaunch(String),

	#[error("tool execution failed: {0}")]
	Tool(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl ServerError {
	/// Wraps an automation-library failure as a tool error.
	///
	/// Tool failures resolve to an error result on the wire, never a
	/// transport-level failure, so the session stays usable afterwards.
	pub fn tool(err: impl std::fmt::Display) -> Self {
		ServerError::Tool(err.to_string())
	}
}
