//! HTTP request tools.
//!
//! These run over a shared `reqwest` client owned by the session and never
//! touch the browser. Responses come back as text with the status code; a
//! non-success status is still a successful tool call.

use std::sync::Arc;

use pwmcp_protocol::mcp::CallToolResult;
use serde_json::Value;

use crate::error::{Result, ServerError};
use crate::owner::Owner;

use super::required_str;

#[derive(Clone, Copy, Debug)]
pub enum Method {
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	fn verb(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	fn has_body(self) -> bool {
		matches!(self, Method::Post | Method::Put | Method::Patch)
	}
}

pub async fn request(owner: &Arc<Owner>, method: Method, args: &Value) -> Result<CallToolResult> {
	let url = required_str(args, "url")?;
	let client = owner.api_client();

	let mut builder = match method {
		Method::Get => client.get(url),
		Method::Post => client.post(url),
		Method::Put => client.put(url),
		Method::Patch => client.patch(url),
		Method::Delete => client.delete(url),
	};

	if method.has_body() {
		let body = required_str(args, "value")?;
		let json: Value = serde_json::from_str(body)
			.map_err(|err| ServerError::Tool(format!("request body is not valid JSON: {err}")))?;
		builder = builder.json(&json);
	}

	let response = builder.send().await.map_err(ServerError::tool)?;
	let status = response.status();
	let body = response.text().await.map_err(ServerError::tool)?;

	Ok(CallToolResult::text(format!(
		"Performed {} Operation {url}\nResponse: {body}\nResponse code {status}",
		method.verb()
	)))
}
