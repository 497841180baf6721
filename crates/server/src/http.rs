//! Streamable-HTTP transport.
//!
//! One `/mcp` endpoint carries the protocol: POST for requests, GET for the
//! server-to-client SSE stream, DELETE for teardown. Sessions are keyed by
//! the `mcp-session-id` header minted during `initialize`. Next to it sit
//! the upload ingestion endpoint, the resource download endpoint, and a
//! health probe.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use pwmcp_protocol::jsonrpc::{ErrorCode, JsonRpcRequest, JsonRpcResponse};
use serde_json::{Value, json};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::router::SessionRouter;
use crate::uploads::safe_filename;

const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
pub struct AppState {
	pub router: SessionRouter,
	pub config: ServerConfig,
}

/// Builds the HTTP application.
pub fn app(state: AppState) -> Router {
	Router::new()
		.route(
			"/mcp",
			post(handle_mcp_post).get(handle_mcp_get).delete(handle_mcp_delete),
		)
		.route("/uploads", post(handle_upload))
		.route("/uploads/{session_id}", post(handle_upload_with_path))
		.route(
			"/resources/{session_id}/{resource_id}/{filename}",
			get(handle_download),
		)
		.route("/health", get(handle_health))
		.with_state(state)
}

/// Runs the HTTP transport until ctrl-c, then closes every session.
pub async fn serve(config: ServerConfig, router: SessionRouter) -> crate::error::Result<()> {
	let port = config.port.unwrap_or(8931);
	let address = format!("{}:{port}", config.listen_address);
	let listener = tokio::net::TcpListener::bind(&address).await?;
	info!(target = "pwmcp.http", %address, "listening");

	let state = AppState {
		router: router.clone(),
		config,
	};
	axum::serve(listener, app(state))
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
			info!(target = "pwmcp.http", "shutdown signal received");
		})
		.await?;

	router.shutdown_all().await;
	Ok(())
}

fn session_id_from(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
	headers
		.get(SESSION_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(str::to_string)
		.or_else(|| query.get("sessionId").cloned())
}

fn rpc_error(status: StatusCode, code: ErrorCode, message: &str) -> Response {
	let body = JsonRpcResponse::error(Value::Null, code, message);
	(status, axum::Json(body)).into_response()
}

async fn handle_mcp_post(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let request: JsonRpcRequest = match serde_json::from_slice(&body) {
		Ok(request) => request,
		Err(err) => {
			debug!(target = "pwmcp.http", error = %err, "unparseable request body");
			return rpc_error(
				StatusCode::BAD_REQUEST,
				ErrorCode::ParseError,
				"request body is not a valid JSON-RPC message",
			);
		}
	};

	// An existing session id always routes to its owner, even for a
	// re-initialize: the client keeps its session.
	if let Some(session_id) = session_id_from(&headers, &query) {
		let Some(owner) = state.router.lookup(&session_id) else {
			return rpc_error(
				StatusCode::BAD_REQUEST,
				ErrorCode::InvalidSession,
				"unknown or expired session",
			);
		};
		return match owner.handle_request(request).await {
			Some(response) => axum::Json(response).into_response(),
			None => StatusCode::ACCEPTED.into_response(),
		};
	}

	if !request.is_initialize() {
		return rpc_error(
			StatusCode::BAD_REQUEST,
			ErrorCode::InvalidSession,
			"no valid session: send an initialize request first",
		);
	}

	let (session_id, owner) = state.router.create_session();
	let response = owner.handle_request(request).await;
	let mut http_response = match response {
		Some(response) => axum::Json(response).into_response(),
		None => StatusCode::ACCEPTED.into_response(),
	};
	match session_id.parse() {
		Ok(value) => {
			http_response.headers_mut().insert(SESSION_HEADER, value);
		}
		Err(err) => {
			error!(target = "pwmcp.http", error = %err, "session id not header-safe");
		}
	}
	http_response
}

async fn handle_mcp_get(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	headers: HeaderMap,
) -> Response {
	let Some(session_id) = session_id_from(&headers, &query) else {
		return rpc_error(
			StatusCode::BAD_REQUEST,
			ErrorCode::InvalidSession,
			"missing session id",
		);
	};
	let Some(owner) = state.router.lookup(&session_id) else {
		return rpc_error(
			StatusCode::BAD_REQUEST,
			ErrorCode::InvalidSession,
			"unknown or expired session",
		);
	};

	debug!(target = "pwmcp.http", session_id = %session_id, "notification stream attached");
	let stream = BroadcastStream::new(owner.subscribe_events()).filter_map(|item| async {
		match item {
			Ok(payload) => Some(Ok::<_, Infallible>(
				Event::default().event("message").data(payload),
			)),
			// A lagged receiver just skips missed notifications.
			Err(_) => None,
		}
	});
	Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn handle_mcp_delete(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	headers: HeaderMap,
) -> Response {
	let Some(session_id) = session_id_from(&headers, &query) else {
		return rpc_error(
			StatusCode::BAD_REQUEST,
			ErrorCode::InvalidSession,
			"missing session id",
		);
	};
	if state.router.close_session(&session_id).await {
		StatusCode::OK.into_response()
	} else {
		rpc_error(
			StatusCode::BAD_REQUEST,
			ErrorCode::InvalidSession,
			"unknown or expired session",
		)
	}
}

async fn handle_upload_with_path(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
	request: Request,
) -> Response {
	ingest_upload(state, session_id, request).await
}

async fn handle_upload(
	State(state): State<AppState>,
	Query(query): Query<HashMap<String, String>>,
	request: Request,
) -> Response {
	let session_id = request
		.headers()
		.get(SESSION_HEADER)
		.and_then(|value| value.to_str().ok())
		.map(str::to_string)
		.or_else(|| query.get("sessionId").cloned());
	let Some(session_id) = session_id else {
		return upload_error(StatusCode::BAD_REQUEST, "missing session id");
	};
	ingest_upload(state, session_id, request).await
}

fn upload_error(status: StatusCode, message: &str) -> Response {
	(status, axum::Json(json!({ "error": message }))).into_response()
}

/// Streams one multipart file field to disk and registers it.
///
/// Partial writes are unlinked on failure so an aborted upload leaves
/// nothing behind.
async fn ingest_upload(state: AppState, session_id: String, request: Request) -> Response {
	let Some(owner) = state.router.lookup(&session_id) else {
		return upload_error(StatusCode::BAD_REQUEST, "unknown or expired session");
	};

	let is_multipart = request
		.headers()
		.get(header::CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|value| value.starts_with("multipart/form-data"));
	if !is_multipart {
		return upload_error(
			StatusCode::UNSUPPORTED_MEDIA_TYPE,
			"uploads must be multipart/form-data",
		);
	}

	let mut multipart = match Multipart::from_request(request, &()).await {
		Ok(multipart) => multipart,
		Err(err) => {
			debug!(target = "pwmcp.http", error = %err, "rejecting malformed multipart body");
			return upload_error(StatusCode::BAD_REQUEST, "malformed multipart body");
		}
	};

	let upload_dir = match owner.uploads().ensure_dir(&session_id).await {
		Ok(dir) => dir,
		Err(err) => {
			error!(target = "pwmcp.http", error = %err, "upload directory unavailable");
			return upload_error(StatusCode::INTERNAL_SERVER_ERROR, "upload storage unavailable");
		}
	};

	loop {
		let field = match multipart.next_field().await {
			Ok(Some(field)) => field,
			Ok(None) => break,
			Err(err) => {
				debug!(target = "pwmcp.http", error = %err, "multipart stream error");
				return upload_error(StatusCode::BAD_REQUEST, "malformed multipart body");
			}
		};
		let Some(original_name) = field.file_name().map(safe_filename) else {
			// Not a file field, skip it.
			continue;
		};
		let mime_type = field.content_type().map(str::to_string);
		let staged_path = upload_dir.join(format!("{}_{original_name}", Uuid::new_v4()));

		let mut file = match tokio::fs::File::create(&staged_path).await {
			Ok(file) => file,
			Err(err) => {
				error!(target = "pwmcp.http", error = %err, "failed to stage upload");
				return upload_error(StatusCode::INTERNAL_SERVER_ERROR, "upload storage unavailable");
			}
		};

		let mut size: u64 = 0;
		let mut field = field;
		loop {
			match field.chunk().await {
				Ok(Some(chunk)) => {
					use tokio::io::AsyncWriteExt;
					if let Err(err) = file.write_all(&chunk).await {
						error!(target = "pwmcp.http", error = %err, "write failed mid-upload");
						drop(file);
						let _ = tokio::fs::remove_file(&staged_path).await;
						return upload_error(
							StatusCode::INTERNAL_SERVER_ERROR,
							"upload storage unavailable",
						);
					}
					size += chunk.len() as u64;
				}
				Ok(None) => break,
				Err(err) => {
					warn!(target = "pwmcp.http", error = %err, "upload aborted mid-stream");
					drop(file);
					let _ = tokio::fs::remove_file(&staged_path).await;
					return upload_error(StatusCode::BAD_REQUEST, "upload aborted");
				}
			}
		}

		let record = owner
			.uploads()
			.register(&session_id, staged_path, original_name, mime_type, size)
			.await;
		info!(
			target = "pwmcp.http",
			session_id = %session_id,
			name = %record.name,
			size = record.size,
			"upload ingested"
		);
		return (
			StatusCode::OK,
			axum::Json(json!({
				"resourceUri": record.uri(),
				"name": record.name,
				"mimeType": record.mime_type,
				"size": record.size,
			})),
		)
			.into_response();
	}

	upload_error(StatusCode::BAD_REQUEST, "no file field in upload")
}

async fn handle_download(
	State(state): State<AppState>,
	Path((session_id, resource_id, _filename)): Path<(String, String, String)>,
) -> Response {
	let Some(owner) = state.router.lookup(&session_id) else {
		return StatusCode::NOT_FOUND.into_response();
	};
	let Some(resource) = owner.resources().get_by_id(owner.id, &resource_id).await else {
		return StatusCode::NOT_FOUND.into_response();
	};

	let file = match tokio::fs::File::open(&resource.file_path).await {
		Ok(file) => file,
		Err(err) => {
			error!(
				target = "pwmcp.http",
				path = %resource.file_path.display(),
				error = %err,
				"resource file missing on disk"
			);
			return StatusCode::INTERNAL_SERVER_ERROR.into_response();
		}
	};

	let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
	let headers = response.headers_mut();
	if let Some(mime) = resource.mime_type.as_deref() {
		if let Ok(value) = mime.parse() {
			headers.insert(header::CONTENT_TYPE, value);
		}
	}
	if let Ok(value) = resource.size.to_string().parse() {
		headers.insert(header::CONTENT_LENGTH, value);
	}
	if let Ok(value) = format!("inline; filename=\"{}\"", resource.name).parse() {
		headers.insert(header::CONTENT_DISPOSITION, value);
	}
	response
}

async fn handle_health(State(state): State<AppState>) -> Response {
	axum::Json(json!({
		"status": "ok",
		"version": env!("CARGO_PKG_VERSION"),
		"activeSessions": state.router.active_sessions(),
	}))
	.into_response()
}
