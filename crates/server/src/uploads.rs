//! Ingested-upload registry.
//!
//! Files posted through the upload endpoint land on disk under a private
//! per-session directory and are handed back to clients as opaque
//! `mcp-uploads://` URIs.
//! Tools later exchange those URIs for local paths, but only within the
//! session that performed the upload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::resources::remove_dir_if_empty;

/// URI schemes accepted when resolving an upload reference, tried in order.
const UPLOAD_URI_SCHEMES: [&str; 2] = ["mcp-uploads://", "mcp+upload://"];

/// One ingested file, scoped to the session that uploaded it.
#[derive(Clone, Debug)]
pub struct UploadRecord {
	pub id: String,
	pub session_id: String,
	pub file_path: PathBuf,
	pub name: String,
	pub mime_type: Option<String>,
	pub size: u64,
}

impl UploadRecord {
	/// The canonical URI handed back to the uploader.
	pub fn uri(&self) -> String {
		format!("mcp-uploads://{}/{}", self.session_id, self.id)
	}
}

struct UploadsInner {
	root: PathBuf,
	endpoint_url: Option<String>,
	uploads: HashMap<String, HashMap<String, UploadRecord>>,
}

/// Session-scoped index of uploaded files.
#[derive(Clone)]
pub struct UploadStore {
	inner: Arc<Mutex<UploadsInner>>,
}

impl Default for UploadStore {
	fn default() -> Self {
		Self::new()
	}
}

impl UploadStore {
	pub fn new() -> Self {
		Self::with_root(std::env::temp_dir().join("pwmcp").join("uploads"))
	}

	pub fn with_root(root: PathBuf) -> Self {
		Self {
			inner: Arc::new(Mutex::new(UploadsInner {
				root,
				endpoint_url: None,
				uploads: HashMap::new(),
			})),
		}
	}

	/// Directory `session_id`'s uploads are staged in, created on demand.
	pub async fn ensure_dir(&self, session_id: &str) -> crate::error::Result<PathBuf> {
		let dir = self.inner.lock().await.root.join(session_id);
		tokio::fs::create_dir_all(&dir).await?;
		Ok(dir)
	}

	/// Records an already-written file under `session_id` and returns its URI.
	pub async fn register(
		&self,
		session_id: &str,
		file_path: PathBuf,
		name: String,
		mime_type: Option<String>,
		size: u64,
	) -> UploadRecord {
		let record = UploadRecord {
			id: uuid::Uuid::new_v4().to_string(),
			session_id: session_id.to_string(),
			file_path,
			name,
			mime_type,
			size,
		};
		let mut inner = self.inner.lock().await;
		inner
			.uploads
			.entry(session_id.to_string())
			.or_default()
			.insert(record.id.clone(), record.clone());
		record
	}

	/// Exchanges an upload URI for its record.
	///
	/// Returns `None` for unparseable URIs, unknown ids, and cross-session
	/// references alike; the caller cannot distinguish "not yours" from
	/// "never existed".
	pub async fn resolve(&self, uri: &str, session_id: &str) -> Option<UploadRecord> {
		let (uri_session, id) = parse_upload_uri(uri)?;
		if uri_session != session_id {
			debug!(
				target = "pwmcp.uploads",
				session_id, "upload uri refers to a different session"
			);
			return None;
		}
		let inner = self.inner.lock().await;
		inner.uploads.get(session_id)?.get(id).cloned()
	}

	/// Drops every record for `session_id`, deletes the backing files
	/// best-effort, and removes the session directory (and the uploads
	/// root) once empty. Idempotent.
	pub async fn clear_for_session(&self, session_id: &str) {
		let (records, root) = {
			let mut inner = self.inner.lock().await;
			(inner.uploads.remove(session_id), inner.root.clone())
		};
		let Some(records) = records else {
			return;
		};
		for record in records.into_values() {
			if let Err(err) = tokio::fs::remove_file(&record.file_path).await {
				debug!(
					target = "pwmcp.uploads",
					path = %record.file_path.display(),
					error = %err,
					"failed to delete upload during session clear"
				);
			}
		}
		remove_dir_if_empty(&root.join(session_id)).await;
		remove_dir_if_empty(&root).await;
	}

	/// Removes a single upload after a tool has consumed it.
	pub async fn cleanup_upload(&self, session_id: &str, id: &str) {
		let record = {
			let mut inner = self.inner.lock().await;
			inner
				.uploads
				.get_mut(session_id)
				.and_then(|records| records.remove(id))
		};
		if let Some(record) = record {
			if let Err(err) = tokio::fs::remove_file(&record.file_path).await {
				debug!(
					target = "pwmcp.uploads",
					path = %record.file_path.display(),
					error = %err,
					"failed to delete consumed upload"
				);
			}
		}
	}

	pub async fn set_endpoint_url(&self, url: String) {
		self.inner.lock().await.endpoint_url = Some(url);
	}

	/// External URL clients should POST uploads to, when one is known.
	pub async fn endpoint_url(&self) -> Option<String> {
		self.inner.lock().await.endpoint_url.clone()
	}
}

/// Splits an upload URI into `(session_id, upload_id)`.
///
/// Both the canonical `mcp-uploads://` scheme and the legacy
/// `mcp+upload://` alias are accepted; anything without exactly two
/// non-empty path segments is rejected.
fn parse_upload_uri(uri: &str) -> Option<(&str, &str)> {
	let rest = UPLOAD_URI_SCHEMES
		.iter()
		.find_map(|scheme| uri.strip_prefix(scheme))?;
	let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
	let session = segments.next()?;
	let id = segments.next()?;
	if segments.next().is_some() {
		return None;
	}
	Some((session, id))
}

/// Sanitizes a client-supplied filename down to a single path component.
pub fn safe_filename(name: &str) -> String {
	let base = Path::new(name)
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	if base.is_empty() || base == "." || base == ".." {
		"upload.bin".to_string()
	} else {
		base
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	async fn store_with_file(dir: &TempDir, session: &str, name: &str) -> (UploadStore, UploadRecord) {
		let store = UploadStore::with_root(dir.path().join("uploads"));
		let session_dir = store.ensure_dir(session).await.unwrap();
		let path = session_dir.join(name);
		tokio::fs::write(&path, b"payload").await.unwrap();
		let record = store
			.register(session, path, name.to_string(), Some("text/plain".into()), 7)
			.await;
		(store, record)
	}

	#[tokio::test]
	async fn resolve_round_trips_canonical_uri() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;

		let found = store.resolve(&record.uri(), "s1").await.expect("record");
		assert_eq!(found.id, record.id);
		assert_eq!(found.name, "a.txt");
		assert_eq!(found.size, 7);
	}

	#[tokio::test]
	async fn resolve_accepts_legacy_scheme() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;

		let legacy = format!("mcp+upload://s1/{}", record.id);
		assert!(store.resolve(&legacy, "s1").await.is_some());
	}

	#[tokio::test]
	async fn cross_session_resolve_is_denied() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;

		assert!(store.resolve(&record.uri(), "s2").await.is_none());
	}

	#[tokio::test]
	async fn clear_for_session_removes_files_and_is_idempotent() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;
		assert!(record.file_path.exists());

		store.clear_for_session("s1").await;
		assert!(!record.file_path.exists());
		assert!(store.resolve(&record.uri(), "s1").await.is_none());
		store.clear_for_session("s1").await;
	}

	#[tokio::test]
	async fn uploads_stage_under_their_session_directory() {
		let dir = TempDir::new().unwrap();
		let store = UploadStore::with_root(dir.path().join("uploads"));

		let dir_a = store.ensure_dir("sa").await.unwrap();
		let dir_b = store.ensure_dir("sb").await.unwrap();
		assert_ne!(dir_a, dir_b);
		assert_eq!(dir_a, dir.path().join("uploads").join("sa"));
		assert!(dir_a.is_dir());
		assert!(dir_b.is_dir());
	}

	#[tokio::test]
	async fn clear_removes_empty_session_and_root_directories() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;
		let session_dir = record.file_path.parent().unwrap().to_path_buf();
		let root = session_dir.parent().unwrap().to_path_buf();

		store.clear_for_session("s1").await;
		assert!(!session_dir.exists());
		assert!(!root.exists());
	}

	#[tokio::test]
	async fn clear_keeps_other_sessions_directories() {
		let dir = TempDir::new().unwrap();
		let (store, record_a) = store_with_file(&dir, "s1", "a.txt").await;
		let path_b = store.ensure_dir("s2").await.unwrap().join("b.txt");
		tokio::fs::write(&path_b, b"other session").await.unwrap();
		store
			.register("s2", path_b.clone(), "b.txt".into(), None, 13)
			.await;

		store.clear_for_session("s1").await;
		assert!(!record_a.file_path.exists());
		// Session s2's staging is untouched, so the root must survive too.
		assert!(path_b.exists());
		assert!(path_b.parent().unwrap().is_dir());
	}

	#[tokio::test]
	async fn cleanup_upload_removes_single_record() {
		let dir = TempDir::new().unwrap();
		let (store, record) = store_with_file(&dir, "s1", "a.txt").await;

		store.cleanup_upload("s1", &record.id).await;
		assert!(!record.file_path.exists());
		assert!(store.resolve(&record.uri(), "s1").await.is_none());
	}

	#[test]
	fn parse_rejects_malformed_uris() {
		assert!(parse_upload_uri("mcp-uploads://s1/id").is_some());
		assert!(parse_upload_uri("mcp+upload://s1/id").is_some());
		assert!(parse_upload_uri("mcp-uploads://s1").is_none());
		assert!(parse_upload_uri("mcp-uploads://s1/id/extra").is_none());
		assert!(parse_upload_uri("http://s1/id").is_none());
		assert!(parse_upload_uri("mcp-uploads://").is_none());
	}

	#[test]
	fn filenames_are_reduced_to_basenames() {
		assert_eq!(safe_filename("../../etc/passwd"), "passwd");
		assert_eq!(safe_filename("report.pdf"), "report.pdf");
		assert_eq!(safe_filename(""), "upload.bin");
		assert_eq!(safe_filename(".."), "upload.bin");
	}
}
