//! File-backed resource store with per-owner isolation and TTL expiry.
//!
//! Every registered file is copied into a private per-session directory, so
//! callers are free to delete their temp file the moment registration
//! returns. The in-memory index is authoritative; the disk is treated as a
//! cache, and filesystem errors during cleanup are swallowed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pwmcp_protocol::mcp::{ResourceContents, ResourceLink};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::owner::OwnerId;

/// Builds the externally visible URI for a resource, or `None` when linking
/// is unavailable on the current transport.
pub type ResourceUriBuilder = Arc<dyn Fn(&str, &str, &str) -> Option<String> + Send + Sync>;

/// Maps an owner back to its external session id, or `None` for owners
/// without one (stdio).
pub type SessionIdResolver = Arc<dyn Fn(OwnerId) -> Option<String> + Send + Sync>;

/// Best-effort "resource list changed" callback, fired after the owner's
/// set of live resources shrinks or grows.
pub type ListChangedNotifier = Arc<dyn Fn(OwnerId) + Send + Sync>;

const DEFAULT_TTL_SECONDS: u64 = 600;
const PREFERRED_BASE_DIR: &str = "/data";

/// Process-wide configuration applied via [`ResourceStore::configure`].
#[derive(Default)]
pub struct ResourceStoreConfig {
	pub enabled: bool,
	/// Floored to at least one second.
	pub ttl_seconds: Option<u64>,
	pub uri_builder: Option<ResourceUriBuilder>,
	pub session_resolver: Option<SessionIdResolver>,
	pub notifier: Option<ListChangedNotifier>,
	/// Overrides the preferred base directory (tests).
	pub base_dir: Option<PathBuf>,
}

/// A record plus the private storage path, for serving downloads.
#[derive(Clone, Debug)]
pub struct StoredResource {
	pub id: String,
	pub uri: String,
	pub name: String,
	pub mime_type: Option<String>,
	pub size: u64,
	pub file_path: PathBuf,
}

struct FileResource {
	id: String,
	uri: String,
	name: String,
	description: Option<String>,
	mime_type: Option<String>,
	size: u64,
	file_path: PathBuf,
	expires_at: SystemTime,
	timer: Option<AbortHandle>,
}

impl FileResource {
	fn link(&self) -> ResourceLink {
		ResourceLink {
			uri: self.uri.clone(),
			name: self.name.clone(),
			description: self.description.clone(),
			mime_type: self.mime_type.clone(),
			size: Some(self.size),
		}
	}
}

struct StoreInner {
	enabled: bool,
	ttl: Duration,
	uri_builder: Option<ResourceUriBuilder>,
	session_resolver: Option<SessionIdResolver>,
	notifier: Option<ListChangedNotifier>,
	preferred_base: PathBuf,
	base_dir: Option<PathBuf>,
	warned_fallback: bool,
	owners: HashMap<OwnerId, HashMap<String, FileResource>>,
}

/// Per-owner bookkeeping of ephemeral downloadable files.
#[derive(Clone)]
pub struct ResourceStore {
	inner: Arc<Mutex<StoreInner>>,
}

impl Default for ResourceStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ResourceStore {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(StoreInner {
				enabled: false,
				ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
				uri_builder: None,
				session_resolver: None,
				notifier: None,
				preferred_base: PathBuf::from(PREFERRED_BASE_DIR),
				base_dir: None,
				warned_fallback: false,
				owners: HashMap::new(),
			})),
		}
	}

	/// Applies process-wide configuration and sweeps already-expired entries.
	///
	/// Idempotent; safe to call before any registration.
	pub async fn configure(&self, config: ResourceStoreConfig) {
		{
			let mut inner = self.inner.lock().await;
			inner.enabled = config.enabled;
			inner.ttl =
				Duration::from_secs(config.ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS).max(1));
			inner.uri_builder = config.uri_builder;
			inner.session_resolver = config.session_resolver;
			inner.notifier = config.notifier;
			if let Some(base) = config.base_dir {
				inner.preferred_base = base;
				inner.base_dir = None;
			}
		}
		self.cleanup_expired().await;
	}

	/// Registers a file-backed resource for `owner`.
	///
	/// Returns `None` (not an error) when linking is disabled or the owner
	/// has no session id: some transports never enable linking. The source
	/// file is copied into the owner's session directory, so the caller may
	/// delete or overwrite its own path after this returns.
	pub async fn register(
		&self,
		owner: OwnerId,
		file_path: &Path,
		name: Option<&str>,
		description: Option<&str>,
		mime_type: Option<&str>,
	) -> crate::error::Result<Option<ResourceLink>> {
		let (session_id, uri_builder, ttl) = {
			let inner = self.inner.lock().await;
			if !inner.enabled {
				return Ok(None);
			}
			let Some(session_id) = inner
				.session_resolver
				.as_ref()
				.and_then(|resolve| resolve(owner))
			else {
				return Ok(None);
			};
			(session_id, inner.uri_builder.clone(), inner.ttl)
		};

		let metadata = tokio::fs::metadata(file_path).await?;
		let id = Uuid::new_v4().to_string();
		let filename = name
			.map(str::to_string)
			.or_else(|| {
				file_path
					.file_name()
					.map(|n| n.to_string_lossy().into_owned())
			})
			.unwrap_or_else(|| id.clone());
		let uri = uri_builder
			.and_then(|build| build(&session_id, &id, &filename))
			.unwrap_or_else(|| format!("mcp-resource://{id}"));
		let resolved_mime = mime_type
			.map(str::to_string)
			.or_else(|| mime_for_path(Path::new(&filename)).map(str::to_string));

		let base_dir = self.ensure_base_dir().await?;
		let session_dir = base_dir.join(&session_id);
		tokio::fs::create_dir_all(&session_dir).await?;
		let ext = Path::new(&filename)
			.extension()
			.map(|e| format!(".{}", e.to_string_lossy()))
			.unwrap_or_default();
		let storage_path = session_dir.join(format!("{id}{ext}"));
		tokio::fs::copy(file_path, &storage_path).await?;

		let expires_at = SystemTime::now() + ttl;
		let timer = self.spawn_expiry_timer(owner, id.clone(), ttl);
		let resource = FileResource {
			id: id.clone(),
			uri,
			name: filename,
			description: description.map(str::to_string),
			mime_type: resolved_mime,
			size: metadata.len(),
			file_path: storage_path,
			expires_at,
			timer: Some(timer),
		};
		let link = resource.link();

		let notifier = {
			let mut inner = self.inner.lock().await;
			inner.owners.entry(owner).or_default().insert(id, resource);
			inner.notifier.clone()
		};
		notify_list_changed(notifier.as_ref(), owner);

		Ok(Some(link))
	}

	/// Returns all live resource links for `owner`, sweeping expired
	/// entries first.
	pub async fn list(&self, owner: OwnerId) -> Vec<ResourceLink> {
		self.cleanup_expired().await;
		let inner = self.inner.lock().await;
		inner
			.owners
			.get(&owner)
			.map(|store| store.values().map(FileResource::link).collect())
			.unwrap_or_default()
	}

	/// Resolves `uri` to the contents of one of `owner`'s resources.
	///
	/// Matches by exact URI, by `mcp-resource://<id>` extraction, or by the
	/// second-to-last path segment of a parseable URL. Text MIME types come
	/// back UTF-8 decoded, everything else base64-encoded. `None` means not
	/// found; the caller decides how to signal that.
	pub async fn read(&self, uri: &str, owner: OwnerId) -> Option<ResourceContents> {
		self.cleanup_expired().await;
		let (resource_uri, mime_type, file_path) = {
			let inner = self.inner.lock().await;
			let store = inner.owners.get(&owner)?;
			let resource = store
				.values()
				.find(|resource| uri_matches(&resource.uri, &resource.id, uri))?;
			(
				resource.uri.clone(),
				resource.mime_type.clone(),
				resource.file_path.clone(),
			)
		};

		let data = tokio::fs::read(&file_path).await.ok()?;
		let mut contents = ResourceContents {
			uri: resource_uri,
			mime_type: mime_type.clone(),
			text: None,
			blob: None,
		};
		if is_text_mime(mime_type.as_deref()) {
			contents.text = Some(String::from_utf8_lossy(&data).into_owned());
		} else {
			use base64::Engine as _;
			contents.blob = Some(base64::engine::general_purpose::STANDARD.encode(&data));
		}
		Some(contents)
	}

	/// Looks up one of `owner`'s resources by id (download endpoint).
	pub async fn get_by_id(&self, owner: OwnerId, id: &str) -> Option<StoredResource> {
		self.cleanup_expired().await;
		let inner = self.inner.lock().await;
		let resource = inner.owners.get(&owner)?.get(id)?;
		Some(StoredResource {
			id: resource.id.clone(),
			uri: resource.uri.clone(),
			name: resource.name.clone(),
			mime_type: resource.mime_type.clone(),
			size: resource.size,
			file_path: resource.file_path.clone(),
		})
	}

	/// Forgets everything owned by `owner`: cancels timers, deletes backing
	/// files best-effort, and removes now-empty directories. Safe to call
	/// twice; the second call is a no-op.
	pub async fn clear_for_owner(&self, owner: OwnerId) {
		let Some(store) = self.inner.lock().await.owners.remove(&owner) else {
			return;
		};

		let mut dirs = Vec::new();
		for resource in store.into_values() {
			if let Some(timer) = resource.timer {
				timer.abort();
			}
			if let Err(err) = tokio::fs::remove_file(&resource.file_path).await {
				debug!(
					target = "pwmcp.resources",
					path = %resource.file_path.display(),
					error = %err,
					"failed to delete resource file during clear"
				);
			}
			if let Some(parent) = resource.file_path.parent() {
				if !dirs.contains(&parent.to_path_buf()) {
					dirs.push(parent.to_path_buf());
				}
			}
		}
		for dir in dirs {
			remove_dir_if_empty(&dir).await;
		}
	}

	/// Removes every expired record across all owners.
	///
	/// Runs at the top of `list`/`read`/`get_by_id` and from `configure`;
	/// the per-record timers make it a backstop rather than the only
	/// deletion path.
	pub async fn cleanup_expired(&self) {
		let now = SystemTime::now();
		let (expired, notifier) = {
			let mut inner = self.inner.lock().await;
			let mut expired: Vec<(OwnerId, FileResource)> = Vec::new();
			for (owner, store) in inner.owners.iter_mut() {
				let dead: Vec<String> = store
					.iter()
					.filter(|(_, resource)| resource.expires_at <= now)
					.map(|(id, _)| id.clone())
					.collect();
				for id in dead {
					if let Some(resource) = store.remove(&id) {
						expired.push((*owner, resource));
					}
				}
			}
			(expired, inner.notifier.clone())
		};

		let mut dirs = Vec::new();
		let mut touched_owners = Vec::new();
		for (owner, resource) in expired {
			if let Some(timer) = resource.timer {
				timer.abort();
			}
			if let Err(err) = tokio::fs::remove_file(&resource.file_path).await {
				debug!(
					target = "pwmcp.resources",
					path = %resource.file_path.display(),
					error = %err,
					"failed to delete expired resource file"
				);
			}
			if let Some(parent) = resource.file_path.parent() {
				if !dirs.contains(&parent.to_path_buf()) {
					dirs.push(parent.to_path_buf());
				}
			}
			if !touched_owners.contains(&owner) {
				touched_owners.push(owner);
			}
		}
		for dir in dirs {
			remove_dir_if_empty(&dir).await;
		}
		for owner in touched_owners {
			notify_list_changed(notifier.as_ref(), owner);
		}
	}

	fn spawn_expiry_timer(&self, owner: OwnerId, id: String, ttl: Duration) -> AbortHandle {
		let inner = Arc::clone(&self.inner);
		let task = tokio::spawn(async move {
			tokio::time::sleep(ttl).await;
			let (removed, notifier) = {
				let mut guard = inner.lock().await;
				let removed = guard
					.owners
					.get_mut(&owner)
					.and_then(|store| store.remove(&id));
				(removed, guard.notifier.clone())
			};
			if let Some(resource) = removed {
				if let Err(err) = tokio::fs::remove_file(&resource.file_path).await {
					debug!(
						target = "pwmcp.resources",
						path = %resource.file_path.display(),
						error = %err,
						"failed to delete resource file on expiry"
					);
				}
				if let Some(parent) = resource.file_path.parent() {
					remove_dir_if_empty(parent).await;
				}
				notify_list_changed(notifier.as_ref(), owner);
			}
		});
		task.abort_handle()
	}

	/// Lazily picks the storage root: the preferred directory when
	/// writable, otherwise a temp-directory subtree (warned once).
	async fn ensure_base_dir(&self) -> crate::error::Result<PathBuf> {
		let mut inner = self.inner.lock().await;
		if let Some(base) = &inner.base_dir {
			return Ok(base.clone());
		}

		let preferred = inner.preferred_base.clone();
		if dir_is_writable(&preferred).await {
			inner.base_dir = Some(preferred.clone());
			return Ok(preferred);
		}

		let fallback = std::env::temp_dir().join("pwmcp-resources");
		if !inner.warned_fallback {
			warn!(
				target = "pwmcp.resources",
				preferred = %preferred.display(),
				fallback = %fallback.display(),
				"resource base directory not writable, falling back"
			);
			inner.warned_fallback = true;
		}
		tokio::fs::create_dir_all(&fallback).await?;
		inner.base_dir = Some(fallback.clone());
		Ok(fallback)
	}
}

fn notify_list_changed(notifier: Option<&ListChangedNotifier>, owner: OwnerId) {
	// Notification failure must never fail the triggering operation; the
	// notifier itself logs and swallows internally.
	if let Some(notify) = notifier {
		notify(owner);
	}
}

async fn dir_is_writable(dir: &Path) -> bool {
	if tokio::fs::create_dir_all(dir).await.is_err() {
		return false;
	}
	let probe = dir.join(format!(".pwmcp-probe-{}", Uuid::new_v4()));
	match tokio::fs::write(&probe, b"").await {
		Ok(()) => {
			let _ = tokio::fs::remove_file(&probe).await;
			true
		}
		Err(_) => false,
	}
}

/// Removes `dir` when it has no entries left; all errors are ignored.
pub async fn remove_dir_if_empty(dir: &Path) {
	let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
		return;
	};
	if let Ok(None) = entries.next_entry().await {
		if tokio::fs::remove_dir(dir).await.is_ok() {
			debug!(target = "pwmcp.resources", dir = %dir.display(), "removed empty resource directory");
		}
	}
}

fn uri_matches(record_uri: &str, record_id: &str, query: &str) -> bool {
	if record_uri == query {
		return true;
	}
	if let Some(id) = query.strip_prefix("mcp-resource://") {
		return id == record_id;
	}
	penultimate_path_segment(query).is_some_and(|segment| segment == record_id)
}

/// Extracts the second-to-last path segment of a URL-shaped URI, the slot
/// the download endpoint puts resource ids in.
fn penultimate_path_segment(uri: &str) -> Option<&str> {
	let (_, rest) = uri.split_once("://")?;
	let parts: Vec<&str> = rest.split('/').filter(|part| !part.is_empty()).collect();
	if parts.len() >= 3 {
		Some(parts[parts.len() - 2])
	} else {
		None
	}
}

fn is_text_mime(mime: Option<&str>) -> bool {
	match mime {
		Some(mime) => {
			mime.starts_with("text/")
				|| mime == "application/json"
				|| mime == "application/javascript"
				|| mime == "application/typescript"
		}
		None => false,
	}
}

/// Extension-based MIME lookup used when registration supplies no type.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
	let ext = path.extension()?.to_str()?.to_ascii_lowercase();
	match ext.as_str() {
		"png" => Some("image/png"),
		"jpg" | "jpeg" => Some("image/jpeg"),
		"gif" => Some("image/gif"),
		"webp" => Some("image/webp"),
		"pdf" => Some("application/pdf"),
		"txt" => Some("text/plain"),
		"json" => Some("application/json"),
		"js" => Some("application/javascript"),
		"ts" => Some("application/typescript"),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use tempfile::TempDir;

	use super::*;

	fn resolver_for(owner: OwnerId, session_id: &str) -> SessionIdResolver {
		let session_id = session_id.to_string();
		Arc::new(move |candidate| (candidate == owner).then(|| session_id.clone()))
	}

	async fn enabled_store(base: &TempDir, owner: OwnerId, session_id: &str) -> ResourceStore {
		let store = ResourceStore::new();
		store
			.configure(ResourceStoreConfig {
				enabled: true,
				ttl_seconds: Some(600),
				session_resolver: Some(resolver_for(owner, session_id)),
				base_dir: Some(base.path().to_path_buf()),
				..Default::default()
			})
			.await;
		store
	}

	async fn write_source(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
		let path = dir.path().join(name);
		tokio::fs::write(&path, data).await.unwrap();
		path
	}

	#[tokio::test]
	async fn register_is_noop_when_disabled() {
		let src = TempDir::new().unwrap();
		let store = ResourceStore::new();
		let path = write_source(&src, "a.txt", b"hello").await;

		let link = store
			.register(OwnerId::next(), &path, None, None, None)
			.await
			.unwrap();
		assert!(link.is_none());
	}

	#[tokio::test]
	async fn register_without_session_id_is_noop() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let stranger = OwnerId::next();
		let store = enabled_store(&base, owner, "s1").await;
		let path = write_source(&src, "a.txt", b"hello").await;

		let link = store.register(stranger, &path, None, None, None).await.unwrap();
		assert!(link.is_none());
	}

	#[tokio::test]
	async fn register_copies_file_and_survives_source_deletion() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = enabled_store(&base, owner, "s1").await;
		let path = write_source(&src, "note.txt", b"original bytes").await;

		let link = store
			.register(owner, &path, Some("note.txt"), None, None)
			.await
			.unwrap()
			.expect("link");
		tokio::fs::remove_file(&path).await.unwrap();

		let contents = store.read(&link.uri, owner).await.expect("resource");
		assert_eq!(contents.text.as_deref(), Some("original bytes"));
		assert_eq!(link.mime_type.as_deref(), Some("text/plain"));
		assert_eq!(link.size, Some(14));
	}

	#[tokio::test]
	async fn binary_resources_round_trip_as_base64() {
		use base64::Engine as _;

		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = enabled_store(&base, owner, "s1").await;
		let payload: Vec<u8> = vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff];
		let path = write_source(&src, "shot.png", &payload).await;

		let link = store
			.register(owner, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");
		let contents = store.read(&link.uri, owner).await.expect("resource");
		assert!(contents.text.is_none());
		let decoded = base64::engine::general_purpose::STANDARD
			.decode(contents.blob.unwrap())
			.unwrap();
		assert_eq!(decoded, payload);
	}

	#[tokio::test]
	async fn lookup_under_other_owner_yields_not_found() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner_a = OwnerId::next();
		let owner_b = OwnerId::next();
		let store = ResourceStore::new();
		let resolver: SessionIdResolver = Arc::new(move |candidate| {
			if candidate == owner_a {
				Some("sa".to_string())
			} else if candidate == owner_b {
				Some("sb".to_string())
			} else {
				None
			}
		});
		store
			.configure(ResourceStoreConfig {
				enabled: true,
				session_resolver: Some(resolver),
				base_dir: Some(base.path().to_path_buf()),
				..Default::default()
			})
			.await;

		let path = write_source(&src, "a.txt", b"owned by a").await;
		let link = store
			.register(owner_a, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");

		assert!(store.read(&link.uri, owner_b).await.is_none());
		assert!(store.read(&link.uri, owner_a).await.is_some());
		assert!(store.list(owner_b).await.is_empty());
	}

	#[tokio::test]
	async fn expired_resources_disappear_and_files_are_deleted() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = ResourceStore::new();
		store
			.configure(ResourceStoreConfig {
				enabled: true,
				ttl_seconds: Some(1),
				session_resolver: Some(resolver_for(owner, "s1")),
				base_dir: Some(base.path().to_path_buf()),
				..Default::default()
			})
			.await;

		let path = write_source(&src, "short.txt", b"soon gone").await;
		let link = store
			.register(owner, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");
		assert_eq!(store.list(owner).await.len(), 1);

		let stored = store.get_by_id(owner, link_id(&store, owner).await.as_str()).await;
		let backing = stored.expect("stored").file_path;
		assert!(backing.exists());

		tokio::time::sleep(Duration::from_millis(1200)).await;
		assert!(store.list(owner).await.is_empty());
		assert!(store.read(&link.uri, owner).await.is_none());
		assert!(!backing.exists());
	}

	async fn link_id(store: &ResourceStore, owner: OwnerId) -> String {
		let inner = store.inner.lock().await;
		inner.owners[&owner].keys().next().unwrap().clone()
	}

	#[tokio::test]
	async fn same_name_registrations_stay_independent() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = enabled_store(&base, owner, "s1").await;

		let first = write_source(&src, "one.txt", b"first").await;
		let second = write_source(&src, "two.txt", b"second").await;
		let link_a = store
			.register(owner, &first, Some("report.txt"), None, None)
			.await
			.unwrap()
			.expect("link");
		let link_b = store
			.register(owner, &second, Some("report.txt"), None, None)
			.await
			.unwrap()
			.expect("link");

		assert_ne!(link_a.uri, link_b.uri);
		assert_eq!(
			store.read(&link_a.uri, owner).await.unwrap().text.as_deref(),
			Some("first")
		);
		assert_eq!(
			store.read(&link_b.uri, owner).await.unwrap().text.as_deref(),
			Some("second")
		);
	}

	#[tokio::test]
	async fn clear_for_owner_is_idempotent() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = enabled_store(&base, owner, "s1").await;
		let path = write_source(&src, "a.txt", b"bye").await;
		store
			.register(owner, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");

		store.clear_for_owner(owner).await;
		assert!(store.list(owner).await.is_empty());
		// Second call must be a silent no-op.
		store.clear_for_owner(owner).await;
	}

	#[tokio::test]
	async fn read_resolves_url_shaped_uris_by_id_segment() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let store = ResourceStore::new();
		let builder: ResourceUriBuilder = Arc::new(|sid, id, filename| {
			Some(format!("http://localhost:8931/resources/{sid}/{id}/{filename}"))
		});
		store
			.configure(ResourceStoreConfig {
				enabled: true,
				uri_builder: Some(builder),
				session_resolver: Some(resolver_for(owner, "s1")),
				base_dir: Some(base.path().to_path_buf()),
				..Default::default()
			})
			.await;

		let path = write_source(&src, "doc.txt", b"segment lookup").await;
		store
			.register(owner, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");
		let id = link_id(&store, owner).await;

		// Same id, different host: resolved via the id path segment.
		let alt = format!("http://other-host/resources/s1/{id}/doc.txt");
		assert!(store.read(&alt, owner).await.is_some());
		// Opaque scheme form also resolves.
		assert!(store.read(&format!("mcp-resource://{id}"), owner).await.is_some());
		assert!(store.read("mcp-resource://nope", owner).await.is_none());
	}

	#[tokio::test]
	async fn notifier_fires_on_register_and_expiry() {
		let base = TempDir::new().unwrap();
		let src = TempDir::new().unwrap();
		let owner = OwnerId::next();
		let count = Arc::new(AtomicUsize::new(0));
		let seen = Arc::clone(&count);
		let store = ResourceStore::new();
		store
			.configure(ResourceStoreConfig {
				enabled: true,
				ttl_seconds: Some(1),
				session_resolver: Some(resolver_for(owner, "s1")),
				notifier: Some(Arc::new(move |_| {
					seen.fetch_add(1, Ordering::SeqCst);
				})),
				base_dir: Some(base.path().to_path_buf()),
				..Default::default()
			})
			.await;

		let path = write_source(&src, "a.txt", b"notify").await;
		store
			.register(owner, &path, None, None, None)
			.await
			.unwrap()
			.expect("link");
		assert_eq!(count.load(Ordering::SeqCst), 1);

		tokio::time::sleep(Duration::from_millis(1200)).await;
		assert!(count.load(Ordering::SeqCst) >= 2);
	}

	#[test]
	fn mime_table_covers_known_extensions() {
		assert_eq!(mime_for_path(Path::new("a.PNG")), Some("image/png"));
		assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
		assert_eq!(mime_for_path(Path::new("a.pdf")), Some("application/pdf"));
		assert_eq!(mime_for_path(Path::new("a.bin")), None);
		assert_eq!(mime_for_path(Path::new("noext")), None);
	}

	#[test]
	fn penultimate_segment_requires_full_path() {
		assert_eq!(
			penultimate_path_segment("http://h/resources/s/r/f.png"),
			Some("r")
		);
		// Two segments is not enough: the id slot is second-to-last of three.
		assert_eq!(penultimate_path_segment("mcp-uploads://s/id"), None);
		assert_eq!(penultimate_path_segment("not-a-uri"), None);
		assert_eq!(penultimate_path_segment("http://h/only"), None);
	}
}
