//! Transport-session routing.
//!
//! The router owns the `session id -> owner` binding for the HTTP
//! transport. Session ids are opaque UUIDs minted at `initialize`; each maps
//! to exactly one [`Owner`] and back. Teardown cascades through the owner
//! and both stores, each step best-effort so one failure cannot leak the
//! rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::BrowserSettings;
use crate::config::ServerConfig;
use crate::owner::{Owner, OwnerId};
use crate::resources::{ResourceStore, ResourceStoreConfig};
use crate::uploads::UploadStore;

struct RouterInner {
	sessions: HashMap<String, Arc<Owner>>,
	by_owner: HashMap<OwnerId, String>,
}

/// Maps transport session ids to session owners.
#[derive(Clone)]
pub struct SessionRouter {
	inner: Arc<StdMutex<RouterInner>>,
	resources: ResourceStore,
	uploads: UploadStore,
	defaults: BrowserSettings,
}

impl SessionRouter {
	pub fn new(resources: ResourceStore, uploads: UploadStore, defaults: BrowserSettings) -> Self {
		Self {
			inner: Arc::new(StdMutex::new(RouterInner {
				sessions: HashMap::new(),
				by_owner: HashMap::new(),
			})),
			resources,
			uploads,
			defaults,
		}
	}

	/// Wires the shared resource store to this router: URI generation from
	/// the external base URL, owner-to-session resolution, and list-changed
	/// notifications fanned out through the owning session's event stream.
	pub async fn configure(&self, config: &ServerConfig) {
		let base = config.external_base_url();
		let uri_base = base.clone();
		let resolver_inner = Arc::clone(&self.inner);
		let notifier_inner = Arc::clone(&self.inner);

		self.resources
			.configure(ResourceStoreConfig {
				enabled: config.resource_links && config.port.is_some(),
				ttl_seconds: Some(config.ttl_seconds),
				uri_builder: Some(Arc::new(move |session_id, resource_id, filename| {
					Some(format!("{uri_base}/resources/{session_id}/{resource_id}/{filename}"))
				})),
				session_resolver: Some(Arc::new(move |owner| {
					resolver_inner
						.lock()
						.ok()
						.and_then(|inner| inner.by_owner.get(&owner).cloned())
				})),
				notifier: Some(Arc::new(move |owner| {
					let target = notifier_inner.lock().ok().and_then(|inner| {
						inner
							.by_owner
							.get(&owner)
							.and_then(|session_id| inner.sessions.get(session_id).cloned())
					});
					if let Some(owner) = target {
						owner.notify_resources_changed();
					}
				})),
				base_dir: None,
			})
			.await;

		self.uploads.set_endpoint_url(format!("{base}/uploads")).await;
	}

	/// Mints a new session: fresh UUID, fresh owner, both maps updated
	/// under one lock so no request can observe a half-bound session.
	pub fn create_session(&self) -> (String, Arc<Owner>) {
		let session_id = Uuid::new_v4().to_string();
		let owner = Owner::new(
			self.defaults.clone(),
			self.resources.clone(),
			self.uploads.clone(),
		);
		owner.bind_session(&session_id);

		if let Ok(mut inner) = self.inner.lock() {
			inner.sessions.insert(session_id.clone(), Arc::clone(&owner));
			inner.by_owner.insert(owner.id, session_id.clone());
		}
		info!(
			target = "pwmcp.router",
			session_id = %session_id,
			owner = %owner.id,
			"session created"
		);
		(session_id, owner)
	}

	pub fn lookup(&self, session_id: &str) -> Option<Arc<Owner>> {
		self.inner
			.lock()
			.ok()
			.and_then(|inner| inner.sessions.get(session_id).cloned())
	}

	pub fn session_for_owner(&self, owner: OwnerId) -> Option<String> {
		self.inner
			.lock()
			.ok()
			.and_then(|inner| inner.by_owner.get(&owner).cloned())
	}

	pub fn active_sessions(&self) -> usize {
		self.inner
			.lock()
			.map(|inner| inner.sessions.len())
			.unwrap_or(0)
	}

	/// Tears a session down: unbind, close the browser, clear both stores.
	///
	/// Idempotent; a second call for the same id is a silent no-op. Each
	/// step runs regardless of the previous one's outcome.
	pub async fn close_session(&self, session_id: &str) -> bool {
		let owner = {
			let Ok(mut inner) = self.inner.lock() else {
				return false;
			};
			let Some(owner) = inner.sessions.remove(session_id) else {
				return false;
			};
			inner.by_owner.remove(&owner.id);
			owner
		};

		info!(target = "pwmcp.router", session_id = %session_id, "session closing");
		owner.close().await;
		self.resources.clear_for_owner(owner.id).await;
		self.uploads.clear_for_session(session_id).await;
		true
	}

	/// Closes every live session, used at server shutdown.
	pub async fn shutdown_all(&self) {
		let session_ids: Vec<String> = self
			.inner
			.lock()
			.map(|inner| inner.sessions.keys().cloned().collect())
			.unwrap_or_default();
		if !session_ids.is_empty() {
			warn!(
				target = "pwmcp.router",
				count = session_ids.len(),
				"closing remaining sessions at shutdown"
			);
		}
		for session_id in session_ids {
			self.close_session(&session_id).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn test_router() -> SessionRouter {
		SessionRouter::new(
			ResourceStore::new(),
			UploadStore::new(),
			BrowserSettings::default(),
		)
	}

	#[tokio::test]
	async fn create_binds_both_directions() {
		let router = test_router();
		let (session_id, owner) = router.create_session();

		assert!(router.lookup(&session_id).is_some());
		assert_eq!(router.session_for_owner(owner.id), Some(session_id.clone()));
		assert_eq!(owner.session_id(), Some(session_id.as_str()));
		assert_eq!(router.active_sessions(), 1);
	}

	#[tokio::test]
	async fn session_ids_are_unique() {
		let router = test_router();
		let (a, _) = router.create_session();
		let (b, _) = router.create_session();
		assert_ne!(a, b);
		assert_eq!(router.active_sessions(), 2);
	}

	#[tokio::test]
	async fn close_session_is_idempotent() {
		let router = test_router();
		let (session_id, owner) = router.create_session();

		assert!(router.close_session(&session_id).await);
		assert!(!router.close_session(&session_id).await);
		assert!(router.lookup(&session_id).is_none());
		assert!(router.session_for_owner(owner.id).is_none());
		assert_eq!(router.active_sessions(), 0);
	}

	#[tokio::test]
	async fn close_unknown_session_is_a_noop() {
		let router = test_router();
		assert!(!router.close_session("nope").await);
	}

	#[tokio::test]
	async fn teardown_clears_stores_for_that_session_only() {
		let dir = TempDir::new().unwrap();
		let resources = ResourceStore::new();
		let uploads = UploadStore::with_root(dir.path().to_path_buf());
		let router = SessionRouter::new(resources.clone(), uploads.clone(), BrowserSettings::default());
		let config = ServerConfig {
			insecure: true,
			port: Some(8931),
			..Default::default()
		};
		router.configure(&config).await;

		let (sid_a, owner_a) = router.create_session();
		let (sid_b, owner_b) = router.create_session();

		let src = dir.path().join("src.txt");
		tokio::fs::write(&src, b"resource bytes").await.unwrap();
		let link_a = resources
			.register(owner_a.id, &src, Some("a.txt"), None, None)
			.await
			.unwrap()
			.expect("link");
		let link_b = resources
			.register(owner_b.id, &src, Some("b.txt"), None, None)
			.await
			.unwrap()
			.expect("link");
		let upload_a = uploads
			.register(&sid_a, src.clone(), "src.txt".into(), None, 14)
			.await;

		router.close_session(&sid_a).await;

		assert!(resources.read(&link_a.uri, owner_a.id).await.is_none());
		assert!(uploads.resolve(&upload_a.uri(), &sid_a).await.is_none());
		// Session B untouched.
		assert!(resources.read(&link_b.uri, owner_b.id).await.is_some());
		let _ = sid_b;
	}

	#[tokio::test]
	async fn configured_uris_point_at_download_endpoint() {
		let dir = TempDir::new().unwrap();
		let resources = ResourceStore::new();
		let router = SessionRouter::new(resources.clone(), UploadStore::new(), BrowserSettings::default());
		let config = ServerConfig {
			insecure: true,
			port: Some(8931),
			host_name: "example.test".into(),
			..Default::default()
		};
		router.configure(&config).await;

		let (sid, owner) = router.create_session();
		let src = dir.path().join("shot.png");
		tokio::fs::write(&src, b"png").await.unwrap();
		let link = resources
			.register(owner.id, &src, None, None, None)
			.await
			.unwrap()
			.expect("link");
		assert!(
			link.uri
				.starts_with(&format!("http://example.test:8931/resources/{sid}/"))
		);
		assert!(link.uri.ends_with("/shot.png"));
	}

	#[tokio::test]
	async fn shutdown_all_empties_the_router() {
		let router = test_router();
		router.create_session();
		router.create_session();
		router.shutdown_all().await;
		assert_eq!(router.active_sessions(), 0);
	}
}
