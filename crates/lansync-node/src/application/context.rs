//! The server context: every piece of mutable node state in one object.
//!
//! One `Arc<ServerContext>` is created at start-up and cloned into the HTTP
//! server, the presence sweeper, the rendezvous client and the console.
//! Nothing lives in process globals, so tests can run several independent
//! nodes side by side.
//!
//! # Locking rules
//!
//! Each domain object sits behind its own `tokio::sync::Mutex`.  Every method
//! here takes at most one of those locks at a time and never holds it across
//! disk or network I/O.  That gives each catalog/auth/presence operation the
//! "independently atomic" behaviour the request handlers rely on, and makes
//! lock-ordering deadlocks impossible.
//!
//! After a mutation that changes what the UI shows, the method releases its
//! lock and then calls [`ServerContext::publish`], which rebuilds and pushes
//! a snapshot.  Publishing is serialised by its own lock so snapshots cannot
//! be delivered out of order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use lansync_core::{
    AuthError, AuthState, CatalogError, FileCatalog, PeerRecord, PeerTable, PresenceTracker,
    ReceivedFile, ReceivedFileView, Session, SharedFile, StateSnapshot, TrackerStatus,
};

use super::broadcaster::StateBroadcaster;

/// Static policy knobs the handlers consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    pub upload_requires_auth: bool,
    pub revoke_sessions_on_rotate: bool,
    pub scratch_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<u64>,
    pub stale_after: Duration,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            upload_requires_auth: true,
            revoke_sessions_on_rotate: false,
            scratch_dir: std::env::temp_dir().join("lansync-inbox"),
            static_dir: None,
            max_upload_bytes: None,
            stale_after: Duration::from_secs(10),
        }
    }
}

/// Addresses and rendezvous health; everything the snapshot shows about
/// "who am I and how reachable am I".
#[derive(Debug, Clone)]
struct Identity {
    local_address: String,
    public_address: Option<String>,
    port: u16,
    tracker: TrackerStatus,
}

pub struct ServerContext {
    pub settings: ContextSettings,
    auth: Mutex<AuthState>,
    catalog: Mutex<FileCatalog>,
    presence: Mutex<PresenceTracker>,
    peers: Mutex<PeerTable>,
    identity: Mutex<Identity>,
    publish_lock: Mutex<()>,
    broadcaster: StateBroadcaster,
}

impl ServerContext {
    /// Creates a context with an empty catalog, no peers, and the rendezvous
    /// status set to `Disabled` until a tracker task says otherwise.
    pub fn new(settings: ContextSettings, auth: AuthState, local_address: String) -> Arc<Self> {
        let identity = Identity {
            local_address,
            public_address: None,
            port: 0,
            tracker: TrackerStatus::Disabled,
        };
        let presence = PresenceTracker::new(settings.stale_after);
        let initial = StateSnapshot {
            local_address: identity.local_address.clone(),
            public_address: None,
            shared_names: Vec::new(),
            received_files: Vec::new(),
            presence_count: 0,
            passcode: auth.passcode().value().to_string(),
            port: 0,
            peers: Vec::new(),
            rendezvous: TrackerStatus::Disabled,
        };

        Arc::new(Self {
            settings,
            auth: Mutex::new(auth),
            catalog: Mutex::new(FileCatalog::new()),
            presence: Mutex::new(presence),
            peers: Mutex::new(PeerTable::new()),
            identity: Mutex::new(identity),
            publish_lock: Mutex::new(()),
            broadcaster: StateBroadcaster::new(initial),
        })
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Assembles a snapshot from the current state.
    pub async fn snapshot(&self) -> StateSnapshot {
        let passcode = self.auth.lock().await.passcode().value().to_string();
        let (shared_names, received_files) = {
            let catalog = self.catalog.lock().await;
            let received = catalog
                .list_received()
                .iter()
                .map(ReceivedFileView::from)
                .collect();
            (catalog.list_shared_names(), received)
        };
        let presence_count = self.presence.lock().await.count();
        let peers = self.peers.lock().await.records().to_vec();
        let identity = self.identity.lock().await.clone();

        StateSnapshot {
            local_address: identity.local_address,
            public_address: identity.public_address,
            shared_names,
            received_files,
            presence_count,
            passcode,
            port: identity.port,
            peers,
            rendezvous: identity.tracker,
        }
    }

    /// Rebuilds the snapshot and pushes it if anything changed.
    pub async fn publish(&self) {
        let _guard = self.publish_lock.lock().await;
        let snapshot = self.snapshot().await;
        if self.broadcaster.publish(snapshot) {
            debug!("state snapshot published");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.broadcaster.subscribe()
    }

    // ── Auth ──────────────────────────────────────────────────────────────────

    /// Validates `supplied` and mints a session.  Sessions are not part of
    /// the snapshot, so nothing is published.
    pub async fn login(&self, supplied: &str) -> Result<Session, AuthError> {
        self.auth.lock().await.login(supplied)
    }

    pub async fn is_authenticated(&self, token: &str) -> bool {
        self.auth.lock().await.is_authenticated(token)
    }

    pub async fn passcode(&self) -> String {
        self.auth.lock().await.passcode().value().to_string()
    }

    /// Rotates the passcode, revoking sessions if configured to, and returns
    /// the new value.
    pub async fn rotate_passcode(&self) -> String {
        let value = {
            let mut auth = self.auth.lock().await;
            let value = auth.rotate_passcode().value().to_string();
            if self.settings.revoke_sessions_on_rotate {
                auth.revoke_all_sessions();
            }
            value
        };
        info!(
            revoked_sessions = self.settings.revoke_sessions_on_rotate,
            "passcode rotated"
        );
        self.publish().await;
        value
    }

    /// Pins the passcode to `value`.
    pub async fn set_passcode(&self, value: &str) -> Result<(), AuthError> {
        self.auth.lock().await.set_passcode(value)?;
        self.publish().await;
        Ok(())
    }

    // ── Presence ──────────────────────────────────────────────────────────────

    pub async fn touch_presence(&self, source_key: &str) {
        let is_new = self.presence.lock().await.touch(source_key);
        if is_new {
            debug!(source = source_key, "new client seen");
            self.publish().await;
        }
    }

    /// Evicts stale clients; returns `true` if the count changed.
    pub async fn sweep_presence(&self) -> bool {
        let changed = self.presence.lock().await.sweep();
        if changed {
            self.publish().await;
        }
        changed
    }

    pub async fn presence_count(&self) -> usize {
        self.presence.lock().await.count()
    }

    // ── Catalog ───────────────────────────────────────────────────────────────

    /// Shares `path`.  Returns `Ok(false)` if the name was already taken.
    pub async fn add_shared(
        &self,
        path: impl AsRef<Path>,
        size_bytes: Option<u64>,
    ) -> Result<bool, CatalogError> {
        let inserted = self.catalog.lock().await.add_shared(path, size_bytes)?;
        if inserted {
            self.publish().await;
        }
        Ok(inserted)
    }

    pub async fn remove_shared(&self, name: &str) -> bool {
        let removed = self.catalog.lock().await.remove_shared(name);
        if removed {
            self.publish().await;
        }
        removed
    }

    pub async fn shared_names(&self) -> Vec<String> {
        self.catalog.lock().await.list_shared_names()
    }

    pub async fn find_shared(&self, name: &str) -> Option<SharedFile> {
        self.catalog.lock().await.find_shared(name)
    }

    pub async fn record_received(
        &self,
        name: String,
        storage_path: PathBuf,
        sender: String,
    ) -> ReceivedFile {
        let file = self
            .catalog
            .lock()
            .await
            .record_received(name, storage_path, sender);
        self.publish().await;
        file
    }

    pub async fn received(&self, id: u64) -> Option<ReceivedFile> {
        self.catalog.lock().await.received(id).cloned()
    }

    pub async fn take_received(&self, id: u64) -> Result<ReceivedFile, CatalogError> {
        let file = self.catalog.lock().await.take_received(id)?;
        self.publish().await;
        Ok(file)
    }

    pub async fn received_files(&self) -> Vec<ReceivedFile> {
        self.catalog.lock().await.list_received().to_vec()
    }

    // ── Peers and identity ────────────────────────────────────────────────────

    /// Replaces the cached peer table wholesale.
    pub async fn replace_peers(&self, records: Vec<PeerRecord>) {
        let changed = self.peers.lock().await.replace(records);
        if changed {
            self.publish().await;
        }
    }

    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.peers.lock().await.records().to_vec()
    }

    pub async fn set_tracker_status(&self, status: TrackerStatus) {
        {
            let mut identity = self.identity.lock().await;
            if identity.tracker == status {
                return;
            }
            identity.tracker = status;
        }
        self.publish().await;
    }

    pub async fn tracker_status(&self) -> TrackerStatus {
        self.identity.lock().await.tracker.clone()
    }

    pub async fn set_port(&self, port: u16) {
        self.identity.lock().await.port = port;
        self.publish().await;
    }

    pub async fn port(&self) -> u16 {
        self.identity.lock().await.port
    }

    pub async fn set_local_address(&self, address: String) {
        self.identity.lock().await.local_address = address;
        self.publish().await;
    }

    pub async fn local_address(&self) -> String {
        self.identity.lock().await.local_address.clone()
    }

    pub async fn set_public_address(&self, address: Option<String>) {
        self.identity.lock().await.public_address = address;
        self.publish().await;
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
