//! Connection registry: the process-wide map of live streams.
//!
//! Two maps live under one read-write lock: internal manifest identity to
//! connection, and external (URL-supplied) identity to internal identity.
//! Mutations hold the write lock only for map surgery; session teardown
//! happens after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::broadcast::SessionManager;
use crate::error::{Error, Result};
use crate::media::{ContainerFormat, VideoProfile};
use crate::playlist::PlaylistManager;
use crate::storage::StorageSession;

use super::ManifestId;

/// Everything identity resolution produces for a new stream, before a
/// connection exists.
pub struct StreamParameters {
    /// Internal manifest identity (webhook-assigned or URL-derived).
    pub manifest_id: ManifestId,
    /// The identity the publisher used in the URL.
    pub external_id: ManifestId,
    pub stream_key: String,
    /// Source resolution as `WxH`.
    pub resolution: String,
    /// URL-derived container format.
    pub format: ContainerFormat,
    /// Per-stream output profiles; already a private copy with formats
    /// resolved.
    pub profiles: Vec<VideoProfile>,
    /// Stream storage session, when the webhook supplied one. The factory
    /// falls back to the node storage driver.
    pub os: Option<Arc<dyn StorageSession>>,
    /// Recording storage session, when recording is configured.
    pub record_os: Option<Arc<dyn StorageSession>>,
}

/// The in-memory record for one live stream.
pub struct Connection {
    pub(crate) mid: ManifestId,
    /// External identity, when it differs from `mid`.
    pub(crate) external_id: Option<ManifestId>,
    pub(crate) stream_key: String,
    /// Random correlation nonce for logs.
    pub(crate) nonce: u64,
    pub(crate) source_profile: VideoProfile,
    pub(crate) profiles: Vec<VideoProfile>,
    pub(crate) playlist: PlaylistManager,
    pub(crate) session_manager: SessionManager,
    last_used: Mutex<Instant>,
    pub(crate) source_bytes: AtomicU64,
    pub(crate) transcoded_bytes: AtomicU64,
}

impl Connection {
    pub(crate) fn new(
        params: StreamParameters,
        playlist: PlaylistManager,
        session_manager: SessionManager,
    ) -> Self {
        let external_id = if params.external_id != params.manifest_id {
            Some(params.external_id)
        } else {
            None
        };
        let source_profile = VideoProfile {
            name: "source".to_string(),
            resolution: params.resolution,
            bitrate: "4000k".to_string(),
            framerate: 0,
            framerate_den: 0,
            profile: Default::default(),
            gop: Default::default(),
            format: params.format,
        };
        Self {
            mid: params.manifest_id,
            external_id,
            stream_key: params.stream_key,
            nonce: rand::random::<u64>(),
            source_profile,
            profiles: params.profiles,
            playlist,
            session_manager,
            last_used: Mutex::new(Instant::now()),
            source_bytes: AtomicU64::new(0),
            transcoded_bytes: AtomicU64::new(0),
        }
    }

    pub fn manifest_id(&self) -> &ManifestId {
        &self.mid
    }

    pub fn external_id(&self) -> Option<&ManifestId> {
        self.external_id.as_ref()
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn source_profile(&self) -> &VideoProfile {
        &self.source_profile
    }

    pub fn profiles(&self) -> &[VideoProfile] {
        &self.profiles
    }

    pub fn playlist(&self) -> &PlaylistManager {
        &self.playlist
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// Move `last_used` forward to now. Never moves it backwards.
    pub fn refresh_last_used(&self) {
        let now = Instant::now();
        let mut lu = self.last_used.lock();
        if now > *lu {
            *lu = now;
        }
    }

    pub fn source_bytes(&self) -> u64 {
        self.source_bytes.load(Ordering::Relaxed)
    }

    pub fn transcoded_bytes(&self) -> u64 {
        self.transcoded_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_source_bytes(&self, n: u64) {
        self.source_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_transcoded_bytes(&self, n: u64) {
        self.transcoded_bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Release everything the connection owns.
    fn teardown(&self) {
        self.session_manager.cleanup();
        self.playlist.cleanup();
    }
}

#[derive(Default)]
struct Maps {
    connections: HashMap<ManifestId, Arc<Connection>>,
    /// external identity -> internal identity
    external: HashMap<ManifestId, ManifestId>,
}

/// Outcome of a double-checked insert.
pub enum InsertOutcome {
    /// This caller's connection won the slot.
    Inserted(Arc<Connection>),
    /// A concurrent writer got there first; the loser's connection was
    /// discarded (its session manager cleaned up) and the winner returned.
    Lost(Arc<Connection>),
}

/// Process-wide registry of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    maps: RwLock<Maps>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an external identity and fetch the live connection, if any.
    /// Returns the internal identity the external one resolves to (itself
    /// when unmapped).
    pub fn lookup(&self, external: &ManifestId) -> (ManifestId, Option<Arc<Connection>>) {
        let maps = self.maps.read();
        let internal = maps.external.get(external).unwrap_or(external).clone();
        let cxn = maps.connections.get(&internal).cloned();
        (internal, cxn)
    }

    /// Fetch a connection by internal identity.
    pub fn get_internal(&self, internal: &ManifestId) -> Option<Arc<Connection>> {
        self.maps.read().connections.get(internal).cloned()
    }

    /// Whether an external binding exists.
    pub fn external_bound(&self, external: &ManifestId) -> bool {
        self.maps.read().external.contains_key(external)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.maps.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().connections.is_empty()
    }

    /// Double-checked insert. The fast-path existence check is the
    /// caller's; this is the authoritative one under the write lock.
    pub fn insert(&self, cxn: Arc<Connection>) -> InsertOutcome {
        let mid = cxn.mid.clone();
        let sessions;
        {
            let mut maps = self.maps.write();
            if let Some(old) = maps.connections.get(&mid) {
                // A concurrent registration won; discard the loser's
                // freshly built sessions outside the lock.
                let old = old.clone();
                drop(maps);
                cxn.session_manager.cleanup();
                return InsertOutcome::Lost(old);
            }
            maps.connections.insert(mid.clone(), cxn.clone());
            sessions = maps.connections.len();
        }
        info!(manifest_id = %mid, sessions, "registered connection");
        InsertOutcome::Inserted(cxn)
    }

    /// Remove a stream by external identity. Idempotent: removing an
    /// unknown identity returns [`Error::UnknownStream`].
    pub fn remove(&self, external: &ManifestId) -> Result<()> {
        let cxn;
        let internal;
        {
            let mut maps = self.maps.write();
            internal = maps.external.get(external).unwrap_or(external).clone();
            cxn = match maps.connections.remove(&internal) {
                Some(c) => c,
                None => {
                    drop(maps);
                    warn!(manifest_id = %external, "attempted to end unknown stream");
                    return Err(Error::UnknownStream);
                }
            };
            // Removal is atomic across both maps: every external binding
            // pointing at this internal identity goes with it.
            maps.external.retain(|_, v| v != &internal);
        }
        cxn.teardown();
        info!(
            manifest_id = %internal,
            external_manifest_id = %external,
            "ended stream"
        );
        Ok(())
    }

    /// Bind `external` to a live `internal` identity. An older external
    /// binding for the same internal identity is evicted; the connection
    /// itself is preserved. Returns the evicted external identity, if any.
    pub fn rebind_external(
        &self,
        external: &ManifestId,
        internal: &ManifestId,
    ) -> Result<Option<ManifestId>> {
        let mut maps = self.maps.write();
        if !maps.connections.contains_key(internal) {
            return Err(Error::UnknownStream);
        }
        let evicted = maps
            .external
            .iter()
            .find(|(k, v)| *v == internal && *k != external)
            .map(|(k, _)| k.clone());
        if let Some(old) = &evicted {
            maps.external.remove(old);
            warn!(
                old_external = %old,
                new_external = %external,
                manifest_id = %internal,
                "evicting older external binding for rebound stream"
            );
        }
        maps.external.insert(external.clone(), internal.clone());
        Ok(evicted)
    }

    /// Snapshot for status reporting: per-stream byte counters and the
    /// external-to-internal map.
    pub fn snapshot(&self) -> (Vec<(ManifestId, u64, u64)>, Vec<(ManifestId, ManifestId)>) {
        let maps = self.maps.read();
        let streams = maps
            .connections
            .values()
            .map(|c| (c.mid.clone(), c.source_bytes(), c.transcoded_bytes()))
            .collect();
        let externals = maps
            .external
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (streams, externals)
    }
}
