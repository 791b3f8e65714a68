//! Per-stream playlist manager.
//!
//! Owns the storage sessions a live stream writes into. Playlist assembly
//! for playback happens elsewhere; the ingest path only needs the sessions
//! and their lifecycle.

use std::sync::Arc;

use crate::storage::StorageSession;

/// Owner of a stream's storage sessions (main + optional recording).
pub struct PlaylistManager {
    manifest_id: String,
    session: Arc<dyn StorageSession>,
    record_session: Option<Arc<dyn StorageSession>>,
}

impl PlaylistManager {
    pub fn new(
        manifest_id: impl Into<String>,
        session: Arc<dyn StorageSession>,
        record_session: Option<Arc<dyn StorageSession>>,
    ) -> Self {
        Self {
            manifest_id: manifest_id.into(),
            session,
            record_session,
        }
    }

    pub fn manifest_id(&self) -> &str {
        &self.manifest_id
    }

    /// The stream's main storage session.
    pub fn os_session(&self) -> &Arc<dyn StorageSession> {
        &self.session
    }

    /// The recording session, when recording storage is configured.
    pub fn record_session(&self) -> Option<&Arc<dyn StorageSession>> {
        self.record_session.as_ref()
    }

    /// Release both sessions.
    pub fn cleanup(&self) {
        self.session.cleanup();
        if let Some(rs) = &self.record_session {
            rs.cleanup();
        }
    }
}
