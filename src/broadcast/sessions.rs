//! Broadcast sessions and the per-stream session manager.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::StorageSession;

/// One known transcoding orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorInfo {
    /// Base URL of the orchestrator's transcode endpoint.
    pub transcoder: String,
}

/// Source of orchestrators for new streams. Discovery is an external
/// concern; the node only consumes the resulting list.
pub trait OrchestratorPool: Send + Sync {
    fn orchestrators(&self) -> Vec<OrchestratorInfo>;
}

/// Fixed orchestrator list, fed from configuration.
pub struct StaticOrchestratorPool {
    infos: Vec<OrchestratorInfo>,
}

impl StaticOrchestratorPool {
    pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            infos: urls
                .into_iter()
                .map(|transcoder| OrchestratorInfo { transcoder })
                .collect(),
        }
    }
}

impl OrchestratorPool for StaticOrchestratorPool {
    fn orchestrators(&self) -> Vec<OrchestratorInfo> {
        self.infos.clone()
    }
}

/// Transcode result returned by an orchestrator for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub renditions: Vec<RenditionInfo>,
}

/// One output variant of a transcoded segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenditionInfo {
    pub url: String,
    #[serde(default)]
    pub pixels: u64,
}

/// A session against one orchestrator for one stream.
#[derive(Clone)]
pub struct BroadcastSession {
    /// Orchestrator base URL.
    pub transcoder: String,
    /// Where downloaded renditions are persisted. `None` leaves renditions
    /// at the orchestrator and surfaces them as URI references.
    pub broadcaster_os: Option<Arc<dyn StorageSession>>,
}

/// Manages the broadcast sessions of one connection: selection for each
/// segment, return of healthy sessions, and teardown.
pub struct SessionManager {
    sessions: Mutex<Vec<BroadcastSession>>,
    client: reqwest::Client,
}

impl SessionManager {
    /// Build a manager from the orchestrator pool. Renditions are stored
    /// through `os` when it is memory-backed.
    pub fn new(
        pool: Option<&Arc<dyn OrchestratorPool>>,
        os: Option<Arc<dyn StorageSession>>,
    ) -> Self {
        let broadcaster_os = os.filter(|s| s.is_memory());
        let sessions = pool
            .map(|p| p.orchestrators())
            .unwrap_or_default()
            .into_iter()
            .map(|info| BroadcastSession {
                transcoder: info.transcoder,
                broadcaster_os: broadcaster_os.clone(),
            })
            .collect();
        Self::with_sessions(sessions)
    }

    /// Build a manager over an explicit session list.
    pub fn with_sessions(sessions: Vec<BroadcastSession>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default();
        Self {
            sessions: Mutex::new(sessions),
            client,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Take a session for a segment; `None` when the pool is exhausted.
    pub fn select(&self) -> Option<BroadcastSession> {
        self.sessions.lock().pop()
    }

    /// Return a session that completed its segment successfully.
    pub fn complete(&self, session: BroadcastSession) {
        self.sessions.lock().push(session);
    }

    /// Add a session to the pool.
    pub fn add(&self, session: BroadcastSession) {
        self.sessions.lock().push(session);
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drop every session. Idempotent; called when the connection is
    /// removed or loses a registration race.
    pub fn cleanup(&self) {
        self.sessions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(url: &str) -> BroadcastSession {
        BroadcastSession {
            transcoder: url.to_string(),
            broadcaster_os: None,
        }
    }

    #[test]
    fn test_select_complete_roundtrip() {
        let mgr = SessionManager::with_sessions(vec![session("http://orch")]);
        let s = mgr.select().expect("session available");
        assert!(mgr.select().is_none());
        mgr.complete(s);
        assert!(mgr.select().is_some());
    }

    #[test]
    fn test_cleanup_empties_pool() {
        let mgr = SessionManager::with_sessions(vec![session("a"), session("b")]);
        mgr.cleanup();
        assert!(mgr.is_empty());
        mgr.cleanup();
        assert!(mgr.select().is_none());
    }

    #[test]
    fn test_new_from_pool_without_memory_os() {
        let pool: Arc<dyn OrchestratorPool> =
            Arc::new(StaticOrchestratorPool::new(vec!["http://o1".to_string()]));
        let mgr = SessionManager::new(Some(&pool), None);
        let s = mgr.select().unwrap();
        assert_eq!(s.transcoder, "http://o1");
        assert!(s.broadcaster_os.is_none());
    }
}
