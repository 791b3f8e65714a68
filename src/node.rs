//! Node-wide state: configuration, storage drivers, the connection
//! registry, and the connection factory.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::auth::AuthWebhook;
use crate::broadcast::{OrchestratorPool, SessionManager};
use crate::error::{Error, Result};
use crate::media::{default_broadcast_profiles, VideoProfile};
use crate::playlist::PlaylistManager;
use crate::server::path::ParsedPath;
use crate::server::registry::{Connection, ConnectionRegistry, InsertOutcome, StreamParameters};
use crate::server::{random_id, ManifestId};
use crate::storage::{MemoryStoreRegistry, ObjectStore, StorageSession};

/// Length in bytes of generated stream keys.
const STREAM_KEY_BYTES: usize = 6;

/// Construction parameters for [`IngestNode`].
pub struct NodeConfig {
    /// Identity of this node in recording layouts.
    pub node_id: String,
    /// Default output profile set. Read-only during request handling;
    /// every stream gets its own copy.
    pub default_profiles: Vec<VideoProfile>,
    /// Default object storage driver. Registration fails without one
    /// unless the webhook supplies a store.
    pub storage: Option<Arc<dyn ObjectStore>>,
    /// Recording storage driver.
    pub record_storage: Option<Arc<dyn ObjectStore>>,
    /// Auth webhook URL.
    pub auth_webhook_url: Option<String>,
    /// Orchestrator pool for new streams.
    pub orchestrators: Option<Arc<dyn OrchestratorPool>>,
    /// Inactivity window before a connection is reaped.
    pub push_timeout: Duration,
    /// Maximum concurrent sessions; 0 means unlimited.
    pub max_sessions: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: random_id(4),
            default_profiles: default_broadcast_profiles(),
            storage: None,
            record_storage: None,
            auth_webhook_url: None,
            orchestrators: None,
            push_timeout: Duration::from_secs(60),
            max_sessions: 0,
        }
    }
}

/// Shared state of the broadcaster node.
pub struct IngestNode {
    pub node_id: String,
    pub default_profiles: Vec<VideoProfile>,
    pub storage: Option<Arc<dyn ObjectStore>>,
    pub record_storage: Option<Arc<dyn ObjectStore>>,
    pub auth_webhook: Option<AuthWebhook>,
    pub orchestrators: Option<Arc<dyn OrchestratorPool>>,
    pub push_timeout: Duration,
    pub max_sessions: usize,
    pub registry: ConnectionRegistry,
    /// Named in-memory stores for webhook-supplied `memory://` URLs.
    pub mem_stores: MemoryStoreRegistry,
    /// Node-wide shutdown signal.
    pub cancel: CancellationToken,
}

impl IngestNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            node_id: config.node_id,
            default_profiles: config.default_profiles,
            storage: config.storage,
            record_storage: config.record_storage,
            auth_webhook: config.auth_webhook_url.map(AuthWebhook::new),
            orchestrators: config.orchestrators,
            push_timeout: config.push_timeout,
            max_sessions: config.max_sessions,
            registry: ConnectionRegistry::new(),
            mem_stores: MemoryStoreRegistry::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve a stream's identity, profile set, and storage sessions.
    ///
    /// Runs the auth webhook when one is configured; the webhook may
    /// rewrite the identity, supply profiles, and point the stream at its
    /// own object stores.
    pub async fn resolve_stream_params(
        &self,
        request_url: &str,
        parsed: &ParsedPath,
        resolution: &str,
    ) -> Result<StreamParameters> {
        let auth = match &self.auth_webhook {
            Some(hook) => hook.authenticate(request_url).await?,
            None => None,
        };

        let mut manifest_id = ManifestId::new("");
        let mut stream_key = String::new();
        let mut profiles: Vec<VideoProfile> = Vec::new();
        let mut use_defaults = true;
        let mut os: Option<Arc<dyn StorageSession>> = None;
        let mut record_store: Option<Arc<dyn ObjectStore>> = None;

        if let Some(auth) = &auth {
            manifest_id = ManifestId::from(auth.manifest_id.as_str());
            stream_key = auth.stream_key.clone();
            profiles = auth.resolve_profiles()?;
            // Defaults apply only when the webhook named neither a preset
            // nor a profile.
            use_defaults = auth.presets.is_empty() && auth.profiles.is_empty();
            if !auth.object_store.is_empty() {
                let store = self.mem_stores.resolve(&auth.object_store)?;
                os = Some(store.new_session(manifest_id.as_str()));
            }
            if !auth.record_object_store.is_empty() {
                record_store = Some(self.mem_stores.resolve(&auth.record_object_store)?);
            }
        }

        if manifest_id.is_empty() {
            manifest_id = parsed.manifest_id.clone();
            stream_key = parsed.stream_key.clone();
        }
        if manifest_id.is_empty() {
            manifest_id = ManifestId::random();
        }
        if stream_key.is_empty() {
            stream_key = random_id(STREAM_KEY_BYTES);
        }

        // Recording layout is keyed by the identity the publisher used.
        let record_path = format!("{}/{}", parsed.manifest_id, self.node_id);
        let record_os = match record_store.or_else(|| self.record_storage.clone()) {
            Some(store) => Some(store.new_session(&record_path)),
            None => None,
        };

        if self.max_sessions > 0 && self.registry.len() >= self.max_sessions {
            return Err(Error::validation(format!(
                "too many sessions (max {})",
                self.max_sessions
            )));
        }

        // Deep copy before format propagation so the shared default set is
        // never mutated.
        let mut profiles = if use_defaults {
            self.default_profiles.clone()
        } else {
            profiles
        };
        for profile in &mut profiles {
            if profile.format == crate::media::ContainerFormat::None {
                profile.format = parsed.format;
            }
        }

        let resolution = if resolution.is_empty() {
            "0x0".to_string()
        } else {
            resolution.to_string()
        };

        Ok(StreamParameters {
            manifest_id,
            external_id: parsed.manifest_id.clone(),
            stream_key,
            resolution,
            format: parsed.format,
            profiles,
            os,
            record_os,
        })
    }

    /// Allocate (or reuse) the connection for a stream.
    ///
    /// Returns the live connection plus whether this call created it.
    /// Registration races are recovered here: the loser's sessions are
    /// discarded and the winner's connection returned.
    pub fn register_connection(
        &self,
        params: StreamParameters,
    ) -> Result<(Arc<Connection>, bool)> {
        let mid = params.manifest_id.clone();

        // Fast path: creating sessions takes time, skip it when the stream
        // is already live.
        if let Some(old) = self.registry.get_internal(&mid) {
            return Ok((old, false));
        }

        let os = match params.os.clone() {
            Some(os) => os,
            None => match &self.storage {
                Some(driver) => driver.new_session(mid.as_str()),
                None => {
                    error!("missing node storage");
                    return Err(Error::Storage);
                }
            },
        };
        let playlist = PlaylistManager::new(mid.as_str(), os.clone(), params.record_os.clone());
        let session_manager = SessionManager::new(self.orchestrators.as_ref(), Some(os));
        let cxn = Arc::new(Connection::new(params, playlist, session_manager));

        match self.registry.insert(cxn) {
            InsertOutcome::Inserted(cxn) => Ok((cxn, true)),
            InsertOutcome::Lost(winner) => Ok((winner, false)),
        }
    }

    /// End a stream by external identity. Idempotent.
    pub fn remove_stream(&self, external: &ManifestId) -> Result<()> {
        self.registry.remove(external)
    }
}
