//! HTTP ingest server: routing, stream identity, connection registry,
//! watchdogs, and the push handler.

pub mod multipart;
pub mod path;
pub mod push;
pub mod registry;
pub mod status;
pub mod watchdog;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use rand::Rng;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};
use crate::node::IngestNode;

/// Opaque identity of a live stream.
///
/// "Internal" identities key the connection registry and the storage
/// layout; "external" identities are what publishers put in the URL. The
/// two differ only when the auth webhook rewrites the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestId(String);

impl ManifestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A random identity, for streams that arrive without one.
    pub fn random() -> Self {
        Self(random_id(8))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ManifestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ManifestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Random lowercase-hex token of `bytes` bytes.
pub(crate) fn random_id(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

/// Ingest server configuration.
#[derive(Debug, Clone)]
pub struct IngestServerConfig {
    /// Bind address, host:port.
    pub bind_addr: String,
    /// Whether the HTTP push endpoint is mounted.
    pub http_ingest: bool,
}

impl Default for IngestServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8935".to_string(),
            http_ingest: true,
        }
    }
}

/// The ingest HTTP server.
pub struct IngestServer {
    config: IngestServerConfig,
    node: Arc<IngestNode>,
}

impl IngestServer {
    pub fn new(config: IngestServerConfig, node: Arc<IngestNode>) -> Self {
        Self { config, node }
    }

    /// Build the router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new().route("/status", get(status::node_status));
        if self.config.http_ingest {
            router = router.route("/live/{*path}", any(push::handle_push));
        }
        router
            .with_state(self.node.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Run until shutdown is requested through the node's cancel token.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address: {e}")))?;
        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;
        info!("ingest server listening on http://{addr}");

        let cancel = self.node.cancel.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("ingest server shutting down");
            })
            .await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.node.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IngestServerConfig::default();
        assert!(config.http_ingest);
        assert_eq!(config.bind_addr, "127.0.0.1:8935");
    }

    #[test]
    fn test_random_id_shape() {
        let id = random_id(6);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_id(6), random_id(6));
    }
}
