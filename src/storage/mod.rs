//! Object storage seams.
//!
//! Drivers hand out per-stream sessions; everything the ingest path persists
//! (source segments, transcoded renditions) goes through a session. Only the
//! in-memory driver lives in this crate; remote drivers are external
//! collaborators behind the same traits.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{Error, Result};

pub use memory::{MemorySession, MemoryStore};

/// An object storage driver.
pub trait ObjectStore: Send + Sync {
    /// Open a session rooted at `path`. All names saved through the session
    /// are prefixed with it.
    fn new_session(&self, path: &str) -> Arc<dyn StorageSession>;
}

/// A per-stream storage session.
#[async_trait]
pub trait StorageSession: Send + Sync {
    /// Persist `data` under the session-relative `name`; returns the URI of
    /// the stored object.
    async fn save_data(&self, name: &str, data: Bytes) -> Result<String>;

    /// Read back an object by the URI `save_data` returned. Returns `None`
    /// when the object is not resident in this session.
    async fn read_data(&self, uri: &str) -> Option<Bytes>;

    /// Whether objects saved here stay resident in process memory (and are
    /// therefore eligible for inline multipart payloads).
    fn is_memory(&self) -> bool {
        false
    }

    /// Release everything the session holds.
    fn cleanup(&self);
}

/// Resolve an object store URL to a standalone driver.
///
/// Only the `memory://` scheme is handled in process; remote drivers are
/// external collaborators and their URLs are rejected here. Unlike
/// [`MemoryStoreRegistry::resolve`], every call builds a fresh store.
pub fn parse_os_url(os_url: &str) -> Result<Arc<dyn ObjectStore>> {
    let parsed = url::Url::parse(os_url)
        .map_err(|e| Error::config(format!("invalid object store url {os_url}: {e}")))?;
    match parsed.scheme() {
        "memory" => Ok(Arc::new(MemoryStore::new(None))),
        other => Err(Error::config(format!(
            "unsupported object store scheme: {other}"
        ))),
    }
}

/// Named in-memory stores, so `memory://<name>` URLs from the auth webhook
/// resolve to the same store every time they appear.
#[derive(Default)]
pub struct MemoryStoreRegistry {
    stores: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an object store URL to a driver.
    ///
    /// Only the `memory://` scheme is handled in process; remote drivers are
    /// external collaborators and their URLs are rejected here.
    pub fn resolve(&self, os_url: &str) -> Result<Arc<dyn ObjectStore>> {
        let parsed = url::Url::parse(os_url)
            .map_err(|e| Error::config(format!("invalid object store url {os_url}: {e}")))?;
        match parsed.scheme() {
            "memory" => {
                let name = parsed.host_str().unwrap_or_default().to_string();
                if name.is_empty() {
                    return Err(Error::config(format!("invalid object store url {os_url}")));
                }
                let store = self
                    .stores
                    .entry(name)
                    .or_insert_with(|| Arc::new(MemoryStore::new(None)))
                    .clone();
                Ok(store)
            }
            other => Err(Error::config(format!(
                "unsupported object store scheme: {other}"
            ))),
        }
    }

    /// Look up a named store previously created through [`resolve`].
    pub fn get(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.stores.get(name).map(|s| s.clone())
    }
}
