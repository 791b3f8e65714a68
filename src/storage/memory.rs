//! In-memory object storage driver.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::Result;

use super::{ObjectStore, StorageSession};

/// In-memory object store. All sessions share one keyspace, keyed by the
/// full object path (`<session path>/<name>`).
pub struct MemoryStore {
    /// Base URL prepended to stored-object URIs, e.g. `test://some.host`.
    base_url: Option<String>,
    data: Arc<DashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url,
            data: Arc::new(DashMap::new()),
        }
    }

    /// Read an object by its full path, across all sessions.
    pub fn get_data(&self, key: &str) -> Option<Bytes> {
        self.data.get(key).map(|d| d.clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn new_session(&self, path: &str) -> Arc<dyn StorageSession> {
        Arc::new(MemorySession {
            path: path.to_string(),
            base_url: self.base_url.clone(),
            data: self.data.clone(),
        })
    }
}

/// A session over [`MemoryStore`], rooted at one path prefix.
pub struct MemorySession {
    path: String,
    base_url: Option<String>,
    data: Arc<DashMap<String, Bytes>>,
}

impl MemorySession {
    fn full_key(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    /// Reduce a stored-object URI back to its keyspace path.
    fn key_of_uri<'a>(&self, uri: &'a str) -> &'a str {
        if let Some(base) = &self.base_url {
            if let Some(rest) = uri.strip_prefix(base.as_str()) {
                return rest.trim_start_matches('/');
            }
        }
        uri
    }
}

#[async_trait]
impl StorageSession for MemorySession {
    async fn save_data(&self, name: &str, data: Bytes) -> Result<String> {
        let key = self.full_key(name);
        self.data.insert(key.clone(), data);
        match &self.base_url {
            Some(base) => Ok(format!("{base}/{key}")),
            None => Ok(key),
        }
    }

    async fn read_data(&self, uri: &str) -> Option<Bytes> {
        let key = self.key_of_uri(uri);
        self.data.get(key).map(|d| d.clone())
    }

    fn is_memory(&self) -> bool {
        true
    }

    fn cleanup(&self) {
        let prefix = format!("{}/", self.path);
        self.data.retain(|k, _| !k.starts_with(&prefix));
    }
}
