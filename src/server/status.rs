//! Node status route.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::node::IngestNode;

/// Per-stream byte counters.
#[derive(Debug, Serialize)]
pub struct StreamInfo {
    #[serde(rename = "sourceBytes")]
    pub source_bytes: u64,
    #[serde(rename = "transcodedBytes")]
    pub transcoded_bytes: u64,
}

/// Status document for `GET /status`.
#[derive(Debug, Serialize)]
pub struct NodeStatus {
    pub version: String,
    pub manifests: Vec<String>,
    #[serde(rename = "internalManifests")]
    pub internal_manifests: BTreeMap<String, String>,
    #[serde(rename = "streamInfo")]
    pub stream_info: BTreeMap<String, StreamInfo>,
}

pub async fn node_status(State(node): State<Arc<IngestNode>>) -> Json<NodeStatus> {
    let (streams, externals) = node.registry.snapshot();
    let mut manifests = Vec::with_capacity(streams.len());
    let mut stream_info = BTreeMap::new();
    for (mid, source_bytes, transcoded_bytes) in streams {
        manifests.push(mid.to_string());
        stream_info.insert(
            mid.to_string(),
            StreamInfo {
                source_bytes,
                transcoded_bytes,
            },
        );
    }
    manifests.sort();
    let internal_manifests = externals
        .into_iter()
        .map(|(ext, int)| (ext.to_string(), int.to_string()))
        .collect();
    Json(NodeStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        manifests,
        internal_manifests,
        stream_info,
    })
}
