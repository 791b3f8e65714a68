//! Auth webhook client.
//!
//! When a webhook URL is configured, every unknown stream is resolved
//! through it before a connection is created. The webhook may rewrite the
//! manifest identity, hand out a profile set, and point the stream at its
//! own object storage.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::media::{parse_presets, ProfileDescriptor, VideoProfile};

/// Request body sent to the webhook.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthWebhookRequest {
    pub url: String,
}

/// Webhook response document. A `200` with an empty body means the webhook
/// has no opinion and the URL-derived identity is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthWebhookResponse {
    #[serde(rename = "manifestID")]
    pub manifest_id: String,
    #[serde(rename = "streamKey")]
    pub stream_key: String,
    pub presets: Vec<String>,
    pub profiles: Vec<ProfileDescriptor>,
    #[serde(rename = "objectStore")]
    pub object_store: String,
    #[serde(rename = "recordObjectStore")]
    pub record_object_store: String,
    #[serde(rename = "recordObjectStoreUrl")]
    pub record_object_store_url: String,
    #[serde(rename = "previousSessions")]
    pub previous_sessions: Vec<String>,
}

impl AuthWebhookResponse {
    /// Union of the preset-named and explicitly-described profiles. Empty
    /// when the webhook specified neither; the caller falls back to the
    /// node's default set in that case.
    pub fn resolve_profiles(&self) -> Result<Vec<VideoProfile>> {
        let mut profiles = parse_presets(&self.presets);
        for desc in &self.profiles {
            profiles.push(desc.to_video_profile()?);
        }
        Ok(profiles)
    }
}

/// Outbound client for the auth webhook.
pub struct AuthWebhook {
    url: String,
    client: reqwest::Client,
}

impl AuthWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve a stream URL through the webhook.
    ///
    /// `Ok(None)` means the webhook answered 200 with an empty body ("no
    /// opinion"). Network failures and non-200 statuses are denials.
    pub async fn authenticate(&self, request_url: &str) -> Result<Option<AuthWebhookResponse>> {
        let started = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .json(&AuthWebhookRequest {
                url: request_url.to_string(),
            })
            .send()
            .await
            .map_err(|e| Error::auth_denied(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::auth_denied(e.to_string()))?;
        if status.as_u16() != 200 {
            return Err(Error::auth_denied(format!(
                "status={} error={}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }
        if body.is_empty() {
            return Ok(None);
        }
        let auth: AuthWebhookResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::auth_denied(format!("unparseable response: {e}")))?;
        if auth.manifest_id.is_empty() {
            return Err(Error::bad_auth_response("empty manifest id not allowed"));
        }
        info!(url = request_url, took = ?started.elapsed(), "stream authentication finished");
        Ok(Some(auth))
    }
}
