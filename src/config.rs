//! Transcoding-options loading.
//!
//! The `--transcoding-options` flag accepts either a path to a JSON file
//! (same shape as the webhook `profiles` field) or a comma-separated list
//! of built-in preset names.

use std::path::Path;

use crate::error::{Error, Result};
use crate::media::{default_broadcast_profiles, parse_presets, ProfileDescriptor, VideoProfile};

/// Resolve the node's default broadcast profile set from the
/// transcoding-options value. An empty value keeps the built-in defaults.
pub fn load_transcoding_options(options: &str) -> Result<Vec<VideoProfile>> {
    if options.is_empty() {
        return Ok(default_broadcast_profiles());
    }

    let profiles = match std::fs::read(Path::new(options)) {
        Ok(content) if !content.is_empty() => {
            let descriptors: Vec<ProfileDescriptor> = serde_json::from_slice(&content)?;
            descriptors
                .iter()
                .map(ProfileDescriptor::to_video_profile)
                .collect::<Result<Vec<_>>>()?
        }
        _ => {
            // Not a readable file; treat the value as preset names.
            let names: Vec<String> = options.split(',').map(str::to_string).collect();
            parse_presets(&names)
        }
    };

    if profiles.is_empty() {
        return Err(Error::config("no transcoding profiles found"));
    }
    Ok(profiles)
}
