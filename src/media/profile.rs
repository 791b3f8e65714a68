//! Output video profiles and built-in presets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::media::format::ContainerFormat;

/// GOP (keyframe interval) configuration for an output profile.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Gop {
    /// Encoder default.
    #[default]
    Default,
    /// Every frame is a keyframe.
    IntraOnly,
    /// Fixed keyframe interval.
    Fixed(Duration),
}

impl Gop {
    /// Parse the webhook `gop` field.
    ///
    /// The literal `"intra"` means intra-only; any other non-empty string
    /// must parse as a positive floating-point number of seconds.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::Default);
        }
        if s == "intra" {
            return Ok(Self::IntraOnly);
        }
        let secs: f64 = s
            .parse()
            .map_err(|_| Error::validation(format!("invalid gop value: {s}")))?;
        if secs <= 0.0 {
            return Err(Error::validation("invalid gop value"));
        }
        Ok(Self::Fixed(Duration::from_secs_f64(secs)))
    }
}

/// H.264 encoder profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncoderProfile {
    /// Encoder default.
    #[default]
    None,
    H264Baseline,
    H264Main,
    H264High,
    H264ConstrainedHigh,
}

impl EncoderProfile {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" | "None" => Ok(Self::None),
            "H264Baseline" => Ok(Self::H264Baseline),
            "H264Main" => Ok(Self::H264Main),
            "H264High" => Ok(Self::H264High),
            "H264ConstrainedHigh" => Ok(Self::H264ConstrainedHigh),
            other => Err(Error::validation(format!("unknown encoder profile: {other}"))),
        }
    }
}

/// A named output video configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProfile {
    pub name: String,
    /// Resolution as `WxH`.
    pub resolution: String,
    /// Bitrate, e.g. `"400k"`.
    pub bitrate: String,
    pub framerate: u32,
    pub framerate_den: u32,
    pub profile: EncoderProfile,
    pub gop: Gop,
    /// Container format; `None` until resolved against the source format.
    pub format: ContainerFormat,
}

impl VideoProfile {
    fn preset(name: &str, resolution: &str, bitrate: &str, framerate: u32) -> Self {
        Self {
            name: name.to_string(),
            resolution: resolution.to_string(),
            bitrate: bitrate.to_string(),
            framerate,
            framerate_den: 0,
            profile: EncoderProfile::None,
            gop: Gop::Default,
            format: ContainerFormat::None,
        }
    }
}

/// Explicit profile descriptor, as carried in the webhook `profiles` field
/// and in transcoding-options JSON files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDescriptor {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub fps: u32,
    #[serde(rename = "fpsDen")]
    pub fps_den: u32,
    pub profile: String,
    pub gop: String,
}

impl ProfileDescriptor {
    /// Convert the descriptor into a [`VideoProfile`].
    pub fn to_video_profile(&self) -> Result<VideoProfile> {
        let name = if self.name.is_empty() {
            format!("webhook_{}x{}_{}", self.width, self.height, self.bitrate)
        } else {
            self.name.clone()
        };
        Ok(VideoProfile {
            name,
            resolution: format!("{}x{}", self.width, self.height),
            bitrate: self.bitrate.to_string(),
            framerate: self.fps,
            framerate_den: self.fps_den,
            profile: EncoderProfile::parse(&self.profile)?,
            gop: Gop::parse(&self.gop)?,
            format: ContainerFormat::None,
        })
    }
}

/// Look up a built-in preset by name. Unknown names are skipped by
/// [`parse_presets`].
pub fn preset_lookup(name: &str) -> Option<VideoProfile> {
    let p = match name {
        "P144p25fps16x9" => VideoProfile::preset("P144p25fps16x9", "256x144", "400k", 25),
        "P144p30fps16x9" => VideoProfile::preset("P144p30fps16x9", "256x144", "400k", 30),
        "P240p25fps16x9" => VideoProfile::preset("P240p25fps16x9", "426x240", "600k", 25),
        "P240p30fps16x9" => VideoProfile::preset("P240p30fps16x9", "426x240", "600k", 30),
        "P240p30fps4x3" => VideoProfile::preset("P240p30fps4x3", "320x240", "600k", 30),
        "P360p25fps16x9" => VideoProfile::preset("P360p25fps16x9", "640x360", "1200k", 25),
        "P360p30fps16x9" => VideoProfile::preset("P360p30fps16x9", "640x360", "1200k", 30),
        "P360p30fps4x3" => VideoProfile::preset("P360p30fps4x3", "480x360", "1000k", 30),
        "P576p25fps16x9" => VideoProfile::preset("P576p25fps16x9", "1024x576", "1500k", 25),
        "P576p30fps16x9" => VideoProfile::preset("P576p30fps16x9", "1024x576", "1500k", 30),
        "P720p25fps16x9" => VideoProfile::preset("P720p25fps16x9", "1280x720", "2000k", 25),
        "P720p30fps16x9" => VideoProfile::preset("P720p30fps16x9", "1280x720", "2000k", 30),
        "P720p30fps4x3" => VideoProfile::preset("P720p30fps4x3", "960x720", "3500k", 30),
        "P720p60fps16x9" => VideoProfile::preset("P720p60fps16x9", "1280x720", "6000k", 60),
        "P1080p25fps16x9" => VideoProfile::preset("P1080p25fps16x9", "1920x1080", "4500k", 25),
        "P1080p30fps16x9" => VideoProfile::preset("P1080p30fps16x9", "1920x1080", "4500k", 30),
        _ => return None,
    };
    Some(p)
}

/// Resolve a list of preset names, skipping names that are not built in.
pub fn parse_presets(names: &[String]) -> Vec<VideoProfile> {
    names
        .iter()
        .filter_map(|n| preset_lookup(n.trim()))
        .collect()
}

/// The default broadcast profile set used when neither the webhook nor the
/// node configuration specifies one.
pub fn default_broadcast_profiles() -> Vec<VideoProfile> {
    vec![
        preset_lookup("P240p30fps4x3").unwrap(),
        preset_lookup("P360p30fps16x9").unwrap(),
    ]
}
