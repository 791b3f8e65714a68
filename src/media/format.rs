//! Container formats recognized on the ingest path.

/// Container format of a pushed segment or an output profile.
///
/// `None` on an output profile means "inherit the source format"; it is
/// resolved against the URL-derived format when a connection is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Format not (yet) determined.
    #[default]
    None,
    /// MPEG transport stream (`.ts`).
    Mpegts,
    /// MP4 (`.mp4`).
    Mp4,
}

impl ContainerFormat {
    /// Map a file extension (with leading dot) to a container format.
    ///
    /// Anything unrecognized, including `.m3u8`, maps to `None` and is
    /// rejected by the push handler.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            ".ts" => Self::Mpegts,
            ".mp4" => Self::Mp4,
            _ => Self::None,
        }
    }

    /// File extension for this format, with leading dot.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Mpegts => Some(".ts"),
            Self::Mp4 => Some(".mp4"),
            Self::None => None,
        }
    }

    /// MIME type for this format.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            Self::Mpegts => Some("video/mp2t"),
            Self::Mp4 => Some("video/mp4"),
            Self::None => None,
        }
    }
}
