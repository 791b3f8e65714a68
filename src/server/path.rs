//! Push URL parsing.
//!
//! Push URLs look like `/live/<manifestID>/<seqNo>.<ext>`; a leading
//! `live/` or `stream/` prefix is stripped before the identity is read.

use crate::media::ContainerFormat;

use super::ManifestId;

/// Identity and format information parsed from a push request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// URL-derived (external) stream identity. May be empty; the handler
    /// rejects that with 400.
    pub manifest_id: ManifestId,
    /// Anything after the manifest segment, without the extension. Doubles
    /// as the URL-supplied stream key.
    pub stream_key: String,
    /// Basename of the path, e.g. `17.ts`.
    pub file_name: String,
    /// Sequence number parsed from the basename stem; 0 if not numeric.
    pub seq_no: u64,
    /// File extension with leading dot, possibly empty.
    pub extension: String,
    /// Container format derived from the extension.
    pub format: ContainerFormat,
}

/// Strip leading spaces and slashes, then one `stream/` or `live/` prefix.
fn clean_stream_prefix(path: &str) -> &str {
    let trimmed = path.trim_start_matches([' ', '/']);
    trimmed
        .strip_prefix("stream/")
        .or_else(|| trimmed.strip_prefix("live/"))
        .unwrap_or(trimmed)
}

/// Parse a push request path.
pub fn parse_push_path(path: &str) -> ParsedPath {
    let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
    let extension = match file_name.rfind('.') {
        Some(idx) => file_name[idx..].to_string(),
        None => String::new(),
    };
    let stem = file_name.strip_suffix(extension.as_str()).unwrap_or("");
    let seq_no = stem.parse::<u64>().unwrap_or(0);

    let cleaned = clean_stream_prefix(path);
    let without_ext = cleaned.strip_suffix(extension.as_str()).unwrap_or(cleaned);
    let (manifest_id, stream_key) = match without_ext.split_once('/') {
        Some((mid, rest)) => (mid, rest),
        None => (without_ext, ""),
    };

    ParsedPath {
        manifest_id: ManifestId::from(manifest_id),
        stream_key: stream_key.to_string(),
        file_name,
        seq_no,
        extension: extension.clone(),
        format: ContainerFormat::from_extension(&extension),
    }
}
