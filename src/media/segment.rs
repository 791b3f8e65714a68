//! Pushed media segments.

use std::time::Duration;

use bytes::Bytes;

/// One contiguous media chunk pushed by a publisher.
#[derive(Debug, Clone)]
pub struct MediaSegment {
    /// Raw segment payload.
    pub data: Bytes,
    /// Basename of the request URL, e.g. `17.ts`.
    pub name: String,
    /// Sequence number, parsed from the URL stem (0 if not numeric).
    pub seq_no: u64,
    /// Segment duration, from the `Content-Duration` header.
    pub duration: Duration,
}

impl MediaSegment {
    pub fn new(data: Bytes, name: impl Into<String>, seq_no: u64, duration: Duration) -> Self {
        Self {
            data,
            name: name.into(),
            seq_no,
            duration,
        }
    }
}
