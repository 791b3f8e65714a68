//! `multipart/mixed` response writer.
//!
//! One part per rendition, either the rendition payload itself or a URI
//! reference when the payload is not resident locally. The wire format is
//! small enough to write by hand.

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Incremental writer for one `multipart/mixed` response body.
pub struct MultipartWriter {
    boundary: String,
    buf: Vec<u8>,
}

impl MultipartWriter {
    pub fn new() -> Self {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        Self {
            boundary,
            buf: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the response `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    /// Append one part. Headers are written in the order given.
    pub fn write_part(&mut self, headers: &[(&str, String)], body: &[u8]) {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        for (name, value) in headers {
            self.buf.extend_from_slice(name.as_bytes());
            self.buf.extend_from_slice(b": ");
            self.buf.extend_from_slice(value.as_bytes());
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Close the body with the final boundary.
    pub fn finish(mut self) -> Bytes {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");
        Bytes::from(self.buf)
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a multipart body back into `(headers, body)` pairs. Test helper,
/// but kept callable from integration tests.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<(Vec<(String, String)>, Vec<u8>)> {
    let text = body;
    let delim = format!("--{boundary}\r\n");
    let closing = format!("--{boundary}--");
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let Some(start) = find(rest, delim.as_bytes()) else {
            break;
        };
        rest = &rest[start + delim.len()..];
        let end = find(rest, format!("\r\n--{boundary}").as_bytes())
            .unwrap_or(rest.len());
        let part = &rest[..end];
        let header_end = find(part, b"\r\n\r\n").unwrap_or(part.len());
        let headers = std::str::from_utf8(&part[..header_end])
            .unwrap_or_default()
            .lines()
            .filter_map(|l| {
                let (name, value) = l.split_once(": ")?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        let body_start = (header_end + 4).min(part.len());
        parts.push((headers, part[body_start..].to_vec()));
        rest = &rest[end..];
        if find(rest, closing.as_bytes()).is_some() && find(rest, delim.as_bytes()).is_none() {
            break;
        }
    }
    parts
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
