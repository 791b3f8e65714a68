//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A connection for this manifest identity is already registered.
    /// Recovered inside the registry by reusing the winning connection.
    #[error("StreamAlreadyExists")]
    AlreadyExists,

    /// No object storage driver configured, or a storage session failed.
    #[error("ErrStorage")]
    Storage,

    /// Removal was requested for a stream the registry does not know.
    #[error("ErrUnknownStream")]
    UnknownStream,

    /// The auth webhook denied the stream (network error, non-200, or
    /// unparseable body).
    #[error("authentication denied: {0}")]
    AuthDenied(String),

    /// The auth webhook answered 200 with a body the node cannot accept.
    #[error("bad auth response: {0}")]
    BadAuthResponse(String),

    /// Segment submission to the orchestrator failed.
    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn auth_denied(msg: impl Into<String>) -> Self {
        Self::AuthDenied(msg.into())
    }

    pub fn bad_auth_response(msg: impl Into<String>) -> Self {
        Self::BadAuthResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }
}
