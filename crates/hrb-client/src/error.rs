use thiserror::Error;

use hrb_shared::{BlobId, ParseError};

/// A request that never completed (connection refused, reset, timeout in
/// the transport layer, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

/// The local directory mirror disagrees with what an operation expects.
///
/// These indicate divergence between the cache and the remote store and are
/// never silently ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Blob {0} is not in the directory cache")]
    UnknownBlob(BlobId),

    #[error("Blob {0} is already in the directory cache")]
    AlreadyPresent(BlobId),

    #[error("No collection is being displayed")]
    NoCollection,
}

/// Errors produced by the client core.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store answered with a status other than the expected success.
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session lock poisoned")]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for ClientError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ClientError::Poisoned
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
