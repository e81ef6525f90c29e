use thiserror::Error;

/// Errors raised while decoding locations, identifiers or store documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid blob id '{0}': expected 40 lowercase hex characters")]
    InvalidBlobId(String),

    #[error("Unknown permission '{0}'")]
    UnknownPermission(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Malformed location '{0}'")]
    MalformedLocation(String),

    #[error("Malformed directory document: {0}")]
    MalformedDocument(String),

    #[error("Response has no '{0}' header")]
    MissingHeader(&'static str),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::MalformedDocument(e.to_string())
    }
}
