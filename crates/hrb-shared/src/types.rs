use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BLOB_ID_BYTES, BLOB_ID_LEN};
use crate::error::ParseError;

// Blob identity = content digest (20 bytes), written as 40 lowercase hex chars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(pub [u8; BLOB_ID_BYTES]);

impl BlobId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a blob id. Only the canonical lowercase form is accepted.
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        if !Self::looks_like(s) {
            return Err(ParseError::InvalidBlobId(s.to_string()));
        }
        let mut arr = [0u8; BLOB_ID_BYTES];
        hex::decode_to_slice(s, &mut arr).map_err(|_| ParseError::InvalidBlobId(s.to_string()))?;
        Ok(Self(arr))
    }

    /// Whether `s` has the shape of a blob id (length and alphabet).
    pub fn looks_like(s: &str) -> bool {
        s.len() == BLOB_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Extract the blob id that terminates a resource reference such as
    /// `/api/alice/trip/<id>`.
    pub fn from_reference(reference: &str) -> Result<Self, ParseError> {
        let reference = reference.split(['?', '#']).next().unwrap_or_default();
        let tail = reference
            .len()
            .checked_sub(BLOB_ID_LEN)
            .and_then(|start| reference.get(start..))
            .ok_or_else(|| ParseError::InvalidBlobId(reference.to_string()))?;
        Self::from_hex(tail)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlobId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.to_hex()
    }
}

/// Visibility of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Only the owner can see it.
    #[default]
    Private,
    /// Anyone holding a share link can see it.
    Shared,
    /// Listed publicly.
    Public,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Shared => "shared",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "shared" => Ok(Self::Shared),
            "public" => Ok(Self::Public),
            other => Err(ParseError::UnknownPermission(other.to_string())),
        }
    }
}
