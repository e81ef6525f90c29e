//! Documents and request bodies exchanged with the remote store.
//!
//! Listing endpoints answer with one JSON document shape: a collection
//! listing carries `elements` (blob id to entry), a collection list carries
//! `colls`. Both may carry the session's `username`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::ParseError;
use crate::types::{BlobId, Permission};

/// Mutation posted to a blob (or collection) endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Move the blob into another collection of the same owner.
    Move(String),
    /// Change the blob's visibility.
    Perm(Permission),
    /// Make the blob the cover of its collection.
    Cover(BlobId),
    /// Create a share link for the collection.
    Share,
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move(_) => "move",
            Self::Perm(_) => "perm",
            Self::Cover(_) => "cover",
            Self::Share => "share",
        }
    }

    /// Form-encoded request body, e.g. `perm=public`.
    pub fn encode(&self) -> String {
        let value = match self {
            Self::Move(dest) => dest.clone(),
            Self::Perm(perm) => perm.as_str().to_string(),
            Self::Cover(blob) => blob.to_hex(),
            Self::Share => "create".to_string(),
        };
        form_urlencoded::Serializer::new(String::new())
            .append_pair(self.name(), &value)
            .finish()
    }
}

/// One blob in a directory document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementJson {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub perm: Permission,
    /// Present when the blob lives outside the listed collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

/// One entry of a collection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionJson {
    pub owner: String,
    pub coll: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl CollectionJson {
    pub fn cover_id(&self) -> Option<BlobId> {
        self.cover.as_deref().and_then(|c| BlobId::from_hex(c).ok())
    }
}

/// Collection-level properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

/// Directory snapshot returned by listing endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<BTreeMap<String, ElementJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colls: Option<Vec<CollectionJson>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DirectoryJson {
    pub fn from_slice(body: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Elements keyed by valid blob ids. Keys that are not blob ids are
    /// returned separately so callers can report them.
    pub fn blobs(&self) -> (Vec<(BlobId, &ElementJson)>, Vec<&str>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for (key, element) in self.elements.iter().flatten() {
            match BlobId::from_hex(key) {
                Ok(id) => valid.push((id, element)),
                Err(_) => invalid.push(key.as_str()),
            }
        }
        (valid, invalid)
    }

    pub fn cover(&self) -> Option<BlobId> {
        self.meta
            .as_ref()
            .and_then(|m| m.cover.as_deref())
            .and_then(|c| BlobId::from_hex(c).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334";

    #[test]
    fn test_directive_encoding() {
        assert_eq!(Directive::Move("vacation".into()).encode(), "move=vacation");
        assert_eq!(Directive::Move("summer 2018/b&w".into()).encode(), "move=summer+2018%2Fb%26w");
        assert_eq!(Directive::Perm(Permission::Public).encode(), "perm=public");
        assert_eq!(
            Directive::Cover(BlobId::from_hex(ID).unwrap()).encode(),
            format!("cover={ID}")
        );
        assert_eq!(Directive::Share.encode(), "share=create");
    }

    #[test]
    fn test_parse_collection_document() {
        let body = serde_json::json!({
            "username": "alice",
            "owner": "alice",
            "collection": "trips",
            "meta": {"cover": ID},
            "elements": {
                ID: {"filename": "cat.png", "mime": "image/png", "timestamp": 1500, "perm": "shared"},
                "not-a-blob": {"filename": "x"}
            }
        });
        let doc = DirectoryJson::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(doc.collection.as_deref(), Some("trips"));
        assert_eq!(doc.cover().map(|c| c.to_hex()), Some(ID.to_string()));

        let (valid, invalid) = doc.blobs();
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid, vec!["not-a-blob"]);
        let (id, element) = valid[0];
        assert_eq!(id.to_hex(), ID);
        assert_eq!(element.perm, Permission::Shared);
        assert_eq!(element.timestamp, 1500);
    }

    #[test]
    fn test_parse_collection_list_document() {
        let body = serde_json::json!({
            "username": "alice",
            "colls": [
                {"owner": "alice", "coll": "", "cover": ID},
                {"owner": "alice", "coll": "trips"}
            ]
        });
        let doc = DirectoryJson::from_slice(body.to_string().as_bytes()).unwrap();
        assert!(doc.elements.is_none());
        let colls = doc.colls.unwrap();
        assert_eq!(colls.len(), 2);
        assert!(colls[0].cover_id().is_some());
        assert!(colls[1].cover_id().is_none());
    }

    #[test]
    fn test_element_defaults() {
        let element: ElementJson = serde_json::from_str("{}").unwrap();
        assert_eq!(element.perm, Permission::Private);
        assert_eq!(element.timestamp, 0);
        assert!(element.owner.is_none());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            DirectoryJson::from_slice(b"<html>"),
            Err(ParseError::MalformedDocument(_))
        ));
    }
}
