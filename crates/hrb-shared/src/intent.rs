//! Navigational locations and the resources they address.
//!
//! A location such as `/view/alice/trips/2018/<blob id>?rendition=thumbnail`
//! names an endpoint family (`view`), an owner (`alice`), a collection path
//! (`trips/2018`) and optionally a blob. [`Intent`] is the structured form of
//! such a location and [`IntentResolver`] converts between the two.
//!
//! The trailing segment is taken as a blob id when it is exactly
//! [`BLOB_ID_LEN`] characters long, or unconditionally for actions that
//! always carry a file name (upload). A collection whose last segment happens
//! to be 40 characters long is therefore misread as a blob id; there is no
//! way to address such a collection through a location.
//!
//! Path segments are percent-encoded when a location is built and decoded
//! when it is parsed, so names may contain `#`, `?`, `%` or spaces.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::constants::{BLOB_ID_LEN, QUERY_AUTH, QUERY_JSON};
use crate::error::ParseError;
use crate::types::BlobId;

/// Endpoint family a location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// HTML view of a collection or blob.
    #[default]
    View,
    /// Raw blob content, JSON documents and mutations.
    Api,
    /// Blob upload target.
    Upload,
    /// Cross-collection queries.
    Query,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Api => "api",
            Self::Upload => "upload",
            Self::Query => "query",
        }
    }

    /// Whether the last path segment is always a file name for this action.
    pub fn requires_filename(&self) -> bool {
        matches!(self, Self::Upload)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "api" => Ok(Self::Api),
            "upload" => Ok(Self::Upload),
            "query" => Ok(Self::Query),
            other => Err(ParseError::UnknownAction(other.to_string())),
        }
    }
}

/// Query parameters in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` query string.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Set `key` to `value`, replacing the first occurrence in place and
    /// dropping any later duplicates.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter().position(|(k, _)| *k == key) {
            Some(first) => {
                self.0[first].1 = value;
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = index <= first || *k != key;
                    index += 1;
                    keep
                });
            }
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as a query string without the leading `?`.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

/// Structured description of a navigable or actionable resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: Action,
    /// Resource namespace (user name). `None` means the location does not
    /// address anything and callers should fall back to the root view.
    pub owner: Option<String>,
    /// Collection path; the empty string is the unnamed default collection.
    pub collection: String,
    /// Blob id, or the client supplied file name for uploads. Empty when
    /// the intent addresses a collection.
    pub filename: String,
    pub query: Query,
}

impl Intent {
    /// The root location.
    pub fn root() -> Self {
        Self::default()
    }

    /// View of one collection.
    pub fn collection(owner: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// A blob inside a collection, addressed through `action`.
    pub fn blob(
        action: Action,
        owner: impl Into<String>,
        collection: impl Into<String>,
        blob: BlobId,
    ) -> Self {
        Self {
            action,
            owner: Some(owner.into()),
            collection: collection.into(),
            filename: blob.to_hex(),
            query: Query::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.set(key, value);
        self
    }

    pub fn api(&self) -> Self {
        self.clone().with_action(Action::Api)
    }

    /// The same intent asking for the JSON form of the resource.
    pub fn json(&self) -> Self {
        self.clone().with_query(QUERY_JSON, "")
    }

    /// The collection containing this intent's blob, without query.
    pub fn parent_collection(&self) -> Self {
        Self {
            action: self.action,
            owner: self.owner.clone(),
            collection: self.collection.clone(),
            filename: String::new(),
            query: Query::new(),
        }
    }

    /// Whether the intent names an owner, i.e. addresses an actual resource.
    pub fn is_addressable(&self) -> bool {
        self.owner.as_deref().is_some_and(|owner| !owner.is_empty())
    }

    /// The blob this intent points at, if its file name is a blob id.
    pub fn blob_id(&self) -> Option<BlobId> {
        BlobId::from_hex(&self.filename).ok()
    }

    /// Parse a location (absolute URL or path with optional query).
    pub fn parse(location: &str) -> Result<Self, ParseError> {
        let (path, query) = split_location(location)?;

        let mut segments: Vec<String> = path.split('/').map(decode_segment).collect();
        if segments.first().is_some_and(String::is_empty) {
            segments.remove(0);
        }

        let mut intent = Self {
            query: Query::parse(query),
            ..Self::default()
        };

        if segments.len() >= 2 {
            intent.action = segments.remove(0).parse()?;
            intent.owner = Some(segments.remove(0));

            let pop_filename = intent.action.requires_filename()
                || segments.last().is_some_and(|last| last.chars().count() == BLOB_ID_LEN);
            if pop_filename {
                intent.filename = segments.pop().unwrap_or_default();
            }

            intent.collection = segments.join("/");
        }
        Ok(intent)
    }

    /// Build the location of this intent, without session parameters.
    pub fn location(&self) -> String {
        let owner = self.owner.as_deref().unwrap_or_default();

        let mut location = String::from("/");
        if !(owner.is_empty() && self.collection.is_empty() && self.filename.is_empty()) {
            location.push_str(self.action.as_str());
        }
        if !owner.is_empty() {
            location.push('/');
            location.extend(utf8_percent_encode(owner, SEGMENT));
        }
        // Collection paths keep their separators
        if !self.collection.is_empty() {
            for part in self.collection.split('/') {
                location.push('/');
                location.extend(utf8_percent_encode(part, SEGMENT));
            }
        }
        if !self.filename.is_empty() {
            location.push('/');
            location.extend(utf8_percent_encode(&self.filename, SEGMENT));
        }

        let query = self.query.encode();
        if !query.is_empty() {
            location.push('?');
            location.push_str(&query);
        }
        location
    }
}

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location())
    }
}

/// Split a location into its path and raw query string.
fn split_location(location: &str) -> Result<(&str, &str), ParseError> {
    let location = location.split('#').next().unwrap_or_default();

    // Strip scheme and authority of absolute URLs
    let location = match location.find("://") {
        Some(scheme_end) => {
            let rest = &location[scheme_end + 3..];
            match rest.find(['/', '?']) {
                Some(path_start) => &rest[path_start..],
                None => "/",
            }
        }
        None => location,
    };

    if !(location.is_empty() || location.starts_with('/') || location.starts_with('?'))
        || location.chars().any(char::is_control)
    {
        return Err(ParseError::MalformedLocation(location.to_string()));
    }

    Ok(match location.split_once('?') {
        Some((path, query)) => (path, query),
        None => (location, ""),
    })
}

/// Converts between locations and intents within one session.
///
/// Once the session holds an authentication token, every location built by
/// the resolver carries it as the `auth` query parameter.
#[derive(Debug, Clone, Default)]
pub struct IntentResolver {
    auth_token: Option<String>,
}

impl IntentResolver {
    pub fn new(auth_token: Option<String>) -> Self {
        Self { auth_token }
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    pub fn parse(&self, location: &str) -> Result<Intent, ParseError> {
        Intent::parse(location)
    }

    /// Parse a location, falling back to the root intent when it cannot be
    /// parsed or does not address a resource.
    pub fn parse_or_root(&self, location: &str) -> Intent {
        match Intent::parse(location) {
            Ok(intent) if intent.is_addressable() => intent,
            _ => Intent::root(),
        }
    }

    pub fn build(&self, intent: &Intent) -> String {
        match &self.auth_token {
            Some(token) => intent.clone().with_query(QUERY_AUTH, token.as_str()).location(),
            None => intent.location(),
        }
    }
}
