//! In-memory mirror of the directory currently on screen.
//!
//! The cache is replaced wholesale when the user navigates and patched one
//! entry at a time as queued actions complete. It performs no I/O. Every
//! patch other than [`DirectoryCache::replace_all`] must target a blob that
//! is already present; a miss is reported as [`StateError`] because it means
//! the mirror and the remote store have diverged.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use hrb_shared::{BlobId, DirectoryJson, ElementJson, Permission};

use crate::error::StateError;

/// One stored blob of the displayed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub blob_id: BlobId,
    pub mime: String,
    /// Display name.
    pub filename: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub permission: Permission,
    /// Transient UI selection flag.
    pub selected: bool,
    /// Set when the blob does not belong to the displayed collection,
    /// e.g. in query results.
    pub owner: Option<String>,
    pub collection: Option<String>,
}

impl DirectoryEntry {
    pub fn new(blob_id: BlobId, filename: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            blob_id,
            mime: mime.into(),
            filename: filename.into(),
            timestamp: Utc::now().timestamp_millis(),
            permission: Permission::Private,
            selected: false,
            owner: None,
            collection: None,
        }
    }

    pub fn from_element(blob_id: BlobId, element: &ElementJson) -> Self {
        Self {
            blob_id,
            mime: element.mime.clone(),
            filename: element.filename.clone(),
            timestamp: element.timestamp,
            permission: element.perm,
            selected: false,
            owner: element.owner.clone(),
            collection: element.collection.clone(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.contains("image/")
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// A collection shown in a collection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub owner: String,
    pub cover: Option<BlobId>,
}

/// A complete directory as returned by a listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    pub entries: HashMap<BlobId, DirectoryEntry>,
    pub collections: BTreeMap<String, CollectionInfo>,
    pub owner: Option<String>,
    pub username: Option<String>,
    /// `Some` when the snapshot lists a single collection.
    pub collection: Option<String>,
    pub cover: Option<BlobId>,
    pub error_message: Option<String>,
}

impl DirectorySnapshot {
    pub fn from_json(doc: &DirectoryJson) -> Self {
        let (blobs, invalid) = doc.blobs();
        for key in invalid {
            warn!(key, "Ignoring directory element with malformed blob id");
        }

        let entries = blobs
            .into_iter()
            .map(|(id, element)| (id, DirectoryEntry::from_element(id, element)))
            .collect();

        let collections = doc
            .colls
            .iter()
            .flatten()
            .map(|c| {
                (
                    c.coll.clone(),
                    CollectionInfo {
                        owner: c.owner.clone(),
                        cover: c.cover_id(),
                    },
                )
            })
            .collect();

        Self {
            entries,
            collections,
            owner: doc.owner.clone(),
            username: doc.username.clone(),
            collection: doc.collection.clone(),
            cover: doc.cover(),
            error_message: doc.error_message.clone(),
        }
    }
}

/// Session-scoped directory mirror.
#[derive(Debug, Clone, Default)]
pub struct DirectoryCache {
    entries: HashMap<BlobId, DirectoryEntry>,
    collections: BTreeMap<String, CollectionInfo>,
    owner: Option<String>,
    username: Option<String>,
    current_collection: Option<String>,
    auth_token: Option<String>,
    cover: Option<BlobId>,
    error_message: Option<String>,
}

impl DirectoryCache {
    pub fn new(username: Option<String>, auth_token: Option<String>) -> Self {
        Self {
            username,
            auth_token,
            ..Self::default()
        }
    }

    // --- Session context ---

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn current_collection(&self) -> Option<&str> {
        self.current_collection.as_deref()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    pub fn cover(&self) -> Option<BlobId> {
        self.cover
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether a single collection (rather than a collection list) is shown.
    pub fn is_collection_view(&self) -> bool {
        self.current_collection.is_some()
    }

    // --- Queries ---

    pub fn get(&self, blob: &BlobId) -> Option<&DirectoryEntry> {
        self.entries.get(blob)
    }

    pub fn contains(&self, blob: &BlobId) -> bool {
        self.entries.contains_key(blob)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collections(&self) -> &BTreeMap<String, CollectionInfo> {
        &self.collections
    }

    /// Entries in display order: oldest first, ties broken by blob id.
    pub fn sorted(&self) -> Vec<&DirectoryEntry> {
        let mut entries: Vec<&DirectoryEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.blob_id.cmp(&b.blob_id)));
        entries
    }

    /// One page of [`sorted`](Self::sorted) entries. Pages start at 1.
    pub fn page(&self, page: usize, per_page: usize) -> Vec<&DirectoryEntry> {
        if page == 0 || per_page == 0 {
            return Vec::new();
        }
        self.sorted()
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect()
    }

    pub fn page_count(&self, per_page: usize) -> usize {
        if per_page == 0 {
            return 0;
        }
        self.entries.len().div_ceil(per_page).max(1)
    }

    /// Selected blobs in display order.
    pub fn selected(&self) -> Vec<BlobId> {
        self.sorted()
            .into_iter()
            .filter(|e| e.selected)
            .map(|e| e.blob_id)
            .collect()
    }

    /// The image `offset` positions away from `current` in display order,
    /// wrapping around and skipping blobs that are not images.
    pub fn step_image(&self, current: &BlobId, offset: i64) -> Option<BlobId> {
        let blobs = self.sorted();
        let len = blobs.len() as i64;
        let index = blobs.iter().position(|e| e.blob_id == *current)? as i64;
        let sign = if offset > 0 { 1 } else { -1 };
        // Reduced first so huge offsets cannot overflow
        let start = (index + offset.rem_euclid(len)) % len;

        (0..len)
            .map(|i| (start + sign * i).rem_euclid(len) as usize)
            .map(|next| blobs[next])
            .find(|e| e.is_image())
            .map(|e| e.blob_id)
    }

    // --- Mutations ---

    pub fn insert(&mut self, entry: DirectoryEntry) -> Result<(), StateError> {
        if self.entries.contains_key(&entry.blob_id) {
            return Err(StateError::AlreadyPresent(entry.blob_id));
        }
        debug!(blob = %entry.blob_id, filename = %entry.filename, "Cache insert");
        self.entries.insert(entry.blob_id, entry);
        Ok(())
    }

    pub fn remove(&mut self, blob: &BlobId) -> Result<DirectoryEntry, StateError> {
        let entry = self
            .entries
            .remove(blob)
            .ok_or(StateError::UnknownBlob(*blob))?;
        if self.cover == Some(*blob) {
            self.cover = None;
        }
        debug!(blob = %blob, "Cache remove");
        Ok(entry)
    }

    pub fn set_permission(&mut self, blob: &BlobId, perm: Permission) -> Result<(), StateError> {
        self.entry_mut(blob)?.permission = perm;
        debug!(blob = %blob, perm = %perm, "Cache permission update");
        Ok(())
    }

    pub fn set_selected(&mut self, blob: &BlobId, selected: bool) -> Result<(), StateError> {
        self.entry_mut(blob)?.selected = selected;
        Ok(())
    }

    /// Flip the selection flag, returning the new value.
    pub fn toggle_selected(&mut self, blob: &BlobId) -> Result<bool, StateError> {
        let entry = self.entry_mut(blob)?;
        entry.selected = !entry.selected;
        Ok(entry.selected)
    }

    pub fn select_all(&mut self, selected: bool) {
        for entry in self.entries.values_mut() {
            entry.selected = selected;
        }
    }

    pub fn set_cover(&mut self, blob: &BlobId) -> Result<(), StateError> {
        if !self.entries.contains_key(blob) {
            return Err(StateError::UnknownBlob(*blob));
        }
        self.cover = Some(*blob);
        Ok(())
    }

    /// Replace the directory with a freshly loaded snapshot. The
    /// authentication token survives; the user name survives unless the
    /// snapshot names one.
    pub fn replace_all(&mut self, snapshot: DirectorySnapshot) {
        debug!(
            entries = snapshot.entries.len(),
            collections = snapshot.collections.len(),
            collection = ?snapshot.collection,
            "Cache replaced"
        );
        self.entries = snapshot.entries;
        self.collections = snapshot.collections;
        self.owner = snapshot.owner;
        self.current_collection = snapshot.collection;
        self.cover = snapshot.cover;
        self.error_message = snapshot.error_message;
        if snapshot.username.is_some() {
            self.username = snapshot.username;
        }
    }

    fn entry_mut(&mut self, blob: &BlobId) -> Result<&mut DirectoryEntry, StateError> {
        self.entries
            .get_mut(blob)
            .ok_or(StateError::UnknownBlob(*blob))
    }
}
