//! Per-view session state.
//!
//! Everything that changes while the user works with one gallery view lives
//! in [`Session`]: the directory mirror, the permission applied to new
//! uploads, the last move destination, the displayed location and the
//! action queue's bookkeeping. It is shared as [`SharedSession`]; callers
//! lock it briefly and never hold the guard across an `.await`.

use std::sync::{Arc, Mutex};

use tracing::debug;

use hrb_shared::constants::{QUERY_JSON, QUERY_RENDITION};
use hrb_shared::{Action, BlobId, Intent, IntentResolver, Permission, Query};

use crate::cache::{DirectoryCache, DirectoryEntry, DirectorySnapshot};
use crate::config::ClientConfig;
use crate::error::StateError;
use crate::queue::QueueState;

pub type SharedSession = Arc<Mutex<Session>>;

/// Identifies the directory on screen when an operation started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStamp {
    generation: u64,
    collection: Option<(String, String)>,
}

/// What happened to the displayed directory since a [`ViewStamp`] was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// Same snapshot; the cache reflects every change made since.
    Unchanged,
    /// The same collection was reloaded and may already show the change.
    Reloaded,
    /// Another directory is on screen.
    Replaced,
}

#[derive(Debug)]
pub struct Session {
    pub cache: DirectoryCache,
    resolver: IntentResolver,
    default_perm: Permission,
    last_destination: Option<String>,
    location: Intent,
    view_generation: u64,
    open_blob: Option<BlobId>,
    page: usize,
    images_per_page: usize,
    pub(crate) actions: QueueState,
}

impl Session {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            cache: DirectoryCache::new(config.username.clone(), config.auth_token.clone()),
            resolver: IntentResolver::new(config.auth_token.clone()),
            default_perm: config.default_permission,
            last_destination: None,
            location: Intent::root(),
            view_generation: 0,
            open_blob: None,
            page: 1,
            images_per_page: config.images_per_page,
            actions: QueueState::default(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // --- Authentication context ---

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.resolver.set_auth_token(token.clone());
        self.cache.set_auth_token(token);
    }

    /// Forget the user; the next navigation lists public blobs.
    pub fn logout(&mut self) {
        self.cache.set_username(None);
        self.set_auth_token(None);
    }

    /// Location of `intent` including session parameters.
    pub fn build(&self, intent: &Intent) -> String {
        self.resolver.build(intent)
    }

    // --- Preferences carried between actions ---

    pub fn default_permission(&self) -> Permission {
        self.default_perm
    }

    pub fn set_default_permission(&mut self, perm: Permission) {
        self.default_perm = perm;
    }

    /// Destination of the last successful move, for pre-filling the move
    /// dialog.
    pub fn last_destination(&self) -> Option<&str> {
        self.last_destination.as_deref()
    }

    pub fn remember_destination(&mut self, dest: impl Into<String>) {
        self.last_destination = Some(dest.into());
    }

    // --- Displayed view ---

    pub fn location(&self) -> &Intent {
        &self.location
    }

    /// Blob shown in the lightbox, if any.
    pub fn open_blob(&self) -> Option<BlobId> {
        self.open_blob
    }

    pub fn set_open_blob(&mut self, blob: Option<BlobId>) {
        self.open_blob = blob;
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn images_per_page(&self) -> usize {
        self.images_per_page
    }

    /// Move to `page`, clamped to the available pages.
    pub fn set_page(&mut self, page: usize) {
        let last = self.cache.page_count(self.images_per_page);
        self.page = page.clamp(1, last.max(1));
    }

    pub fn page_entries(&self) -> Vec<&DirectoryEntry> {
        self.cache.page(self.page, self.images_per_page)
    }

    /// Install a freshly loaded directory for the view `location`.
    pub fn apply_snapshot(&mut self, snapshot: DirectorySnapshot, location: Intent) {
        self.cache.replace_all(snapshot);
        self.open_blob = location.blob_id();
        self.location = location;
        self.page = 1;
        self.view_generation = self.view_generation.wrapping_add(1);
        debug!(location = %self.location, generation = self.view_generation, "Session moved to new view");
    }

    pub fn view_stamp(&self) -> ViewStamp {
        ViewStamp {
            generation: self.view_generation,
            collection: self.current_collection(),
        }
    }

    pub fn view_change(&self, since: &ViewStamp) -> ViewChange {
        if since.generation == self.view_generation {
            ViewChange::Unchanged
        } else if since.collection.is_some() && since.collection == self.current_collection() {
            ViewChange::Reloaded
        } else {
            ViewChange::Replaced
        }
    }

    /// Listing endpoint to load for `target`: the collection itself, the
    /// user's collection list, or the public blob set for anonymous users.
    pub fn listing_location(&self, target: Option<&Intent>) -> String {
        let intent = match target {
            Some(intent) if intent.is_addressable() => intent.parent_collection().api(),
            _ => match self.cache.username() {
                Some(user) => Intent {
                    action: Action::Query,
                    filename: "collection".into(),
                    query: Query::new().with("user", user),
                    ..Intent::root()
                },
                None => Intent {
                    action: Action::Query,
                    filename: "blob_set".into(),
                    query: Query::new().with("public", ""),
                    ..Intent::root()
                },
            },
        };
        self.build(&intent.json())
    }

    /// Owner and collection of the displayed view.
    fn current_collection(&self) -> Option<(String, String)> {
        let owner = self
            .cache
            .owner()
            .or(self.location.owner.as_deref())?
            .to_string();
        let collection = self
            .cache
            .current_collection()
            .or_else(|| {
                self.location
                    .is_addressable()
                    .then_some(self.location.collection.as_str())
            })?
            .to_string();
        Some((owner, collection))
    }

    /// Intent of the displayed collection's api endpoint.
    pub fn collection_intent(&self) -> Result<Intent, StateError> {
        let (owner, collection) = self.current_collection().ok_or(StateError::NoCollection)?;
        Ok(Intent::collection(owner, collection).with_action(Action::Api))
    }

    /// Api intent addressing `blob`, honoring the entry's own owner and
    /// collection when it does not belong to the displayed collection. When
    /// neither is known the blob is addressed through the query endpoint.
    pub fn blob_intent(&self, blob: &BlobId, rendition: Option<&str>) -> Intent {
        let entry = self.cache.get(blob);
        let current = self.current_collection();

        let owner = entry
            .and_then(|e| e.owner.clone())
            .or_else(|| current.as_ref().map(|(o, _)| o.clone()));
        let collection = entry
            .and_then(|e| e.collection.clone())
            .or_else(|| current.as_ref().map(|(_, c)| c.clone()));

        let mut query = Query::new();
        if let Some(rendition) = rendition {
            query.set(QUERY_RENDITION, rendition);
        }

        match (owner, collection) {
            (Some(owner), Some(collection)) => Intent {
                query,
                ..Intent::blob(Action::Api, owner, collection, *blob)
            },
            _ => Intent {
                action: Action::Query,
                filename: "blob".into(),
                query: query.with("id", blob.to_hex()),
                ..Intent::root()
            },
        }
    }

    /// Upload target for a file named `filename` in the displayed
    /// collection, or the user's default collection.
    pub fn upload_intent(&self, filename: &str) -> Result<Intent, StateError> {
        let (owner, collection) = match self.current_collection() {
            Some(current) => current,
            None => {
                let user = self.cache.username().ok_or(StateError::NoCollection)?;
                (user.to_string(), String::new())
            }
        };
        Ok(Intent::collection(owner, collection)
            .with_action(Action::Upload)
            .with_filename(filename))
    }

    /// Api intent for the JSON metadata of `blob`.
    pub fn blob_meta_location(&self, blob: &BlobId) -> String {
        self.build(&self.blob_intent(blob, None).with_query(QUERY_JSON, ""))
    }

    // --- Action queue bookkeeping ---

    pub fn pending_actions(&self) -> usize {
        self.actions.pending_len()
    }

    pub fn queue_idle(&self) -> bool {
        self.actions.is_idle()
    }
}
