//! The gallery view: navigation, queued mutations and the direct
//! operations the view offers (delete, cover, share link, metadata).
//!
//! [`Gallery`] owns the shared session and the action queue. Mutations that
//! must stay ordered go through the queue; the rest talk to the store
//! directly and patch the cache on success.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hrb_shared::constants::HEADER_LOCATION;
use hrb_shared::{BlobId, Directive, ElementJson, Intent, ParseError, Permission};

use crate::cache::DirectorySnapshot;
use crate::config::ClientConfig;
use crate::error::{Result, StateError};
use crate::events::{Notification, Notifier};
use crate::network::NetworkClient;
use crate::queue::{ActionQueue, PendingAction};
use crate::remote::{RemoteStore, UploadFile};
use crate::session::{Session, SharedSession, ViewChange, ViewStamp};

pub struct Gallery<C> {
    store: RemoteStore<Arc<C>>,
    session: SharedSession,
    queue: Arc<ActionQueue<Arc<C>>>,
    worker: Option<JoinHandle<()>>,
}

impl<C: NetworkClient + 'static> Gallery<C> {
    /// Create a gallery talking through `client`. The receiver yields the
    /// notifications of queued actions. No worker is started; see
    /// [`spawn_worker`](Self::spawn_worker).
    pub fn new(config: &ClientConfig, client: C) -> (Self, mpsc::Receiver<Notification>) {
        let (notifier, rx) = Notifier::channel(config.notification_buffer.max(1));
        let client = Arc::new(client);
        let session = Session::new(config).shared();
        let queue = Arc::new(ActionQueue::new(client.clone(), session.clone(), notifier));

        let gallery = Self {
            store: RemoteStore::new(client),
            session,
            queue,
            worker: None,
        };
        (gallery, rx)
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Process queued actions in the background as they are enqueued.
    pub fn spawn_worker(&mut self) {
        if self.worker.is_none() {
            self.worker = Some(self.queue.clone().spawn());
        }
    }

    /// Drain the queue on the calling task. Returns the number of actions
    /// processed.
    pub async fn drain(&self) -> Result<usize> {
        self.queue.drain().await
    }

    // --- Navigation ---

    /// Load the directory for `target` and make it the displayed view.
    ///
    /// A collection target lists that collection; anything else lists the
    /// user's collections, or the public blobs when nobody is logged in.
    pub async fn navigate(&self, target: Option<Intent>) -> Result<()> {
        let location = self.session.lock()?.listing_location(target.as_ref());
        info!(%location, "Loading directory");

        let doc = self.store.directory(&location).await?;
        let snapshot = DirectorySnapshot::from_json(&doc);
        if let Some(message) = &snapshot.error_message {
            warn!(%location, message, "Store reported an error with the listing");
        }

        self.session
            .lock()?
            .apply_snapshot(snapshot, target.unwrap_or_else(Intent::root));
        Ok(())
    }

    /// Navigate to a textual location. Locations that cannot be parsed or
    /// address nothing show the root view.
    pub async fn navigate_to(&self, location: &str) -> Result<()> {
        let intent = self.session.lock()?.resolver().parse_or_root(location);
        debug!(location, intent = %intent, "Resolved navigation target");
        self.navigate(Some(intent)).await
    }

    /// Reload the displayed view.
    pub async fn refresh(&self) -> Result<()> {
        let location = self.session.lock()?.location().clone();
        self.navigate(Some(location)).await
    }

    /// Open the image `offset` positions away from the one in the lightbox.
    pub fn step_open_blob(&self, offset: i64) -> Result<Option<BlobId>> {
        let mut session = self.session.lock()?;
        let Some(current) = session.open_blob() else {
            return Ok(None);
        };
        let next = session.cache.step_image(&current, offset);
        if next.is_some() {
            session.set_open_blob(next);
        }
        Ok(next)
    }

    // --- Queued mutations ---

    /// Queue an upload into the displayed collection.
    ///
    /// Queued actions only run once [`spawn_worker`](Self::spawn_worker)
    /// has been called or [`drain`](Self::drain) is awaited; the gallery
    /// starts no worker on its own.
    pub fn enqueue_upload(&self, file: UploadFile) -> Result<()> {
        self.queue.enqueue(PendingAction::Upload { file })
    }

    pub fn enqueue_move(&self, blob: BlobId, dest: impl Into<String>) -> Result<()> {
        self.queue.enqueue(PendingAction::Move {
            blob,
            dest: dest.into(),
        })
    }

    pub fn enqueue_set_permission(&self, blob: BlobId, perm: Permission) -> Result<()> {
        self.queue.enqueue(PendingAction::SetPermission { blob, perm })
    }

    /// Queue a permission change for every selected blob and clear the
    /// selection. Returns the number of actions queued.
    pub fn set_permission_selected(&self, perm: Permission) -> Result<usize> {
        let selected = self.take_selection()?;
        for blob in &selected {
            self.enqueue_set_permission(*blob, perm)?;
        }
        Ok(selected.len())
    }

    /// Queue a move of every selected blob to `dest` and clear the
    /// selection. Returns the number of actions queued.
    pub fn move_selected(&self, dest: &str) -> Result<usize> {
        let selected = self.take_selection()?;
        for blob in &selected {
            self.enqueue_move(*blob, dest)?;
        }
        Ok(selected.len())
    }

    fn take_selection(&self) -> Result<Vec<BlobId>> {
        let mut session = self.session.lock()?;
        let selected = session.cache.selected();
        session.cache.select_all(false);
        Ok(selected)
    }

    // --- Direct operations ---

    /// Delete a blob from the store and the displayed directory.
    pub async fn delete_blob(&self, blob: &BlobId) -> Result<()> {
        let (location, stamp) = self.cached_blob_location(blob)?;
        info!(blob = %blob, "Deleting blob");
        self.store.delete(&location).await?;

        let mut session = self.session.lock()?;
        match session.view_change(&stamp) {
            ViewChange::Unchanged => {
                session.cache.remove(blob)?;
            }
            ViewChange::Reloaded if session.cache.contains(blob) => {
                session.cache.remove(blob)?;
            }
            _ => debug!(blob = %blob, "View changed during delete, cache left as loaded"),
        }
        if session.open_blob() == Some(*blob) {
            session.set_open_blob(None);
        }
        Ok(())
    }

    /// Make `blob` the cover of the displayed collection.
    pub async fn set_cover(&self, blob: &BlobId) -> Result<()> {
        let (location, stamp) = {
            let session = self.session.lock()?;
            if !session.cache.contains(blob) {
                return Err(StateError::UnknownBlob(*blob).into());
            }
            (session.build(&session.collection_intent()?), session.view_stamp())
        };
        self.store.post(&location, &Directive::Cover(*blob)).await?;
        {
            let mut session = self.session.lock()?;
            match session.view_change(&stamp) {
                ViewChange::Unchanged => session.cache.set_cover(blob)?,
                ViewChange::Reloaded if session.cache.contains(blob) => session.cache.set_cover(blob)?,
                _ => debug!(blob = %blob, "View changed while setting cover, cache left as loaded"),
            }
        }
        info!(blob = %blob, "Collection cover changed");
        Ok(())
    }

    /// Ask the store for a share link to the displayed collection.
    pub async fn create_share_link(&self) -> Result<String> {
        let location = {
            let session = self.session.lock()?;
            session.build(&session.collection_intent()?)
        };
        let resp = self.store.post(&location, &Directive::Share).await?;
        let link = resp
            .header(HEADER_LOCATION)
            .ok_or(ParseError::MissingHeader(HEADER_LOCATION))?;
        info!(link, "Share link created");
        Ok(link.to_string())
    }

    /// Metadata of `blob` as reported by the store, with the cached
    /// directory fields taking precedence.
    pub async fn blob_meta(&self, blob: &BlobId) -> Result<ElementJson> {
        let location = self.session.lock()?.blob_meta_location(blob);
        let mut meta: ElementJson = self.store.json(&location).await?;

        if let Some(entry) = self.session.lock()?.cache.get(blob) {
            meta.filename = entry.filename.clone();
            meta.mime = entry.mime.clone();
            meta.timestamp = entry.timestamp;
            meta.perm = entry.permission;
        }
        Ok(meta)
    }

    /// Names of the logged-in user's collections, for move suggestions.
    /// Empty for anonymous sessions.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        let location = {
            let session = self.session.lock()?;
            if session.cache.username().is_none() {
                return Ok(Vec::new());
            }
            session.listing_location(None)
        };
        let doc = self.store.directory(&location).await?;
        Ok(doc
            .colls
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.coll)
            .collect())
    }

    fn cached_blob_location(&self, blob: &BlobId) -> Result<(String, ViewStamp)> {
        let session = self.session.lock()?;
        if !session.cache.contains(blob) {
            return Err(StateError::UnknownBlob(*blob).into());
        }
        Ok((session.build(&session.blob_intent(blob, None)), session.view_stamp()))
    }
}

impl<C> Drop for Gallery<C> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
