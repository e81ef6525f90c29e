//! Sequential background action queue.
//!
//! Mutating operations (upload, move, permission change) are queued and
//! executed strictly one after another in submission order. The remote store
//! offers no transactional guarantee across overlapping calls, so at most
//! one mutation is ever in flight; [`QueueState::current`] is that slot.
//!
//! A failed action is reported and the queue moves on to the next one. When
//! nothing is left, a single [`Notification::Drained`] is emitted so the
//! view can refresh.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hrb_shared::{BlobId, Directive, Permission};

use crate::cache::DirectoryEntry;
use crate::error::{ClientError, Result, StateError};
use crate::events::{ActionSummary, Notification, Notifier};
use crate::network::NetworkClient;
use crate::remote::{RemoteStore, UploadFile};
use crate::session::{SharedSession, ViewChange, ViewStamp};

/// A mutation requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Upload { file: UploadFile },
    Move { blob: BlobId, dest: String },
    SetPermission { blob: BlobId, perm: Permission },
}

impl PendingAction {
    pub fn summary(&self) -> ActionSummary {
        match self {
            Self::Upload { file } => ActionSummary::Upload {
                filename: file.name.clone(),
            },
            Self::Move { blob, dest } => ActionSummary::Move {
                blob: *blob,
                dest: dest.clone(),
            },
            Self::SetPermission { blob, perm } => ActionSummary::SetPermission {
                blob: *blob,
                perm: *perm,
            },
        }
    }
}

/// Queue bookkeeping kept inside the session.
#[derive(Debug, Default)]
pub struct QueueState {
    pending: VecDeque<PendingAction>,
    current: Option<PendingAction>,
    running: bool,
}

impl QueueState {
    pub fn push(&mut self, action: PendingAction) {
        self.pending.push_back(action);
    }

    /// The action whose request is in flight.
    pub fn current(&self) -> Option<&PendingAction> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }

    /// Claim the runner role. Fails if another drain is in progress.
    fn try_begin_run(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// Pop the head into the in-flight slot. Releases the runner role when
    /// the queue is empty, in the same critical section, so an action
    /// enqueued afterwards always finds the queue free to start.
    fn begin_next(&mut self) -> Option<PendingAction> {
        debug_assert!(self.current.is_none());
        match self.pending.pop_front() {
            Some(action) => {
                self.current = Some(action.clone());
                Some(action)
            }
            None => {
                self.running = false;
                None
            }
        }
    }

    fn finish(&mut self) {
        self.current = None;
    }
}

pub struct ActionQueue<C> {
    store: RemoteStore<C>,
    session: SharedSession,
    notifier: Notifier,
    wake: Notify,
}

impl<C: NetworkClient + 'static> ActionQueue<C> {
    pub fn new(client: C, session: SharedSession, notifier: Notifier) -> Self {
        Self {
            store: RemoteStore::new(client),
            session,
            notifier,
            wake: Notify::new(),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Append an action. Nothing runs until a worker started with
    /// [`spawn`](Self::spawn) picks it up, or a caller awaits
    /// [`drain`](Self::drain).
    pub fn enqueue(&self, action: PendingAction) -> Result<()> {
        debug!(action = ?action.summary(), "Action queued");
        self.session.lock()?.actions.push(action);
        self.wake.notify_one();
        Ok(())
    }

    /// Process queued actions until none are left, then emit one
    /// [`Notification::Drained`]. Returns the number of actions processed.
    ///
    /// If another drain is already running this returns `Ok(0)` at once and
    /// emits nothing; the running drain picks up the new work.
    pub async fn drain(&self) -> Result<usize> {
        if !self.session.lock()?.actions.try_begin_run() {
            debug!("Queue already draining");
            return Ok(0);
        }

        let mut processed = 0;
        loop {
            let next = self.session.lock()?.actions.begin_next();
            let Some(action) = next else {
                break;
            };

            let summary = action.summary();
            self.notifier.notify(Notification::ActionStarted(summary.clone()));

            match self.run(&action).await {
                Ok(()) => {
                    info!(action = ?summary, "Action completed");
                    self.notifier.notify(Notification::ActionCompleted(summary));
                }
                Err(e) => {
                    if let ClientError::State(_) = e {
                        error!(action = ?summary, error = %e, "Directory cache diverged from store");
                    } else {
                        warn!(action = ?summary, error = %e, "Action failed");
                    }
                    self.notifier.notify(Notification::ActionFailed {
                        action: summary,
                        error: e.to_string(),
                    });
                }
            }

            self.session.lock()?.actions.finish();
            processed += 1;
        }

        info!(processed, "All background tasks finished");
        self.notifier.notify(Notification::Drained);
        Ok(processed)
    }

    /// Start a worker task that drains the queue whenever actions arrive.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Action queue worker started");
            loop {
                self.wake.notified().await;

                let idle = match self.session.lock() {
                    Ok(session) => session.actions.is_idle(),
                    Err(_) => break,
                };
                // A wakeup for work an earlier drain already handled
                if idle {
                    continue;
                }

                if let Err(e) = self.drain().await {
                    error!(error = %e, "Action queue worker stopped");
                    break;
                }
            }
        })
    }

    async fn run(&self, action: &PendingAction) -> Result<()> {
        match action {
            PendingAction::Upload { file } => self.upload(file).await,
            PendingAction::Move { blob, dest } => self.move_blob(blob, dest).await,
            PendingAction::SetPermission { blob, perm } => self.set_permission(blob, *perm).await,
        }
    }

    async fn upload(&self, file: &UploadFile) -> Result<()> {
        let (target, location, stamp) = {
            let session = self.session.lock()?;
            let target = session.upload_intent(&file.name)?;
            let location = session.build(&target);
            (target, location, session.view_stamp())
        };
        info!(filename = %file.name, %location, "Uploading");

        let blob = self.store.upload(&location, file).await?;

        let follow_up = {
            let mut session = self.session.lock()?;
            let change = session.view_change(&stamp);
            let duplicate = match change {
                ViewChange::Replaced => {
                    debug!(blob = %blob, "View changed during upload, leaving entry to next reload");
                    false
                }
                _ => match session
                    .cache
                    .insert(DirectoryEntry::new(blob, file.name.as_str(), file.mime.as_str()))
                {
                    Ok(()) => false,
                    // A reload may already list the new blob
                    Err(StateError::AlreadyPresent(_)) if change == ViewChange::Reloaded => false,
                    Err(StateError::AlreadyPresent(_)) => {
                        warn!(blob = %blob, filename = %file.name, "Uploaded blob already listed");
                        true
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            let perm = session.default_permission();
            (!duplicate && perm != Permission::Private).then_some(perm)
        };
        self.notifier.notify(Notification::Uploaded {
            blob,
            filename: file.name.clone(),
        });

        // Part of the same action: re-queuing would let later actions
        // overtake it. Addressed through the upload's own collection.
        if let Some(perm) = follow_up {
            let location = {
                let blob_intent = target.parent_collection().api().with_filename(blob.to_hex());
                self.session.lock()?.build(&blob_intent)
            };
            self.apply_permission(&blob, perm, &location, &stamp).await?;
        }
        Ok(())
    }

    async fn move_blob(&self, blob: &BlobId, dest: &str) -> Result<()> {
        let (location, stamp) = self.blob_target(blob)?;
        info!(blob = %blob, dest, "Moving blob");

        self.store
            .post(&location, &Directive::Move(dest.to_string()))
            .await?;

        {
            let mut session = self.session.lock()?;
            session.remember_destination(dest);
            // The destination's listing is refreshed on next navigation
            match session.view_change(&stamp) {
                ViewChange::Unchanged => {
                    session.cache.remove(blob)?;
                }
                ViewChange::Reloaded if session.cache.contains(blob) => {
                    session.cache.remove(blob)?;
                }
                _ => debug!(blob = %blob, "View changed during move, cache left as loaded"),
            }
        }
        self.notifier.notify(Notification::Moved {
            blob: *blob,
            dest: dest.to_string(),
        });
        Ok(())
    }

    async fn set_permission(&self, blob: &BlobId, perm: Permission) -> Result<()> {
        let (location, stamp) = self.blob_target(blob)?;
        self.apply_permission(blob, perm, &location, &stamp).await
    }

    async fn apply_permission(
        &self,
        blob: &BlobId,
        perm: Permission,
        location: &str,
        stamp: &ViewStamp,
    ) -> Result<()> {
        info!(blob = %blob, perm = %perm, "Changing permission");

        self.store.post(location, &Directive::Perm(perm)).await?;

        {
            let mut session = self.session.lock()?;
            match session.view_change(stamp) {
                ViewChange::Unchanged => session.cache.set_permission(blob, perm)?,
                ViewChange::Reloaded if session.cache.contains(blob) => {
                    session.cache.set_permission(blob, perm)?
                }
                _ => debug!(blob = %blob, "View changed during permission change, cache left as loaded"),
            }
            // Later uploads inherit the most recent choice
            session.set_default_permission(perm);
        }
        self.notifier.notify(Notification::PermissionChanged { blob: *blob, perm });
        Ok(())
    }

    /// Api location of a cached blob and the view it was found in.
    fn blob_target(&self, blob: &BlobId) -> Result<(String, ViewStamp)> {
        let session = self.session.lock()?;
        if !session.cache.contains(blob) {
            return Err(StateError::UnknownBlob(*blob).into());
        }
        Ok((session.build(&session.blob_intent(blob, None)), session.view_stamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use hrb_shared::Intent;
    use tokio::sync::mpsc;

    use crate::cache::DirectorySnapshot;
    use crate::config::ClientConfig;
    use crate::network::{Method, Response};
    use crate::session::Session;
    use crate::testing::MockClient;

    const NEW_ID: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334";

    fn id(n: u8) -> BlobId {
        BlobId([n; 20])
    }

    /// Session showing alice's "trips" collection with blobs 1..=count.
    fn session(default_perm: Permission, count: u8) -> SharedSession {
        let mut session = Session::new(&ClientConfig {
            username: Some("alice".into()),
            default_permission: default_perm,
            ..ClientConfig::default()
        });
        let mut snapshot = DirectorySnapshot {
            owner: Some("alice".into()),
            collection: Some("trips".into()),
            ..DirectorySnapshot::default()
        };
        for n in 1..=count {
            snapshot
                .entries
                .insert(id(n), DirectoryEntry::new(id(n), format!("{n}.jpg"), "image/jpeg"));
        }
        session.apply_snapshot(snapshot, Intent::collection("alice", "trips"));
        session.shared()
    }

    fn queue(
        client: MockClient,
        session: SharedSession,
    ) -> (ActionQueue<MockClient>, mpsc::Receiver<Notification>) {
        let (notifier, rx) = Notifier::channel(64);
        (ActionQueue::new(client, session, notifier), rx)
    }

    fn collect(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn cat() -> UploadFile {
        UploadFile::new("cat.png", "image/png", &b"\x89PNG"[..])
    }

    fn created() -> Response {
        Response::new(201).with_header("location", format!("/api/alice/trips/{NEW_ID}"))
    }

    #[tokio::test]
    async fn test_fifo_with_single_action_in_flight() {
        let session = session(Permission::Private, 2);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observed = session.clone();
        let seen_in_flight = seen.clone();
        let client = MockClient::new().with_observer(move |_| {
            let s = observed.lock().unwrap();
            let current = s.actions.current().expect("request outside an action");
            seen_in_flight.lock().unwrap().push(current.summary());
        });
        client.respond(created());
        let (queue, mut rx) = queue(client.clone(), session.clone());

        let actions = vec![
            PendingAction::Upload { file: cat() },
            PendingAction::SetPermission { blob: id(1), perm: Permission::Public },
            PendingAction::Move { blob: id(2), dest: "vacation".into() },
        ];
        for action in &actions {
            queue.enqueue(action.clone()).unwrap();
        }
        assert_eq!(session.lock().unwrap().pending_actions(), 3);

        assert_eq!(queue.drain().await.unwrap(), 3);
        assert_eq!(client.max_in_flight(), 1);

        let expected: Vec<ActionSummary> = actions.iter().map(|a| a.summary()).collect();
        assert_eq!(*seen.lock().unwrap(), expected);

        let completed: Vec<ActionSummary> = collect(&mut rx)
            .into_iter()
            .filter_map(|n| match n {
                Notification::ActionCompleted(summary) => Some(summary),
                _ => None,
            })
            .collect();
        assert_eq!(completed, expected);
        assert!(session.lock().unwrap().queue_idle());
    }

    #[tokio::test]
    async fn test_upload_inserts_private_entry() {
        let session = session(Permission::Private, 0);
        let client = MockClient::new();
        client.respond(created());
        let (queue, _rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Upload { file: cat() }).unwrap();
        queue.drain().await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].location, "/upload/alice/trips/cat.png");

        let s = session.lock().unwrap();
        let entry = s.cache.get(&BlobId::from_hex(NEW_ID).unwrap()).unwrap();
        assert_eq!(entry.filename, "cat.png");
        assert_eq!(entry.mime, "image/png");
        assert_eq!(entry.permission, Permission::Private);
    }

    #[tokio::test]
    async fn test_upload_applies_default_permission_once() {
        let session = session(Permission::Shared, 0);
        let client = MockClient::new();
        client.respond(created());
        let (queue, _rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Upload { file: cat() }).unwrap();
        queue.enqueue(PendingAction::SetPermission { blob: id(9), perm: Permission::Public }).unwrap();
        queue.drain().await.unwrap();

        let requests = client.requests();
        // PUT, then the follow-up POST before the next queued action (which
        // fails locally because blob 9 is unknown)
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::Post);
        assert_eq!(requests[1].location, format!("/api/alice/trips/{NEW_ID}"));
        assert_eq!(requests[1].body_text(), Some("perm=shared"));

        let s = session.lock().unwrap();
        let entry = s.cache.get(&BlobId::from_hex(NEW_ID).unwrap()).unwrap();
        assert_eq!(entry.permission, Permission::Shared);
    }

    #[tokio::test]
    async fn test_upload_of_listed_blob_skips_follow_up() {
        let session = session(Permission::Public, 0);
        let blob = BlobId::from_hex(NEW_ID).unwrap();
        session
            .lock()
            .unwrap()
            .cache
            .insert(DirectoryEntry::new(blob, "old.png", "image/png"))
            .unwrap();

        let client = MockClient::new();
        client.respond(created());
        let (queue, mut rx) = queue(client.clone(), session.clone());
        queue.enqueue(PendingAction::Upload { file: cat() }).unwrap();
        queue.drain().await.unwrap();

        assert_eq!(client.requests().len(), 1);
        assert_eq!(session.lock().unwrap().cache.get(&blob).unwrap().filename, "old.png");
        assert!(collect(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::ActionCompleted(_))));
    }

    fn listed(collection: &str, ids: &[BlobId]) -> DirectorySnapshot {
        let mut snapshot = DirectorySnapshot {
            owner: Some("alice".into()),
            collection: Some(collection.into()),
            ..DirectorySnapshot::default()
        };
        for blob in ids {
            snapshot
                .entries
                .insert(*blob, DirectoryEntry::new(*blob, "x.jpg", "image/jpeg"));
        }
        snapshot
    }

    #[tokio::test]
    async fn test_upload_keeps_its_collection_when_view_changes() {
        let session = session(Permission::Shared, 1);
        let navigated = session.clone();
        let client = MockClient::new().with_observer(move |request| {
            if request.method == Method::Put {
                navigated
                    .lock()
                    .unwrap()
                    .apply_snapshot(listed("other", &[id(5)]), Intent::collection("alice", "other"));
            }
        });
        client.respond(created());
        let (queue, mut rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Upload { file: cat() }).unwrap();
        queue.drain().await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].location, "/upload/alice/trips/cat.png");
        assert_eq!(requests[1].location, format!("/api/alice/trips/{NEW_ID}"));
        assert_eq!(requests[1].body_text(), Some("perm=shared"));

        let s = session.lock().unwrap();
        assert_eq!(s.cache.current_collection(), Some("other"));
        assert!(!s.cache.contains(&BlobId::from_hex(NEW_ID).unwrap()));
        assert_eq!(s.cache.len(), 1);
        assert!(!collect(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::ActionFailed { .. })));
    }

    #[tokio::test]
    async fn test_reload_during_action_is_tolerated() {
        let session = session(Permission::Private, 2);
        let reloaded = session.clone();
        // Every reload already reflects the move of blob 1
        let client = MockClient::new().with_observer(move |request| {
            if request.method == Method::Post {
                reloaded
                    .lock()
                    .unwrap()
                    .apply_snapshot(listed("trips", &[id(2)]), Intent::collection("alice", "trips"));
            }
        });
        let (queue, mut rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Move { blob: id(1), dest: "vacation".into() }).unwrap();
        queue.enqueue(PendingAction::SetPermission { blob: id(2), perm: Permission::Public }).unwrap();
        queue.drain().await.unwrap();

        assert!(!collect(&mut rx)
            .iter()
            .any(|n| matches!(n, Notification::ActionFailed { .. })));
        let s = session.lock().unwrap();
        assert!(!s.cache.contains(&id(1)));
        assert_eq!(s.cache.get(&id(2)).unwrap().permission, Permission::Public);
        assert_eq!(s.last_destination(), Some("vacation"));
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_queue() {
        let session = session(Permission::Private, 2);
        let client = MockClient::new();
        client.respond(Response::new(500).with_body("boom"));
        client.fail("connection reset");
        client.respond(Response::new(204));
        let (queue, mut rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::SetPermission { blob: id(1), perm: Permission::Public }).unwrap();
        queue.enqueue(PendingAction::Move { blob: id(2), dest: "x".into() }).unwrap();
        queue.enqueue(PendingAction::SetPermission { blob: id(2), perm: Permission::Shared }).unwrap();
        assert_eq!(queue.drain().await.unwrap(), 3);

        let notifications = collect(&mut rx);
        let failed = notifications
            .iter()
            .filter(|n| matches!(n, Notification::ActionFailed { .. }))
            .count();
        assert_eq!(failed, 2);
        assert_eq!(notifications.last(), Some(&Notification::Drained));

        let s = session.lock().unwrap();
        assert!(s.queue_idle());
        // Failed actions leave the cache untouched
        assert_eq!(s.cache.get(&id(1)).unwrap().permission, Permission::Private);
        assert!(s.cache.contains(&id(2)));
        assert_eq!(s.cache.get(&id(2)).unwrap().permission, Permission::Shared);
        assert_eq!(s.default_permission(), Permission::Shared);
        assert!(s.last_destination().is_none());
    }

    #[tokio::test]
    async fn test_move_removes_entry_and_remembers_destination() {
        let session = session(Permission::Private, 2);
        let client = MockClient::new();
        let (queue, _rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Move { blob: id(1), dest: "vacation".into() }).unwrap();
        queue.drain().await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].location, format!("/api/alice/trips/{}", id(1)));
        assert_eq!(requests[0].body_text(), Some("move=vacation"));

        let s = session.lock().unwrap();
        assert!(!s.cache.contains(&id(1)));
        assert!(s.cache.contains(&id(2)));
        assert_eq!(s.last_destination(), Some("vacation"));
    }

    #[tokio::test]
    async fn test_unknown_blob_fails_without_request() {
        let session = session(Permission::Private, 1);
        let client = MockClient::new();
        let (queue, mut rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::Move { blob: id(7), dest: "x".into() }).unwrap();
        queue.drain().await.unwrap();

        assert!(client.requests().is_empty());
        let notifications = collect(&mut rx);
        match &notifications[1] {
            Notification::ActionFailed { error, .. } => assert!(error.contains("not in the directory cache")),
            other => panic!("unexpected notification: {other:?}"),
        }
        assert_eq!(session.lock().unwrap().cache.len(), 1);
    }

    #[tokio::test]
    async fn test_drained_emitted_once_per_drain() {
        let session = session(Permission::Private, 3);
        let (queue, mut rx) = queue(MockClient::new(), session.clone());

        // Nothing ever enqueued
        assert_eq!(queue.drain().await.unwrap(), 0);
        assert_eq!(collect(&mut rx), vec![Notification::Drained]);

        for n in 1..=3 {
            queue
                .enqueue(PendingAction::SetPermission { blob: id(n), perm: Permission::Public })
                .unwrap();
        }
        queue.drain().await.unwrap();
        let drained = collect(&mut rx)
            .into_iter()
            .filter(|n| *n == Notification::Drained)
            .count();
        assert_eq!(drained, 1);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_rejected() {
        let session = session(Permission::Private, 2);
        let client = MockClient::new().with_latency(Duration::from_millis(20));
        let (queue, _rx) = queue(client.clone(), session.clone());

        queue.enqueue(PendingAction::SetPermission { blob: id(1), perm: Permission::Public }).unwrap();
        queue.enqueue(PendingAction::SetPermission { blob: id(2), perm: Permission::Public }).unwrap();

        let (first, second) = tokio::join!(queue.drain(), queue.drain());
        assert_eq!(first.unwrap() + second.unwrap(), 2);
        assert_eq!(client.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_worker_processes_enqueued_actions() {
        let session = session(Permission::Private, 3);
        let client = MockClient::new().with_latency(Duration::from_millis(5));
        let (queue, mut rx) = queue(client.clone(), session.clone());
        let queue = Arc::new(queue);
        let worker = queue.clone().spawn();

        for n in 1..=3 {
            queue
                .enqueue(PendingAction::Move { blob: id(n), dest: "vacation".into() })
                .unwrap();
        }

        let mut completed = 0;
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("queue did not drain")
                .unwrap();
            match n {
                Notification::ActionCompleted(_) => completed += 1,
                Notification::Drained => break,
                _ => {}
            }
        }
        assert_eq!(completed, 3);
        assert_eq!(client.max_in_flight(), 1);
        assert!(session.lock().unwrap().cache.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        worker.abort();
    }
}
