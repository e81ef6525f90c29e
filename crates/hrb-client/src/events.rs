use hrb_shared::{BlobId, Permission};
use tokio::sync::mpsc;

/// Short description of a queued action, without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSummary {
    Upload { filename: String },
    Move { blob: BlobId, dest: String },
    SetPermission { blob: BlobId, perm: Permission },
}

/// Progress reports for the user-facing notification area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ActionStarted(ActionSummary),
    ActionCompleted(ActionSummary),
    ActionFailed { action: ActionSummary, error: String },
    Uploaded { blob: BlobId, filename: String },
    Moved { blob: BlobId, dest: String },
    PermissionChanged { blob: BlobId, perm: Permission },
    /// All background tasks finished; the current view should be refreshed.
    Drained,
}

/// Sending half of the notification channel.
///
/// Delivery never blocks: a full or closed channel drops the notification.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that discards everything.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn notify(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(notification) {
            match e {
                mpsc::error::TrySendError::Full(n) => {
                    tracing::warn!(notification = ?n, "Notification channel full, dropping");
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_delivers_in_order() {
        let (notifier, mut rx) = Notifier::channel(4);
        notifier.notify(Notification::Drained);
        notifier.notify(Notification::ActionStarted(ActionSummary::Upload {
            filename: "cat.png".into(),
        }));
        assert_eq!(rx.recv().await, Some(Notification::Drained));
        assert!(matches!(rx.recv().await, Some(Notification::ActionStarted(_))));
    }

    #[test]
    fn test_full_or_closed_channel_never_blocks() {
        let (notifier, rx) = Notifier::channel(1);
        notifier.notify(Notification::Drained);
        notifier.notify(Notification::Drained);
        drop(rx);
        notifier.notify(Notification::Drained);
        Notifier::silent().notify(Notification::Drained);
    }
}
