//! # hrb-client
//!
//! Client core for a hearty_rabbit photo store: the directory cache of the
//! displayed view, the sequential action queue for uploads, moves and
//! permission changes, and the [`Gallery`] facade tying them to the remote
//! store over HTTP.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod network;
pub mod queue;
pub mod remote;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use cache::{CollectionInfo, DirectoryCache, DirectoryEntry, DirectorySnapshot};
pub use config::ClientConfig;
pub use error::{ClientError, Result, StateError, TransportError};
pub use events::{ActionSummary, Notification, Notifier};
pub use gallery::Gallery;
pub use network::{HttpClient, Method, NetworkClient, Request, Response};
pub use queue::{ActionQueue, PendingAction, QueueState};
pub use remote::{RemoteStore, UploadFile};
pub use session::{Session, SharedSession, ViewChange, ViewStamp};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hrb_client=debug,hrb_shared=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
