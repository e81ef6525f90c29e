//! # hrb-shared
//!
//! Value types shared by every hearty_rabbit client component: blob
//! identifiers, permissions, the location model ([`Intent`]) and the
//! documents exchanged with the remote store. Nothing in this crate
//! performs I/O.

pub mod constants;
pub mod error;
pub mod intent;
pub mod protocol;
pub mod types;

pub use error::ParseError;
pub use intent::{Action, Intent, IntentResolver, Query};
pub use protocol::{CollectionJson, Directive, DirectoryJson, ElementJson, MetaJson};
pub use types::{BlobId, Permission};
