//! # hrb
//!
//! Command-line front end for a hearty_rabbit photo store. Each command
//! loads the directory at `location` first, so blob ids refer to the
//! listing found there.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use hrb_client::{ClientConfig, Gallery, HttpClient, Notification, UploadFile};
use hrb_shared::constants::DEFAULT_COLLECTION_LABEL;
use hrb_shared::{BlobId, Permission};

#[derive(Parser, Debug)]
#[command(name = "hrb")]
#[command(about = "Browse and manage a hearty_rabbit photo store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a collection, or your collections
    #[command(alias = "list")]
    Ls {
        /// Location such as /view/alice/trips (default: your collections)
        location: Option<String>,
    },

    /// Upload files into a collection
    Upload {
        location: String,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Move a blob into another collection
    Mv {
        location: String,
        blob: BlobId,
        dest: String,
    },

    /// Change a blob's permission (private, shared, public)
    Perm {
        location: String,
        blob: BlobId,
        perm: Permission,
    },

    /// Delete a blob
    Rm { location: String, blob: BlobId },

    /// Create a share link for a collection
    Share { location: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hrb_client::init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();
    info!(server = %config.server_url, user = ?config.username, "Loaded configuration");

    let client = HttpClient::new(config.server_url.clone())?;
    let (gallery, mut rx) = Gallery::new(&config, client);

    match cli.command {
        Commands::Ls { location } => {
            gallery
                .navigate_to(location.as_deref().unwrap_or("/"))
                .await
                .context("loading directory")?;
            print_directory(&gallery)?;
        }
        Commands::Upload { location, files } => {
            gallery.navigate_to(&location).await?;
            let uploads = futures::future::try_join_all(files.iter().map(|path| async move {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                anyhow::Ok(UploadFile::new(file_name(path), mime_for(path), data))
            }))
            .await?;
            // Queued in command-line order
            for file in uploads {
                gallery.enqueue_upload(file)?;
            }
            gallery.drain().await?;
            report(&mut rx);
        }
        Commands::Mv {
            location,
            blob,
            dest,
        } => {
            gallery.navigate_to(&location).await?;
            gallery.enqueue_move(blob, dest)?;
            gallery.drain().await?;
            report(&mut rx);
        }
        Commands::Perm {
            location,
            blob,
            perm,
        } => {
            gallery.navigate_to(&location).await?;
            gallery.enqueue_set_permission(blob, perm)?;
            gallery.drain().await?;
            report(&mut rx);
        }
        Commands::Rm { location, blob } => {
            gallery.navigate_to(&location).await?;
            gallery.delete_blob(&blob).await?;
            println!("deleted {blob}");
        }
        Commands::Share { location } => {
            gallery.navigate_to(&location).await?;
            let link = gallery.create_share_link().await?;
            println!("{}{link}", config.server_url);
        }
    }

    Ok(())
}

fn print_directory(gallery: &Gallery<HttpClient>) -> anyhow::Result<()> {
    let session = gallery
        .session()
        .lock()
        .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
    let cache = &session.cache;

    if let Some(message) = cache.error_message() {
        eprintln!("store: {message}");
    }

    if cache.is_collection_view() {
        for entry in cache.sorted() {
            let when = entry
                .datetime()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let cover = if cache.cover() == Some(entry.blob_id) { "*" } else { " " };
            println!(
                "{}{} {:<8} {:<16} {:<20} {}",
                cover, entry.blob_id, entry.permission, when, entry.mime, entry.filename
            );
        }
        println!("{} blobs", cache.len());
    } else {
        for (name, info) in cache.collections() {
            println!("{}/{}", info.owner, collection_label(name));
        }
        for entry in cache.sorted() {
            println!("{} {:<8} {}", entry.blob_id, entry.permission, entry.filename);
        }
    }
    Ok(())
}

/// Print the outcome of every queued action.
fn report(rx: &mut mpsc::Receiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        match notification {
            Notification::Uploaded { blob, filename } => println!("uploaded {filename} as {blob}"),
            Notification::Moved { blob, dest } => println!("moved {blob} to {dest}"),
            Notification::PermissionChanged { blob, perm } => println!("{blob} is now {perm}"),
            Notification::ActionFailed { action, error } => eprintln!("failed {action:?}: {error}"),
            _ => {}
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn collection_label(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_COLLECTION_LABEL
    } else {
        name
    }
}

fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
