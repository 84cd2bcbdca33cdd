//! # zimkit
//!
//! Coordination core for an offline reader of ZIM content archives.
//!
//! zimkit keeps a set of open archives in line with a documents directory,
//! runs merged searches across them and manages resumable archive transfers.
//! The archive format itself is handled by a pluggable [`ArchiveEngine`].
//!
//! - [`ArchiveRegistry`] - open archives, rescans and catalog reconciliation
//! - [`DirectoryWatcher`] - reports when the documents directory settles
//! - [`SearchCoordinator`] - cancellable multi-archive search
//! - [`DownloadCoordinator`] - start, pause, resume and cancel transfers
//! - [`Library`] - wires all of the above around one database
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use zimkit::{Config, JsonArchiveEngine, Library};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(JsonArchiveEngine::default());
//!     let library = Library::with_http_session(Config::default(), engine).await?;
//!     library.start().await?;
//!
//!     let mut events = library.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     if let Some(results) = library.search().search("ray charles").await {
//!         for hit in results {
//!             println!("{} ({})", hit.title, hit.path);
//!         }
//!     }
//!
//!     zimkit::run_with_shutdown(library).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote catalog refresh
pub mod catalog;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Archive transfer coordination
pub mod download;
/// Archive engine contract
pub mod engine;
/// Error types
pub mod error;
/// Library lifecycle
pub mod library;
/// Transfer progress and speed estimation
pub mod progress;
/// Open archive registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Multi-archive search
pub mod search;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Documents directory watching
pub mod watcher;

// Re-export commonly used types
pub use catalog::{CatalogParser, CatalogRecord, CatalogRefresh, JsonCatalogParser};
pub use config::Config;
pub use db::Database;
pub use download::{DownloadCoordinator, DownloadSummary, HttpTransferSession, TransferSession};
pub use engine::{ArchiveEngine, ArchiveHandle, JsonArchiveEngine};
pub use error::{DatabaseError, DownloadError, Error, Result};
pub use library::Library;
pub use progress::DownloadProgress;
pub use registry::{ArchiveRegistry, RescanReport};
pub use search::SearchCoordinator;
pub use types::{
    ArchiveId, ArchiveMetadata, DownloadStatus, Event, LocalState, SearchResult, SpaceState,
};
pub use watcher::DirectoryWatcher;

/// Run the library until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(library: Library) -> Result<()> {
    wait_for_signal().await;
    library.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register every signal handler");
            only.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
