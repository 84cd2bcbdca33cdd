//! Library lifecycle
//!
//! [`Library`] wires the registry, directory watcher, search coordinator and
//! download coordinator around one database and one event channel.

use crate::catalog::{CatalogParser, CatalogRefresh, CatalogRefresher};
use crate::config::Config;
use crate::db::Database;
use crate::download::{DownloadCoordinator, HttpTransferSession, TransferSession};
use crate::engine::ArchiveEngine;
use crate::error::{Error, Result};
use crate::registry::ArchiveRegistry;
use crate::search::SearchCoordinator;
use crate::types::Event;
use crate::watcher::DirectoryWatcher;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Main library instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Library {
    /// Database instance, public for integration tests
    pub db: Arc<Database>,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    registry: ArchiveRegistry,
    watcher: Arc<DirectoryWatcher>,
    search: SearchCoordinator,
    downloads: DownloadCoordinator,
    catalog: Arc<CatalogRefresher>,
    /// Stops the watcher listener
    listener_token: CancellationToken,
}

impl Library {
    /// Create a library over `engine`, transferring archives with `session`
    ///
    /// Creates the documents and cache directories and opens the database.
    /// Nothing is scanned or watched until [`start`](Self::start).
    pub async fn new(
        config: Config,
        engine: Arc<dyn ArchiveEngine>,
        session: Arc<dyn TransferSession>,
    ) -> Result<Self> {
        config.validate()?;

        create_dir(&config.library.documents_dir, "documents").await?;
        create_dir(&config.library.cache_dir, "cache").await?;
        create_dir(&config.library.resume_data_dir(), "resume data").await?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let registry = ArchiveRegistry::new(
            config.library.clone(),
            engine,
            db.clone(),
            event_tx.clone(),
        );
        let watcher = Arc::new(DirectoryWatcher::new(
            config.library.documents_dir.clone(),
            config.watcher.clone(),
            event_tx.clone(),
        ));
        let search = SearchCoordinator::new(
            registry.clone(),
            db.clone(),
            config.catalog.max_recent_searches,
        );
        let downloads = DownloadCoordinator::new(
            config.download.clone(),
            config.library.clone(),
            db.clone(),
            session,
            event_tx.clone(),
        );
        let catalog = Arc::new(CatalogRefresher::new(db.clone(), config.retry.clone())?);

        Ok(Self {
            db,
            config: Arc::new(config),
            event_tx,
            registry,
            watcher,
            search,
            downloads,
            catalog,
            listener_token: CancellationToken::new(),
        })
    }

    /// Create a library that transfers archives over HTTP
    ///
    /// Partial files are kept in `<cache_dir>/Partial`.
    pub async fn with_http_session(config: Config, engine: Arc<dyn ArchiveEngine>) -> Result<Self> {
        let session = HttpTransferSession::new(config.library.cache_dir.join("Partial"))?;
        Self::new(config, engine, Arc::new(session)).await
    }

    /// Bring the library up
    ///
    /// Scans the documents directory, restores persisted transfers and starts
    /// watching for changes. Every settled burst of directory changes triggers
    /// a coalesced rescan.
    pub async fn start(&self) -> Result<()> {
        if self.db.was_unclean_shutdown().await? {
            tracing::info!("Previous session did not shut down cleanly");
        }
        self.db.set_clean_start().await?;

        let report = self.registry.rescan().await?;
        tracing::info!(
            archives = self.registry.len().await,
            failed = report.failed.len(),
            "Initial scan complete"
        );

        let transfers = self.downloads.restore_progresses().await?;
        if transfers > 0 {
            tracing::info!(transfers, "Restored persisted transfers");
        }

        self.spawn_change_listener();
        self.watcher.start_monitoring().await;
        Ok(())
    }

    /// Rescan whenever the watcher reports a settled directory
    fn spawn_change_listener(&self) {
        let mut events = self.event_tx.subscribe();
        let registry = self.registry.clone();
        let token = self.listener_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(Event::DirectoryChanged) => registry.request_rescan(),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // A DirectoryChanged may be among the skipped events
                            tracing::warn!(skipped, "Change listener lagged, rescanning");
                            registry.request_rescan();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Change listener stopped");
        });
    }

    /// Subscribe to library events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Library configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open archives
    pub fn registry(&self) -> &ArchiveRegistry {
        &self.registry
    }

    /// Multi-archive search
    pub fn search(&self) -> &SearchCoordinator {
        &self.search
    }

    /// Archive transfers
    pub fn downloads(&self) -> &DownloadCoordinator {
        &self.downloads
    }

    /// Whether the documents directory is being watched
    pub async fn is_watching(&self) -> bool {
        self.watcher.is_monitoring().await
    }

    /// Refresh the catalog from the configured url
    ///
    /// # Errors
    /// Returns [`Error::Config`] when no catalog url is configured, otherwise
    /// any fetch, parse or database error.
    pub async fn refresh_catalog(&self, parser: &dyn CatalogParser) -> Result<CatalogRefresh> {
        let url = self.config.catalog.url.as_deref().ok_or_else(|| Error::Config {
            message: "no catalog url configured".to_string(),
            key: Some("catalog.url".to_string()),
        })?;

        let refresh = self.catalog.refresh(url, parser).await?;
        self.event_tx
            .send(Event::CatalogRefreshed {
                added: refresh.added,
                removed: refresh.removed,
            })
            .ok();
        Ok(refresh)
    }

    /// Gracefully shut the library down
    ///
    /// 1. Pauses running transfers and refuses new ones
    /// 2. Stops watching the documents directory
    /// 3. Cancels any running search and closes every archive
    /// 4. Marks the shutdown as clean and emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.downloads.shutdown().await;
        self.listener_token.cancel();
        self.watcher.stop_monitoring().await;
        self.search.cancel();
        self.registry.close_all().await;

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        }

        self.event_tx.send(Event::Shutdown).ok();
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}

async fn create_dir(path: &Path, what: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create {} directory '{}': {}",
                what,
                path.display(),
                e
            ),
        ))
    })
}
