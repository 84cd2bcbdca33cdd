//! Download coordination
//!
//! [`DownloadCoordinator`] owns the lifecycle of archive transfers against one
//! [`TransferSession`]. Per archive, the persisted state moves through:
//!
//! ```text
//! (none) --start--> Queued --first bytes--> Downloading
//! Downloading --pause--> Paused (resume data saved)
//! Paused --resume--> Queued
//! Queued/Downloading --cancel--> (none)
//! Downloading --transport error--> Paused (resume data when available)
//! Downloading --complete--> (none) (file moved into the documents directory)
//! ```
//!
//! All transitions for one archive are serialized through a per-archive lock.
//! Pause and cancel are signalled to the session identically; the intent
//! recorded just before cancelling decides how the `Cancelled` event is
//! interpreted.
//!
//! The coordinator never registers finished archives itself. The directory
//! watcher notices the new file and the registry picks it up.
//!
//! Methods are organized by domain:
//! - [`control`] - start, pause, resume, cancel
//! - [`completion`] - Transfer event handling and file installation
//! - [`restore`] - Relaunch continuity and shutdown
//! - [`background_tasks`] - Event loop and progress reporting

mod background_tasks;
mod completion;
mod control;
mod http;
mod restore;
pub(crate) mod resume_data;
mod session;

pub use http::HttpTransferSession;
pub use session::{
    RestoredTask, TaskId, TransferEvent, TransferEventKind, TransferRequest, TransferSession,
};

use crate::config::{DownloadConfig, LibraryConfig};
use crate::db::Database;
use crate::error::{DownloadError, Error, Result};
use crate::progress::DownloadProgress;
use crate::types::{ArchiveId, DownloadStatus, Event, SpaceState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How a `Cancelled` event should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopIntent {
    /// Keep the state, save resume data
    Pause,
    /// Discard the state and any resume data
    Cancel,
}

/// A transfer task the session is running for one archive
#[derive(Debug)]
pub(crate) struct ActiveTransfer {
    pub(crate) task_id: TaskId,
    pub(crate) status: DownloadStatus,
    /// Set immediately before asking the session to cancel
    pub(crate) intent: Option<StopIntent>,
    /// Callers waiting for the task to settle
    pub(crate) waiters: Vec<oneshot::Sender<()>>,
    /// Set by the reporter, consumed by the next progress event
    pub(crate) report_due: bool,
}

impl ActiveTransfer {
    pub(crate) fn new(task_id: TaskId, status: DownloadStatus) -> Self {
        Self {
            task_id,
            status,
            intent: None,
            waiters: Vec::new(),
            report_due: true,
        }
    }
}

/// Snapshot of one persisted transfer
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSummary {
    /// Archive id
    pub id: ArchiveId,
    /// Persisted status
    pub status: DownloadStatus,
    /// Bytes written
    pub completed_bytes: u64,
    /// Expected size (0 when unknown)
    pub total_bytes: u64,
    /// Smoothed speed, once enough samples exist
    pub speed_bps: Option<u64>,
    /// Human readable two-line status
    pub description: String,
}

/// Coordinates archive transfers (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadCoordinator {
    pub(crate) config: Arc<DownloadConfig>,
    pub(crate) library: Arc<LibraryConfig>,
    pub(crate) db: Arc<Database>,
    pub(crate) session: Arc<dyn TransferSession>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Running tasks by archive id
    pub(crate) transfers: Arc<Mutex<HashMap<ArchiveId, ActiveTransfer>>>,
    /// Progress of every persisted transfer, running or not
    pub(crate) progresses: Arc<Mutex<HashMap<ArchiveId, DownloadProgress>>>,
    /// Serializes transitions per archive
    pub(crate) id_locks: Arc<std::sync::Mutex<HashMap<ArchiveId, Arc<Mutex<()>>>>>,
    /// Sender handed to the session for task events
    pub(crate) transfer_tx: mpsc::UnboundedSender<TransferEvent>,
    pub(crate) next_task_id: Arc<AtomicU64>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the background tasks
    pub(crate) shutdown_token: CancellationToken,
}

impl DownloadCoordinator {
    /// Create the coordinator and spawn its event loop and progress reporter
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: DownloadConfig,
        library: LibraryConfig,
        db: Arc<Database>,
        session: Arc<dyn TransferSession>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (transfer_tx, transfer_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            config: Arc::new(config),
            library: Arc::new(library),
            db,
            session,
            event_tx,
            transfers: Arc::new(Mutex::new(HashMap::new())),
            progresses: Arc::new(Mutex::new(HashMap::new())),
            id_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
            transfer_tx,
            next_task_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        };

        coordinator.spawn_event_loop(transfer_rx);
        coordinator.spawn_progress_reporter();
        coordinator
    }

    /// Wait for exclusive access to the state of `id`
    pub(crate) async fn lock_id(&self, id: &ArchiveId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        self.next_task_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn resume_data_dir(&self) -> PathBuf {
        self.library.resume_data_dir()
    }

    /// Whether a transfer task is running for `id`
    pub async fn is_active(&self, id: &ArchiveId) -> bool {
        self.transfers.lock().await.contains_key(id)
    }

    /// Number of running transfer tasks
    pub async fn active_count(&self) -> usize {
        self.transfers.lock().await.len()
    }

    /// Progress of the transfer of `id`
    pub async fn progress(&self, id: &ArchiveId) -> Option<DownloadProgress> {
        self.progresses.lock().await.get(id).cloned()
    }

    /// Two-line status text of the transfer of `id`
    pub async fn description(&self, id: &ArchiveId) -> Result<Option<String>> {
        let Some(status) = self.status(id).await? else {
            return Ok(None);
        };
        Ok(self
            .progresses
            .lock()
            .await
            .get(id)
            .map(|progress| progress.description(status)))
    }

    /// Persisted status of the transfer of `id`
    pub async fn status(&self, id: &ArchiveId) -> Result<Option<DownloadStatus>> {
        Ok(self
            .db
            .get_download_state(id)
            .await?
            .map(|state| state.status()))
    }

    /// Every persisted transfer with its progress, oldest first
    pub async fn list_downloads(&self) -> Result<Vec<DownloadSummary>> {
        let states = self.db.list_download_states().await?;
        let progresses = self.progresses.lock().await;

        Ok(states
            .into_iter()
            .map(|state| {
                let status = state.status();
                let progress = progresses.get(&state.catalog_entry_id).cloned().unwrap_or_else(|| {
                    DownloadProgress::new(
                        state.total_bytes_written.max(0) as u64,
                        0,
                        self.config.speed_samples,
                    )
                });
                DownloadSummary {
                    id: state.catalog_entry_id,
                    status,
                    completed_bytes: progress.completed_bytes,
                    total_bytes: progress.total_bytes,
                    speed_bps: progress.speed().map(|speed| speed as u64),
                    description: progress.description(status),
                }
            })
            .collect())
    }

    /// Free space in the documents directory relative to the size of `id`
    pub async fn space_state(&self, id: &ArchiveId) -> Result<SpaceState> {
        let entry = self
            .db
            .get_catalog_entry(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.clone() })?;
        let available = self.available_space().await?;
        Ok(SpaceState::classify(entry.file_size.max(0) as u64, available))
    }

    pub(crate) async fn available_space(&self) -> Result<u64> {
        let documents = self.library.documents_dir.clone();
        tokio::task::spawn_blocking(move || crate::utils::available_space_for(&documents))
            .await
            .map_err(|e| Error::Other(format!("disk space task failed: {}", e)))?
            .map_err(Error::Io)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
