//! Transfer control: start, pause, resume, cancel.

use crate::error::{DownloadError, Error, Result};
use crate::progress::DownloadProgress;
use crate::types::{ArchiveId, DownloadStatus, Event, LocalState, SpaceState};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::oneshot;

use super::{ActiveTransfer, DownloadCoordinator, StopIntent, TransferRequest, resume_data};

/// How long pause and cancel wait for the session to settle the task
pub(crate) const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl DownloadCoordinator {
    /// Start fetching the archive of a catalog entry
    ///
    /// Marks the entry as transferring, creates a `Queued` download state and
    /// hands the transfer to the session. The state becomes `Downloading` once
    /// the first bytes arrive.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) began
    /// - [`DownloadError::InvalidState`] when the entry already has a transfer
    /// - [`DownloadError::NotFound`] / [`DownloadError::NoRemoteUrl`] for an
    ///   unknown entry or one without a url
    /// - [`Error::InsufficientSpace`] when the archive cannot fit on disk
    ///
    /// On any error nothing is left behind.
    pub async fn start(&self, id: &ArchiveId) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let _guard = self.lock_id(id).await;

        if let Some(state) = self.db.get_download_state(id).await? {
            return Err(Error::Download(DownloadError::InvalidState {
                id: id.clone(),
                operation: "start".to_string(),
                current_state: format!("{:?}", state.status()),
            }));
        }

        let entry = self
            .db
            .get_catalog_entry(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.clone() })?;
        let url = entry
            .url
            .clone()
            .ok_or_else(|| DownloadError::NoRemoteUrl { id: id.clone() })?;
        let total_bytes = entry.file_size.max(0) as u64;

        if self.config.check_disk_space {
            let available = self.available_space().await?;
            if SpaceState::classify(total_bytes, available) == SpaceState::NotEnough {
                return Err(Error::InsufficientSpace {
                    required: total_bytes,
                    available,
                });
            }
        }

        self.db.set_local_state(id, LocalState::Transferring).await?;
        if let Err(e) = self.db.insert_download_state(id, DownloadStatus::Queued).await {
            self.restore_remote(id).await;
            return Err(e);
        }
        resume_data::remove(&self.resume_data_dir(), id).await;

        self.progresses.lock().await.insert(
            id.clone(),
            DownloadProgress::new(0, total_bytes, self.config.speed_samples),
        );

        if let Err(e) = self.launch(id, url, None).await {
            tracing::warn!(archive_id = %id, error = %e, "Failed to start transfer");
            self.db.delete_download_state(id).await.ok();
            self.progresses.lock().await.remove(id);
            self.restore_remote(id).await;
            return Err(e);
        }

        tracing::info!(archive_id = %id, total_bytes, "Transfer queued");
        self.emit(Event::DownloadQueued { id: id.clone() });
        Ok(())
    }

    /// Pause a transfer, keeping resume data
    ///
    /// Waits until the session reports the task stopped. Pausing an already
    /// paused transfer is a no-op. A transfer left in flight by a previous
    /// process without a running task is marked paused directly.
    pub async fn pause(&self, id: &ArchiveId) -> Result<()> {
        let guard = self.lock_id(id).await;

        if let Some((task_id, settled)) = self.request_stop(id, StopIntent::Pause).await {
            self.session.cancel(task_id, true).await;
            drop(guard);
            self.wait_settled(id, "pause", settled).await;
            return Ok(());
        }

        let state = self
            .db
            .get_download_state(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.clone() })?;

        match state.status() {
            DownloadStatus::Paused => Ok(()),
            DownloadStatus::Errored => Err(Error::Download(DownloadError::InvalidState {
                id: id.clone(),
                operation: "pause".to_string(),
                current_state: format!("{:?}", DownloadStatus::Errored),
            })),
            DownloadStatus::Queued | DownloadStatus::Downloading => {
                // No task behind this state, nothing to signal
                self.db
                    .update_download_status(id, DownloadStatus::Paused)
                    .await?;
                let resumable = resume_data::exists(&self.resume_data_dir(), id).await;
                self.emit(Event::DownloadPaused {
                    id: id.clone(),
                    resumable,
                });
                Ok(())
            }
        }
    }

    /// Resume a paused transfer from its saved resume data
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ResumeDataMissingOrCorrupt`] when no usable
    /// resume data is on disk or the session rejects it. The state stays
    /// `Paused`; the caller decides whether to cancel and start over.
    pub async fn resume(&self, id: &ArchiveId) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let _guard = self.lock_id(id).await;

        if self.transfers.lock().await.contains_key(id) {
            return Ok(());
        }

        let state = self
            .db
            .get_download_state(id)
            .await?
            .ok_or_else(|| DownloadError::NotFound { id: id.clone() })?;

        if state.status() == DownloadStatus::Errored {
            return Err(Error::Download(DownloadError::InvalidState {
                id: id.clone(),
                operation: "resume".to_string(),
                current_state: format!("{:?}", DownloadStatus::Errored),
            }));
        }

        let url = self
            .db
            .get_catalog_entry(id)
            .await?
            .and_then(|entry| entry.url)
            .ok_or_else(|| DownloadError::NoRemoteUrl { id: id.clone() })?;

        if state.status() != DownloadStatus::Paused {
            self.db
                .update_download_status(id, DownloadStatus::Paused)
                .await?;
        }

        let data = resume_data::load(&self.resume_data_dir(), id).await?;

        self.db
            .update_download_status(id, DownloadStatus::Queued)
            .await?;

        if let Err(e) = self.launch(id, url, Some(data)).await {
            tracing::warn!(archive_id = %id, error = %e, "Failed to resume transfer");
            self.db
                .update_download_status(id, DownloadStatus::Paused)
                .await?;
            return Err(e);
        }

        resume_data::remove(&self.resume_data_dir(), id).await;

        tracing::info!(archive_id = %id, "Transfer resumed");
        self.emit(Event::DownloadQueued { id: id.clone() });
        Ok(())
    }

    /// Cancel a transfer and discard its state and resume data
    ///
    /// The catalog entry goes back to remote.
    pub async fn cancel(&self, id: &ArchiveId) -> Result<()> {
        let guard = self.lock_id(id).await;

        if let Some((task_id, settled)) = self.request_stop(id, StopIntent::Cancel).await {
            self.session.cancel(task_id, false).await;
            drop(guard);
            self.wait_settled(id, "cancel", settled).await;
            return Ok(());
        }

        if self.db.get_download_state(id).await?.is_none() {
            return Err(Error::Download(DownloadError::NotFound { id: id.clone() }));
        }

        self.discard(id).await;
        Ok(())
    }

    /// Hand a transfer to the session and register it as active
    pub(crate) async fn launch(
        &self,
        id: &ArchiveId,
        url: String,
        resume_data: Option<Vec<u8>>,
    ) -> Result<()> {
        let task_id = self.next_task_id();
        self.transfers.lock().await.insert(
            id.clone(),
            ActiveTransfer::new(task_id, DownloadStatus::Queued),
        );

        let request = TransferRequest {
            id: id.clone(),
            task_id,
            url,
            resume_data,
        };
        if let Err(e) = self.session.start(request, self.transfer_tx.clone()).await {
            self.transfers.lock().await.remove(id);
            return Err(e);
        }
        Ok(())
    }

    /// Record the intent on the active transfer of `id`
    ///
    /// Returns the task to cancel and a receiver that fires once the task
    /// settled, or `None` when nothing is running.
    async fn request_stop(
        &self,
        id: &ArchiveId,
        intent: StopIntent,
    ) -> Option<(super::TaskId, oneshot::Receiver<()>)> {
        let mut transfers = self.transfers.lock().await;
        let transfer = transfers.get_mut(id)?;

        // A cancel overrides an earlier pause, never the other way around
        if transfer.intent != Some(StopIntent::Cancel) {
            transfer.intent = Some(intent);
        }
        let (tx, rx) = oneshot::channel();
        transfer.waiters.push(tx);
        Some((transfer.task_id, rx))
    }

    async fn wait_settled(&self, id: &ArchiveId, operation: &str, settled: oneshot::Receiver<()>) {
        if tokio::time::timeout(STOP_TIMEOUT, settled).await.is_err() {
            tracing::warn!(
                archive_id = %id,
                operation,
                "Transfer did not stop within timeout"
            );
        }
    }

    /// Delete every trace of the transfer of `id`
    pub(crate) async fn discard(&self, id: &ArchiveId) {
        if let Err(e) = self.db.delete_download_state(id).await {
            tracing::error!(archive_id = %id, error = %e, "Failed to delete download state");
        }
        resume_data::remove(&self.resume_data_dir(), id).await;
        self.progresses.lock().await.remove(id);
        self.restore_remote(id).await;

        tracing::info!(archive_id = %id, "Transfer cancelled");
        self.emit(Event::DownloadCancelled { id: id.clone() });
    }

    /// Put the catalog entry back to remote, unless it is already on disk
    async fn restore_remote(&self, id: &ArchiveId) {
        match self.db.get_catalog_entry(id).await {
            Ok(Some(entry)) if entry.local_state() == LocalState::Transferring => {
                if let Err(e) = self.db.set_local_state(id, LocalState::Remote).await {
                    tracing::error!(archive_id = %id, error = %e, "Failed to reset local state");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(archive_id = %id, error = %e, "Failed to read catalog entry"),
        }
    }
}
