//! Transfer event handling and installation of finished files.

use crate::error::DownloadError;
use crate::types::{ArchiveId, DownloadStatus, Event};
use std::path::{Path, PathBuf};

use super::{
    ActiveTransfer, DownloadCoordinator, StopIntent, TransferEvent, TransferEventKind, resume_data,
};

impl DownloadCoordinator {
    /// Apply one event reported by the session
    ///
    /// Events of tasks that are no longer the active task of their archive
    /// are dropped.
    pub(crate) async fn handle_transfer_event(&self, event: TransferEvent) {
        let TransferEvent { id, task_id, kind } = event;
        let _guard = self.lock_id(&id).await;

        let current = self
            .transfers
            .lock()
            .await
            .get(&id)
            .map(|transfer| transfer.task_id);
        if current != Some(task_id) {
            tracing::debug!(archive_id = %id, task_id, "Ignoring event of stale transfer task");
            return;
        }

        match kind {
            TransferEventKind::Progress {
                bytes_written,
                total_bytes,
            } => self.on_progress(&id, bytes_written, total_bytes).await,
            TransferEventKind::Finished {
                location,
                suggested_filename,
            } => {
                self.on_finished(&id, &location, suggested_filename.as_deref())
                    .await
            }
            TransferEventKind::Cancelled {
                resume_data,
                bytes_written,
            } => {
                let Some(transfer) = self.take_active(&id).await else {
                    return;
                };
                if transfer.intent == Some(StopIntent::Cancel) {
                    self.discard(&id).await;
                } else {
                    let resumable = self.keep_paused(&id, resume_data, bytes_written).await;
                    tracing::info!(archive_id = %id, bytes_written, resumable, "Transfer paused");
                    self.emit(Event::DownloadPaused {
                        id: id.clone(),
                        resumable,
                    });
                }
                wake(transfer);
            }
            TransferEventKind::Failed {
                message,
                retryable,
                resume_data,
                bytes_written,
            } => {
                let Some(transfer) = self.take_active(&id).await else {
                    return;
                };
                if transfer.intent == Some(StopIntent::Cancel) {
                    self.discard(&id).await;
                } else {
                    let resumable = self.keep_paused(&id, resume_data, bytes_written).await;
                    let error = DownloadError::Transport {
                        id: id.clone(),
                        message,
                        retryable,
                    };
                    tracing::warn!(archive_id = %id, error = %error, resumable, "Transfer failed");
                    self.emit(Event::DownloadFailed {
                        id: id.clone(),
                        error: error.to_string(),
                        retryable,
                    });
                }
                wake(transfer);
            }
        }
    }

    async fn on_progress(&self, id: &ArchiveId, bytes_written: u64, total_bytes: u64) {
        let (started, report) = {
            let mut transfers = self.transfers.lock().await;
            let Some(transfer) = transfers.get_mut(id) else {
                return;
            };
            let started = transfer.status == DownloadStatus::Queued;
            transfer.status = DownloadStatus::Downloading;
            let report = std::mem::take(&mut transfer.report_due);
            (started, report)
        };

        let (total_bytes, speed) = {
            let mut progresses = self.progresses.lock().await;
            let progress = progresses.entry(id.clone()).or_insert_with(|| {
                crate::progress::DownloadProgress::new(0, total_bytes, self.config.speed_samples)
            });
            progress.update(bytes_written, total_bytes);
            (progress.total_bytes, progress.speed())
        };

        if started {
            if let Err(e) = self
                .db
                .update_download_status(id, DownloadStatus::Downloading)
                .await
            {
                tracing::error!(archive_id = %id, error = %e, "Failed to persist download status");
            }
            tracing::debug!(archive_id = %id, "First bytes received");
            self.emit(Event::DownloadStarted { id: id.clone() });
        }

        if report {
            if let Err(e) = self.db.update_bytes_written(id, bytes_written).await {
                tracing::error!(archive_id = %id, error = %e, "Failed to persist bytes written");
            }
            self.emit(Event::DownloadProgress {
                id: id.clone(),
                completed_bytes: bytes_written,
                total_bytes,
                speed_bps: speed.map(|bps| bps as u64),
            });
        }
    }

    async fn on_finished(
        &self,
        id: &ArchiveId,
        location: &Path,
        suggested_filename: Option<&str>,
    ) {
        let Some(transfer) = self.take_active(id).await else {
            return;
        };
        let destination = self.destination_for(id, suggested_filename);
        let installed = self.install(location, &destination).await;

        match installed {
            Ok(()) => {
                if let Err(e) = self.db.delete_download_state(id).await {
                    tracing::error!(archive_id = %id, error = %e, "Failed to delete download state");
                }
                resume_data::remove(&self.resume_data_dir(), id).await;
                self.progresses.lock().await.remove(id);

                tracing::info!(
                    archive_id = %id,
                    path = %destination.display(),
                    "Transfer complete"
                );
                self.emit(Event::DownloadComplete {
                    id: id.clone(),
                    path: destination,
                });
            }
            Err(e) => {
                let error = DownloadError::MoveFailed {
                    id: id.clone(),
                    path: destination,
                    reason: e.to_string(),
                };
                tracing::error!(archive_id = %id, error = %error, "Failed to install archive");
                if let Err(e) = self
                    .db
                    .update_download_status(id, DownloadStatus::Errored)
                    .await
                {
                    tracing::error!(archive_id = %id, error = %e, "Failed to persist download status");
                }
                self.emit(Event::DownloadFailed {
                    id: id.clone(),
                    error: error.to_string(),
                    retryable: false,
                });
            }
        }
        wake(transfer);
    }

    /// Final location of the finished archive of `id`
    pub(crate) fn destination_for(
        &self,
        id: &ArchiveId,
        suggested_filename: Option<&str>,
    ) -> PathBuf {
        let name = suggested_filename
            .and_then(crate::utils::sanitize_file_name)
            .unwrap_or_else(|| format!("{}.{}", id, self.library.archive_extension));
        self.library.documents_dir.join(name)
    }

    async fn install(&self, location: &Path, destination: &Path) -> std::io::Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        crate::utils::move_replacing(location, destination).await
    }

    /// Persist the transfer of `id` as paused
    ///
    /// Returns whether resume data was saved. Without it the progress starts
    /// over from zero.
    async fn keep_paused(
        &self,
        id: &ArchiveId,
        resume_data: Option<Vec<u8>>,
        bytes_written: u64,
    ) -> bool {
        let saved = match resume_data {
            Some(data) if !data.is_empty() => {
                match resume_data::save(&self.resume_data_dir(), id, &data).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(archive_id = %id, error = %e, "Failed to save resume data");
                        false
                    }
                }
            }
            _ => false,
        };

        let bytes = if saved { bytes_written } else { 0 };
        if !saved {
            resume_data::remove(&self.resume_data_dir(), id).await;
        }

        if let Some(progress) = self.progresses.lock().await.get_mut(id) {
            let total = progress.total_bytes;
            progress.update(bytes, total);
        }

        if let Err(e) = self
            .db
            .update_download_state(id, DownloadStatus::Paused, bytes)
            .await
        {
            tracing::error!(archive_id = %id, error = %e, "Failed to persist paused state");
        }
        saved
    }

    async fn take_active(&self, id: &ArchiveId) -> Option<ActiveTransfer> {
        self.transfers.lock().await.remove(id)
    }
}

/// Release everyone waiting for `transfer` to stop
fn wake(transfer: ActiveTransfer) {
    for waiter in transfer.waiters {
        waiter.send(()).ok();
    }
}
