//! Relaunch continuity and shutdown.

use crate::error::Result;
use crate::progress::DownloadProgress;
use crate::types::{ArchiveId, DownloadStatus};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{ActiveTransfer, DownloadCoordinator, RestoredTask, StopIntent, resume_data};

/// Upper bound on the time shutdown waits for transfers to pause
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl DownloadCoordinator {
    /// Rebuild progress for every persisted transfer after a relaunch
    ///
    /// Tasks the session carried over are re-attached to their state, so a
    /// transfer that kept running shows its real progress. A state that claims
    /// to be in flight but has no task is marked `Paused`. Carried-over tasks
    /// without a state are cancelled. A carried-over task whose state is
    /// paused is stopped again with resume data.
    ///
    /// Returns the number of persisted transfers.
    pub async fn restore_progresses(&self) -> Result<usize> {
        let states = self.db.list_download_states().await?;
        let restored = self
            .session
            .restored_tasks(self.transfer_tx.clone())
            .await;

        if let Some(highest) = restored.iter().map(|task| task.task_id).max() {
            self.next_task_id
                .fetch_max(highest.saturating_add(1), Ordering::SeqCst);
        }
        let mut restored: HashMap<ArchiveId, RestoredTask> = restored
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();

        for state in &states {
            let id = &state.catalog_entry_id;
            let _guard = self.lock_id(id).await;

            let expected = match self.db.get_catalog_entry(id).await {
                Ok(entry) => entry.map(|entry| entry.file_size.max(0) as u64).unwrap_or(0),
                Err(e) => {
                    tracing::warn!(archive_id = %id, error = %e, "Failed to read catalog entry");
                    0
                }
            };
            let persisted = state.total_bytes_written.max(0) as u64;

            match restored.remove(id) {
                Some(task) => {
                    let total = if task.total_bytes > 0 {
                        task.total_bytes
                    } else {
                        expected
                    };
                    self.progresses.lock().await.insert(
                        id.clone(),
                        DownloadProgress::new(task.bytes_written, total, self.config.speed_samples),
                    );

                    let status = state.status();
                    let stopped = !status.is_in_flight();
                    let mut transfer = ActiveTransfer::new(
                        task.task_id,
                        if stopped {
                            DownloadStatus::Downloading
                        } else {
                            status
                        },
                    );
                    if stopped {
                        transfer.intent = Some(StopIntent::Pause);
                    }
                    self.transfers.lock().await.insert(id.clone(), transfer);

                    if stopped {
                        self.session.cancel(task.task_id, true).await;
                    }
                    tracing::info!(archive_id = %id, task_id = task.task_id, "Re-attached transfer");
                }
                None => {
                    let resumable = resume_data::exists(&self.resume_data_dir(), id).await;
                    let completed = if resumable { persisted } else { 0 };
                    self.progresses.lock().await.insert(
                        id.clone(),
                        DownloadProgress::new(completed, expected, self.config.speed_samples),
                    );

                    if state.status().is_in_flight() {
                        self.db
                            .update_download_state(id, DownloadStatus::Paused, completed)
                            .await?;
                        tracing::info!(
                            archive_id = %id,
                            resumable,
                            "Marked interrupted transfer as paused"
                        );
                    }
                }
            }
        }

        for task in restored.into_values() {
            tracing::warn!(
                archive_id = %task.id,
                task_id = task.task_id,
                "Cancelling carried-over task without download state"
            );
            self.session.cancel(task.task_id, false).await;
        }

        Ok(states.len())
    }

    /// Pause every running transfer
    pub async fn pause_all(&self) {
        let active: Vec<ArchiveId> = self.transfers.lock().await.keys().cloned().collect();
        for id in active {
            if let Err(e) = self.pause(&id).await {
                tracing::warn!(archive_id = %id, error = %e, "Failed to pause transfer");
            }
        }
    }

    /// Stop accepting transfers, pause running ones and stop background tasks
    pub async fn shutdown(&self) {
        self.accepting_new.store(false, Ordering::SeqCst);

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.pause_all())
            .await
            .is_err()
        {
            tracing::warn!("Timeout waiting for transfers to pause, proceeding with shutdown");
        }

        self.shutdown_token.cancel();
        tracing::info!("Download coordinator stopped");
    }
}
