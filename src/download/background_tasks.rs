//! Background tasks: the session event loop and the progress reporter.

use super::{DownloadCoordinator, TransferEvent};
use tokio::sync::mpsc;

impl DownloadCoordinator {
    /// Apply session events one at a time until shutdown
    pub(crate) fn spawn_event_loop(&self, mut rx: mpsc::UnboundedReceiver<TransferEvent>) {
        let coordinator = self.clone();
        let cancel = self.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => coordinator.handle_transfer_event(event).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("Transfer event loop stopped");
        });
    }

    /// Sample speeds and arm the per-transfer report flag
    ///
    /// Every `sample_interval` each active transfer records a speed sample.
    /// Every `report_interval` each active transfer is marked due, and its next
    /// progress event is reported.
    pub(crate) fn spawn_progress_reporter(&self) {
        let coordinator = self.clone();
        let cancel = self.shutdown_token.clone();
        let sample_interval = self.config.sample_interval;
        let report_interval = self.config.report_interval;

        tokio::spawn(async move {
            let mut sample_tick = tokio::time::interval(sample_interval);
            sample_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut report_tick = tokio::time::interval(report_interval);
            report_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sample_tick.tick() => coordinator.record_speed_samples().await,
                    _ = report_tick.tick() => coordinator.arm_reports().await,
                }
            }
            tracing::debug!("Progress reporter stopped");
        });
    }

    async fn record_speed_samples(&self) {
        let active: Vec<_> = self.transfers.lock().await.keys().cloned().collect();
        if active.is_empty() {
            return;
        }

        let mut progresses = self.progresses.lock().await;
        for id in active {
            if let Some(progress) = progresses.get_mut(&id) {
                progress.record_sample(self.config.sample_interval);
            }
        }
    }

    async fn arm_reports(&self) {
        for transfer in self.transfers.lock().await.values_mut() {
            transfer.report_due = true;
        }
    }
}
