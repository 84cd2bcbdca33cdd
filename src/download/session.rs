//! Transfer session contract
//!
//! The session is the process-wide transport that actually moves bytes. The
//! [`DownloadCoordinator`](super::DownloadCoordinator) is its only caller: it
//! starts and cancels tasks and interprets the [`TransferEvent`]s the session
//! reports back on a channel.

use crate::error::Result;
use crate::types::ArchiveId;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Identifies one transfer task within a session
pub type TaskId = u64;

/// Request to fetch one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Archive being fetched
    pub id: ArchiveId,
    /// Task id chosen by the coordinator; every event for this task carries it
    pub task_id: TaskId,
    /// Remote URL
    pub url: String,
    /// Opaque resume data from an earlier interrupted task
    pub resume_data: Option<Vec<u8>>,
}

/// Something that happened to a transfer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Archive being fetched
    pub id: ArchiveId,
    /// Task that produced the event
    pub task_id: TaskId,
    /// What happened
    pub kind: TransferEventKind,
}

/// Per-task progress and terminal states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEventKind {
    /// Bytes were written
    Progress {
        /// Bytes written so far, including resumed bytes
        bytes_written: u64,
        /// Expected total (0 when unknown)
        total_bytes: u64,
    },
    /// The file is complete at `location`
    Finished {
        /// Temporary location of the finished file
        location: PathBuf,
        /// Name suggested by the server, if any
        suggested_filename: Option<String>,
    },
    /// The task stopped because it was cancelled
    Cancelled {
        /// Resume data, when requested and available
        resume_data: Option<Vec<u8>>,
        /// Bytes written before stopping
        bytes_written: u64,
    },
    /// The task stopped on a transport error
    Failed {
        /// Transport-reported message
        message: String,
        /// Whether trying again later may succeed
        retryable: bool,
        /// Resume data, when the transport could capture it
        resume_data: Option<Vec<u8>>,
        /// Bytes written before failing
        bytes_written: u64,
    },
}

/// A task the session carried over from a previous process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredTask {
    /// Archive being fetched
    pub id: ArchiveId,
    /// Task id from the previous process
    pub task_id: TaskId,
    /// Bytes written so far
    pub bytes_written: u64,
    /// Expected total (0 when unknown)
    pub total_bytes: u64,
}

/// Process-wide transport for archive transfers
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// Begin or resume a transfer
    ///
    /// Events for the task are sent on `events` until exactly one terminal
    /// event (`Finished`, `Cancelled` or `Failed`).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ResumeDataMissingOrCorrupt`](crate::DownloadError::ResumeDataMissingOrCorrupt)
    /// when `resume_data` cannot be interpreted, or another error when the
    /// task cannot be created at all. No event is sent in that case.
    async fn start(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Result<()>;

    /// Cancel a task
    ///
    /// Pause and cancel are signalled the same way; `produce_resume_data`
    /// asks the session to capture resume data in the `Cancelled` event.
    async fn cancel(&self, task_id: TaskId, produce_resume_data: bool);

    /// Tasks restored from a previous process, now reporting on `events`
    async fn restored_tasks(
        &self,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Vec<RestoredTask>;
}
