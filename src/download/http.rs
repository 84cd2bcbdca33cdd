//! HTTP transfer session backed by `reqwest`.
//!
//! Each task streams the response body into a `.part` file. Resume data is a
//! small JSON token naming the url, the partial file and the byte offset; a
//! resumed task asks for the remaining bytes with a `Range` header. HTTP tasks
//! live only as long as the process, so nothing is carried over on relaunch.

use crate::error::{DownloadError, Error, Result};
use crate::retry::IsRetryable;
use crate::types::ArchiveId;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::session::{
    RestoredTask, TaskId, TransferEvent, TransferEventKind, TransferRequest, TransferSession,
};

/// Timeout for establishing a connection; the body may take as long as it needs
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialized resume data of an interrupted HTTP task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ResumeToken {
    url: String,
    partial_path: PathBuf,
    offset: u64,
}

impl ResumeToken {
    fn encode(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(self).ok()
    }
}

struct TaskControl {
    cancel: CancellationToken,
    produce_resume_data: Arc<AtomicBool>,
}

/// [`TransferSession`] that fetches archives over HTTP(S)
pub struct HttpTransferSession {
    client: reqwest::Client,
    partial_dir: PathBuf,
    tasks: Arc<std::sync::Mutex<HashMap<TaskId, TaskControl>>>,
}

impl HttpTransferSession {
    /// Create a session writing partial files into `partial_dir`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(partial_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("zimkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            partial_dir: partial_dir.into(),
            tasks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        })
    }

    /// Number of running tasks
    pub fn active_tasks(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn partial_path(&self, id: &ArchiveId) -> PathBuf {
        self.partial_dir
            .join(format!("{}.part", id.as_str().replace(['/', '\\'], "_")))
    }

    /// Decode and check resume data against the partial file it names
    async fn parse_resume_data(id: &ArchiveId, data: &[u8]) -> Result<ResumeToken> {
        let corrupt = |reason: String| {
            Error::Download(DownloadError::ResumeDataMissingOrCorrupt {
                id: id.clone(),
                reason,
            })
        };

        let token: ResumeToken = serde_json::from_slice(data)
            .map_err(|e| corrupt(format!("unreadable resume token: {}", e)))?;
        let length = tokio::fs::metadata(&token.partial_path)
            .await
            .map_err(|e| corrupt(format!("partial file unavailable: {}", e)))?
            .len();
        if length < token.offset {
            return Err(corrupt(format!(
                "partial file holds {} bytes, resume token expects {}",
                length, token.offset
            )));
        }
        Ok(token)
    }
}

#[async_trait]
impl TransferSession for HttpTransferSession {
    async fn start(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Result<()> {
        let (partial_path, offset) = match &request.resume_data {
            Some(data) => {
                let token = Self::parse_resume_data(&request.id, data).await?;
                (token.partial_path, token.offset)
            }
            None => (self.partial_path(&request.id), 0),
        };
        if let Some(parent) = partial_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if offset == 0 {
            // Resume data produced before the first byte must still find its file
            tokio::fs::File::create(&partial_path).await?;
        }

        let control = TaskControl {
            cancel: CancellationToken::new(),
            produce_resume_data: Arc::new(AtomicBool::new(false)),
        };
        let task = HttpTask {
            client: self.client.clone(),
            id: request.id,
            task_id: request.task_id,
            url: request.url,
            partial_path,
            offset,
            cancel: control.cancel.clone(),
            produce_resume_data: control.produce_resume_data.clone(),
            events,
        };
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.task_id, control);

        tracing::debug!(
            archive_id = %task.id,
            task_id = task.task_id,
            offset,
            "Starting HTTP transfer"
        );

        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let task_id = task.task_id;
            let kind = task.run().await;
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_id);
            task.send(kind);
        });
        Ok(())
    }

    async fn cancel(&self, task_id: TaskId, produce_resume_data: bool) {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(control) = tasks.get(&task_id) {
            control
                .produce_resume_data
                .store(produce_resume_data, Ordering::SeqCst);
            control.cancel.cancel();
        }
    }

    async fn restored_tasks(
        &self,
        _events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Vec<RestoredTask> {
        Vec::new()
    }
}

/// One running HTTP transfer
struct HttpTask {
    client: reqwest::Client,
    id: ArchiveId,
    task_id: TaskId,
    url: String,
    partial_path: PathBuf,
    offset: u64,
    cancel: CancellationToken,
    produce_resume_data: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl HttpTask {
    fn send(&self, kind: TransferEventKind) {
        self.events
            .send(TransferEvent {
                id: self.id.clone(),
                task_id: self.task_id,
                kind,
            })
            .ok();
    }

    fn resume_token(&self, offset: u64) -> Option<Vec<u8>> {
        ResumeToken {
            url: self.url.clone(),
            partial_path: self.partial_path.clone(),
            offset,
        }
        .encode()
    }

    /// Outcome of a cancelled task; the partial file goes unless it can be resumed
    async fn cancelled(&self, bytes_written: u64) -> TransferEventKind {
        let resume_data = if self.produce_resume_data.load(Ordering::SeqCst) {
            self.resume_token(bytes_written)
        } else {
            None
        };
        if resume_data.is_none() {
            tokio::fs::remove_file(&self.partial_path).await.ok();
        }
        TransferEventKind::Cancelled {
            resume_data,
            bytes_written,
        }
    }

    fn failed(&self, message: String, retryable: bool, bytes_written: u64) -> TransferEventKind {
        TransferEventKind::Failed {
            message,
            retryable,
            resume_data: self.resume_token(bytes_written),
            bytes_written,
        }
    }

    async fn run(&self) -> TransferEventKind {
        let mut request = self.client.get(&self.url);
        if self.offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", self.offset));
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return self.cancelled(self.offset).await,
            response = request.send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let message = format!("request to {} failed: {}", self.url, e);
                let retryable = Error::Network(e).is_retryable();
                return self.failed(message, retryable, self.offset);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::REQUEST_TIMEOUT;
            return self.failed(format!("HTTP error: {}", status), retryable, self.offset);
        }

        // A server that ignores the range sends the whole file again
        let offset = if status == reqwest::StatusCode::PARTIAL_CONTENT {
            self.offset
        } else {
            0
        };
        let mut file = match open_partial(&self.partial_path, offset).await {
            Ok(file) => file,
            Err(e) => return self.failed(format!("cannot write partial file: {}", e), false, 0),
        };

        let total_bytes = response
            .content_length()
            .map(|length| length + offset)
            .unwrap_or(0);
        let suggested_filename = crate::utils::suggested_filename(&response, &self.url);
        let mut written = offset;
        self.send(TransferEventKind::Progress {
            bytes_written: written,
            total_bytes,
        });

        let mut stream = response.bytes_stream();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    file.flush().await.ok();
                    return self.cancelled(written).await;
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        if let Err(e) = file.write_all(&bytes).await {
                            return self.failed(
                                format!("cannot write partial file: {}", e),
                                false,
                                written,
                            );
                        }
                        written += bytes.len() as u64;
                        self.send(TransferEventKind::Progress {
                            bytes_written: written,
                            total_bytes,
                        });
                    }
                    Some(Err(e)) => {
                        file.flush().await.ok();
                        let message = format!("transfer interrupted: {}", e);
                        return self.failed(message, true, written);
                    }
                    None => break,
                },
            }
        }

        if let Err(e) = file.flush().await {
            return self.failed(format!("cannot write partial file: {}", e), false, written);
        }
        drop(file);

        tracing::debug!(archive_id = %self.id, bytes = written, "HTTP transfer finished");
        TransferEventKind::Finished {
            location: self.partial_path.clone(),
            suggested_filename,
        }
    }
}

/// Open the partial file truncated to `offset` and positioned at its end
async fn open_partial(path: &Path, offset: u64) -> std::io::Result<tokio::fs::File> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(offset == 0)
        .open(path)
        .await?;
    if offset > 0 {
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(file)
}
