
use super::*;
use crate::db::NewCatalogEntry;
use crate::types::{ArchiveMetadata, LocalState};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::error::RecvError;

/// Session that records requests and lets tests drive task events
#[derive(Default)]
struct MockSession {
    requests: StdMutex<Vec<TransferRequest>>,
    /// Live tasks: task id -> (archive id, event sender, bytes written)
    tasks: StdMutex<HashMap<TaskId, (ArchiveId, mpsc::UnboundedSender<TransferEvent>, u64)>>,
    cancels: StdMutex<Vec<(TaskId, bool)>>,
    restored: StdMutex<Vec<RestoredTask>>,
    fail_start: AtomicBool,
}

impl MockSession {
    fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn last_task(&self, id: &ArchiveId) -> TaskId {
        self.requests()
            .iter()
            .rev()
            .find(|request| &request.id == id)
            .map(|request| request.task_id)
            .expect("no request for archive")
    }

    fn push(&self, task_id: TaskId, kind: TransferEventKind) {
        let mut tasks = self.tasks.lock().unwrap();
        let (id, tx, bytes) = tasks.get_mut(&task_id).expect("unknown task");
        if let TransferEventKind::Progress { bytes_written, .. } = &kind {
            *bytes = *bytes_written;
        }
        tx.send(TransferEvent {
            id: id.clone(),
            task_id,
            kind,
        })
        .unwrap();
    }

    fn progress(&self, task_id: TaskId, bytes_written: u64) {
        self.push(
            task_id,
            TransferEventKind::Progress {
                bytes_written,
                total_bytes: 4096,
            },
        );
    }
}

#[async_trait]
impl TransferSession for MockSession {
    async fn start(
        &self,
        request: TransferRequest,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Other("session unavailable".to_string()));
        }
        if let Some(data) = &request.resume_data
            && !data.starts_with(b"resume-")
        {
            return Err(Error::Download(DownloadError::ResumeDataMissingOrCorrupt {
                id: request.id.clone(),
                reason: "unknown token".to_string(),
            }));
        }
        self.tasks
            .lock()
            .unwrap()
            .insert(request.task_id, (request.id.clone(), events, 0));
        self.requests.lock().unwrap().push(request);
        Ok(())
    }

    async fn cancel(&self, task_id: TaskId, produce_resume_data: bool) {
        self.cancels.lock().unwrap().push((task_id, produce_resume_data));
        if let Some((id, tx, bytes)) = self.tasks.lock().unwrap().remove(&task_id) {
            let resume_data = produce_resume_data.then(|| format!("resume-{}", bytes).into_bytes());
            tx.send(TransferEvent {
                id,
                task_id,
                kind: TransferEventKind::Cancelled {
                    resume_data,
                    bytes_written: bytes,
                },
            })
            .ok();
        }
    }

    async fn restored_tasks(
        &self,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Vec<RestoredTask> {
        let restored = self.restored.lock().unwrap().clone();
        let mut tasks = self.tasks.lock().unwrap();
        for task in &restored {
            tasks.insert(
                task.task_id,
                (task.id.clone(), events.clone(), task.bytes_written),
            );
        }
        restored
    }
}

struct Fixture {
    _temp_dir: TempDir,
    documents: PathBuf,
    cache: PathBuf,
    db: Arc<Database>,
    session: Arc<MockSession>,
    coordinator: DownloadCoordinator,
    events: broadcast::Receiver<Event>,
}

impl Fixture {
    fn resume_file(&self, id: &ArchiveId) -> PathBuf {
        resume_data::resume_data_path(&self.coordinator.resume_data_dir(), id)
    }

    async fn status(&self, id: &ArchiveId) -> Option<DownloadStatus> {
        self.coordinator.status(id).await.unwrap()
    }

    async fn local_state(&self, id: &ArchiveId) -> LocalState {
        self.db
            .get_catalog_entry(id)
            .await
            .unwrap()
            .unwrap()
            .local_state()
    }

    /// Wait for the first event matching `predicate`, skipping others
    async fn expect_event(&mut self, predicate: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Start `id` and feed it its first bytes
    async fn start_downloading(&mut self, id: &ArchiveId, bytes: u64) -> TaskId {
        self.coordinator.start(id).await.unwrap();
        let task = self.session.last_task(id);
        self.session.progress(task, bytes);
        self.expect_event(|e| matches!(e, Event::DownloadStarted { .. }))
            .await;
        task
    }
}

fn entry(id: &str, file_size: u64, url: Option<&str>) -> NewCatalogEntry {
    NewCatalogEntry {
        id: ArchiveId::from(id),
        metadata: ArchiveMetadata {
            title: id.to_string(),
            file_size,
            ..Default::default()
        },
        url: url.map(str::to_string),
        local_state: LocalState::Remote,
        include_in_search: true,
        has_index: false,
        has_pictures: true,
    }
}

async fn fixture() -> Fixture {
    fixture_with(DownloadConfig {
        sample_interval: Duration::from_millis(20),
        report_interval: Duration::from_millis(20),
        ..Default::default()
    })
    .await
}

async fn fixture_with(config: DownloadConfig) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let documents = temp_dir.path().join("documents");
    let cache = temp_dir.path().join("cache");
    std::fs::create_dir_all(&documents).unwrap();
    std::fs::create_dir_all(&cache).unwrap();

    let db = Arc::new(Database::new(&temp_dir.path().join("zimkit.db")).await.unwrap());
    for (id, size) in [("ray", 4096), ("soul", 4096)] {
        db.insert_catalog_entry(&entry(
            id,
            size,
            Some(&format!("https://download.example.org/{id}.zim")),
        ))
        .await
        .unwrap();
    }

    let library = LibraryConfig {
        documents_dir: documents.clone(),
        cache_dir: cache.clone(),
        ..Default::default()
    };
    let (event_tx, events) = broadcast::channel(1000);
    let session = Arc::new(MockSession::default());
    let coordinator =
        DownloadCoordinator::new(config, library, db.clone(), session.clone(), event_tx);

    Fixture {
        _temp_dir: temp_dir,
        documents,
        cache,
        db,
        session,
        coordinator,
        events,
    }
}

fn ray() -> ArchiveId {
    ArchiveId::from("ray")
}

fn write_partial(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn start_creates_queued_state() {
    let mut f = fixture().await;

    f.coordinator.start(&ray()).await.unwrap();

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Queued));
    assert_eq!(f.local_state(&ray()).await, LocalState::Transferring);
    assert!(f.coordinator.is_active(&ray()).await);

    let requests = f.session.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://download.example.org/ray.zim");
    assert!(requests[0].resume_data.is_none());

    f.expect_event(|e| matches!(e, Event::DownloadQueued { id } if id == &ray()))
        .await;
}

#[tokio::test]
async fn first_bytes_move_to_downloading_and_report_progress() {
    let mut f = fixture().await;
    f.coordinator.start(&ray()).await.unwrap();
    let task = f.session.last_task(&ray());

    f.session.progress(task, 100);
    f.expect_event(|e| matches!(e, Event::DownloadStarted { .. }))
        .await;
    let report = f
        .expect_event(|e| matches!(e, Event::DownloadProgress { .. }))
        .await;

    match report {
        Event::DownloadProgress {
            completed_bytes,
            total_bytes,
            ..
        } => {
            assert_eq!(completed_bytes, 100);
            assert_eq!(total_bytes, 4096);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Downloading));
    assert_eq!(f.coordinator.progress(&ray()).await.unwrap().completed_bytes, 100);
}

impl Fixture {
    /// Wait until every queued progress event for `id` has been applied
    async fn settle_progress(&self, id: &ArchiveId, bytes: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self
                .coordinator
                .progress(id)
                .await
                .is_none_or(|progress| progress.completed_bytes != bytes)
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("progress never applied");
        // The report, if any, is emitted right after the update
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn drain_progress_reports(&mut self) -> Vec<u64> {
        let mut reports = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let Event::DownloadProgress {
                completed_bytes, ..
            } = event
            {
                reports.push(completed_bytes);
            }
        }
        reports
    }
}

#[tokio::test]
async fn progress_reports_are_throttled_to_the_report_interval() {
    let report_interval = Duration::from_secs(2);
    let reporter_started = tokio::time::Instant::now();
    let mut f = fixture_with(DownloadConfig {
        sample_interval: Duration::from_millis(20),
        report_interval,
        ..Default::default()
    })
    .await;
    // Let the reporter take its immediate first tick
    tokio::time::sleep(Duration::from_millis(50)).await;

    let task = f.start_downloading(&ray(), 100).await;
    f.expect_event(|e| matches!(e, Event::DownloadProgress { completed_bytes: 100, .. }))
        .await;

    for bytes in (200..=2000).step_by(100) {
        f.session.progress(task, bytes);
    }
    f.settle_progress(&ray(), 2000).await;
    assert!(reporter_started.elapsed() < report_interval);
    assert!(f.drain_progress_reports().is_empty());

    // The next tick only arms a report; the next event delivers it
    tokio::time::sleep_until(reporter_started + report_interval + Duration::from_millis(100))
        .await;
    assert!(f.drain_progress_reports().is_empty());

    f.session.progress(task, 3000);
    f.session.progress(task, 3100);
    f.settle_progress(&ray(), 3100).await;
    assert_eq!(f.drain_progress_reports(), vec![3000]);
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let f = fixture().await;
    f.coordinator.start(&ray()).await.unwrap();

    let err = f.coordinator.start(&ray()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidState { .. })
    ));
    assert_eq!(f.session.requests().len(), 1);
}

#[tokio::test]
async fn start_without_url_fails() {
    let f = fixture().await;
    f.db.insert_catalog_entry(&entry("local-only", 10, None))
        .await
        .unwrap();

    let err = f
        .coordinator
        .start(&ArchiveId::from("local-only"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::NoRemoteUrl { .. })
    ));
    assert!(f.session.requests().is_empty());
}

#[tokio::test]
async fn start_unknown_entry_fails() {
    let f = fixture().await;
    let err = f
        .coordinator
        .start(&ArchiveId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Download(DownloadError::NotFound { .. })));
}

#[tokio::test]
async fn start_refuses_archive_that_cannot_fit() {
    let f = fixture().await;
    let huge = ArchiveId::from("huge");
    f.db.insert_catalog_entry(&entry(
        "huge",
        i64::MAX as u64 / 2,
        Some("https://download.example.org/huge.zim"),
    ))
    .await
    .unwrap();

    assert_eq!(
        f.coordinator.space_state(&huge).await.unwrap(),
        SpaceState::NotEnough
    );
    let err = f.coordinator.start(&huge).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientSpace { .. }));
    assert_eq!(f.status(&huge).await, None);
    assert_eq!(f.local_state(&huge).await, LocalState::Remote);
    assert_eq!(
        f.coordinator.space_state(&ray()).await.unwrap(),
        SpaceState::Enough
    );
}

#[tokio::test]
async fn session_failure_on_start_leaves_nothing_behind() {
    let f = fixture().await;
    f.session.fail_start.store(true, Ordering::SeqCst);

    assert!(f.coordinator.start(&ray()).await.is_err());

    assert_eq!(f.status(&ray()).await, None);
    assert_eq!(f.local_state(&ray()).await, LocalState::Remote);
    assert!(!f.coordinator.is_active(&ray()).await);
    assert!(f.coordinator.progress(&ray()).await.is_none());
}

#[tokio::test]
async fn pause_saves_resume_data() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 1000).await;

    f.coordinator.pause(&ray()).await.unwrap();

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    assert_eq!(f.session.cancels.lock().unwrap().clone(), vec![(task, true)]);
    let saved = std::fs::read(f.resume_file(&ray())).unwrap();
    assert_eq!(saved, b"resume-1000");

    let state = f.db.get_download_state(&ray()).await.unwrap().unwrap();
    assert_eq!(state.total_bytes_written, 1000);
    assert!(!f.coordinator.is_active(&ray()).await);

    f.expect_event(|e| matches!(e, Event::DownloadPaused { resumable: true, .. }))
        .await;

    let description = f.coordinator.description(&ray()).await.unwrap().unwrap();
    assert!(description.ends_with("Paused"), "{}", description);
}

#[tokio::test]
async fn pause_is_idempotent() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 10).await;

    f.coordinator.pause(&ray()).await.unwrap();
    f.coordinator.pause(&ray()).await.unwrap();

    assert_eq!(f.session.cancels.lock().unwrap().len(), 1);
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
}

#[tokio::test]
async fn pause_unknown_transfer_fails() {
    let f = fixture().await;
    let err = f.coordinator.pause(&ray()).await.unwrap_err();
    assert!(matches!(err, Error::Download(DownloadError::NotFound { .. })));
}

#[tokio::test]
async fn resume_relaunches_from_saved_data() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 1000).await;
    f.coordinator.pause(&ray()).await.unwrap();

    f.coordinator.resume(&ray()).await.unwrap();

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Queued));
    let requests = f.session.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].resume_data.as_deref(), Some(&b"resume-1000"[..]));
    assert!(!f.resume_file(&ray()).exists());

    let task = f.session.last_task(&ray());
    f.session.progress(task, 1500);
    f.expect_event(|e| matches!(e, Event::DownloadStarted { .. }))
        .await;
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Downloading));
}

#[tokio::test]
async fn resume_without_resume_data_fails_and_stays_paused() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 1000).await;
    f.coordinator.pause(&ray()).await.unwrap();
    std::fs::remove_file(f.resume_file(&ray())).unwrap();

    let err = f.coordinator.resume(&ray()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::ResumeDataMissingOrCorrupt { .. })
    ));
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    assert_eq!(f.session.requests().len(), 1, "no silent restart");
}

#[tokio::test]
async fn resume_with_rejected_data_stays_paused() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 1000).await;
    f.coordinator.pause(&ray()).await.unwrap();
    std::fs::write(f.resume_file(&ray()), b"garbage").unwrap();

    let err = f.coordinator.resume(&ray()).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::ResumeDataMissingOrCorrupt { .. })
    ));
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    assert!(!f.coordinator.is_active(&ray()).await);
}

#[tokio::test]
async fn cancel_discards_state_and_resume_data() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 1000).await;

    f.coordinator.cancel(&ray()).await.unwrap();

    assert_eq!(f.session.cancels.lock().unwrap().clone(), vec![(task, false)]);
    assert_eq!(f.status(&ray()).await, None);
    assert!(!f.resume_file(&ray()).exists());
    assert_eq!(f.local_state(&ray()).await, LocalState::Remote);
    assert!(f.coordinator.progress(&ray()).await.is_none());
    f.expect_event(|e| matches!(e, Event::DownloadCancelled { .. }))
        .await;
}

#[tokio::test]
async fn cancel_paused_transfer_removes_resume_data() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 1000).await;
    f.coordinator.pause(&ray()).await.unwrap();
    assert!(f.resume_file(&ray()).exists());

    f.coordinator.cancel(&ray()).await.unwrap();

    assert_eq!(f.status(&ray()).await, None);
    assert!(!f.resume_file(&ray()).exists());
    assert_eq!(f.session.cancels.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_unknown_transfer_fails() {
    let f = fixture().await;
    let err = f.coordinator.cancel(&ray()).await.unwrap_err();
    assert!(matches!(err, Error::Download(DownloadError::NotFound { .. })));
}

#[tokio::test]
async fn completion_moves_file_and_deletes_state() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 4096).await;
    std::fs::write(f.documents.join("ray_charles.zim"), b"old").unwrap();
    let partial = write_partial(&f.cache, "ray.part", b"new archive bytes");

    f.session.push(
        task,
        TransferEventKind::Finished {
            location: partial.clone(),
            suggested_filename: Some("ray_charles.zim".to_string()),
        },
    );
    let event = f
        .expect_event(|e| matches!(e, Event::DownloadComplete { .. }))
        .await;

    let installed = f.documents.join("ray_charles.zim");
    match event {
        Event::DownloadComplete { path, .. } => assert_eq!(path, installed),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(std::fs::read(&installed).unwrap(), b"new archive bytes");
    assert!(!partial.exists());
    assert_eq!(f.status(&ray()).await, None);
    assert!(!f.coordinator.is_active(&ray()).await);
    // The registry owns the catalog state of installed archives
    assert_eq!(f.local_state(&ray()).await, LocalState::Transferring);
}

#[tokio::test]
async fn completion_without_suggested_name_uses_archive_id() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 4096).await;
    let partial = write_partial(&f.cache, "ray.part", b"bytes");

    f.session.push(
        task,
        TransferEventKind::Finished {
            location: partial,
            suggested_filename: None,
        },
    );
    f.expect_event(|e| matches!(e, Event::DownloadComplete { .. }))
        .await;

    assert!(f.documents.join("ray.zim").exists());
}

#[tokio::test]
async fn failed_move_marks_transfer_errored() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 4096).await;

    f.session.push(
        task,
        TransferEventKind::Finished {
            location: f.cache.join("missing.part"),
            suggested_filename: None,
        },
    );
    f.expect_event(|e| matches!(e, Event::DownloadFailed { retryable: false, .. }))
        .await;

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Errored));
    assert!(matches!(
        f.coordinator.resume(&ray()).await.unwrap_err(),
        Error::Download(DownloadError::InvalidState { .. })
    ));
    assert!(matches!(
        f.coordinator.pause(&ray()).await.unwrap_err(),
        Error::Download(DownloadError::InvalidState { .. })
    ));

    // An errored transfer can still be discarded
    f.coordinator.cancel(&ray()).await.unwrap();
    assert_eq!(f.status(&ray()).await, None);
}

#[tokio::test]
async fn transport_failure_pauses_with_resume_data() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 500).await;

    f.session.push(
        task,
        TransferEventKind::Failed {
            message: "connection reset".to_string(),
            retryable: true,
            resume_data: Some(b"resume-500".to_vec()),
            bytes_written: 500,
        },
    );
    let event = f
        .expect_event(|e| matches!(e, Event::DownloadFailed { .. }))
        .await;

    match event {
        Event::DownloadFailed {
            error, retryable, ..
        } => {
            assert!(retryable);
            assert!(error.contains("connection reset"), "{}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    assert_eq!(std::fs::read(f.resume_file(&ray())).unwrap(), b"resume-500");

    f.coordinator.resume(&ray()).await.unwrap();
    assert_eq!(
        f.session.requests()[1].resume_data.as_deref(),
        Some(&b"resume-500"[..])
    );
}

#[tokio::test]
async fn transport_failure_without_resume_data_resets_progress() {
    let mut f = fixture().await;
    let task = f.start_downloading(&ray(), 500).await;

    f.session.push(
        task,
        TransferEventKind::Failed {
            message: "connection reset".to_string(),
            retryable: true,
            resume_data: None,
            bytes_written: 500,
        },
    );
    f.expect_event(|e| matches!(e, Event::DownloadFailed { .. }))
        .await;

    let state = f.db.get_download_state(&ray()).await.unwrap().unwrap();
    assert_eq!(state.status(), DownloadStatus::Paused);
    assert_eq!(state.total_bytes_written, 0);
    assert_eq!(f.coordinator.progress(&ray()).await.unwrap().completed_bytes, 0);
    assert!(!f.resume_file(&ray()).exists());
}

#[tokio::test]
async fn events_of_replaced_tasks_are_ignored() {
    let mut f = fixture().await;
    let old_task = f.start_downloading(&ray(), 1000).await;
    f.coordinator.pause(&ray()).await.unwrap();
    f.coordinator.resume(&ray()).await.unwrap();
    let new_task = f.session.last_task(&ray());
    assert_ne!(old_task, new_task);

    // The old task is gone from the session; inject its late event directly
    f.coordinator
        .transfer_tx
        .send(TransferEvent {
            id: ray(),
            task_id: old_task,
            kind: TransferEventKind::Finished {
                location: f.cache.join("missing.part"),
                suggested_filename: None,
            },
        })
        .unwrap();
    f.session.progress(new_task, 1200);
    f.expect_event(|e| matches!(e, Event::DownloadStarted { .. }))
        .await;

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Downloading));
}

#[tokio::test]
async fn restore_marks_interrupted_transfers_paused() {
    let f = fixture().await;
    let soul = ArchiveId::from("soul");
    f.db.insert_download_state(&ray(), DownloadStatus::Downloading)
        .await
        .unwrap();
    f.db.update_bytes_written(&ray(), 2048).await.unwrap();
    resume_data::save(&f.coordinator.resume_data_dir(), &ray(), b"resume-2048")
        .await
        .unwrap();
    f.db.insert_download_state(&soul, DownloadStatus::Queued)
        .await
        .unwrap();
    f.db.update_bytes_written(&soul, 100).await.unwrap();

    assert_eq!(f.coordinator.restore_progresses().await.unwrap(), 2);

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    let progress = f.coordinator.progress(&ray()).await.unwrap();
    assert_eq!(progress.completed_bytes, 2048);
    assert_eq!(progress.total_bytes, 4096);

    // Without resume data the transfer starts over
    assert_eq!(f.status(&soul).await, Some(DownloadStatus::Paused));
    assert_eq!(f.coordinator.progress(&soul).await.unwrap().completed_bytes, 0);

    f.coordinator.resume(&ray()).await.unwrap();
    assert_eq!(
        f.session.requests()[0].resume_data.as_deref(),
        Some(&b"resume-2048"[..])
    );
}

#[tokio::test]
async fn restore_reattaches_carried_over_tasks() {
    let mut f = fixture().await;
    f.db.insert_download_state(&ray(), DownloadStatus::Downloading)
        .await
        .unwrap();
    f.session.restored.lock().unwrap().extend([
        RestoredTask {
            id: ray(),
            task_id: 41,
            bytes_written: 3000,
            total_bytes: 4096,
        },
        RestoredTask {
            id: ArchiveId::from("orphan"),
            task_id: 42,
            bytes_written: 10,
            total_bytes: 0,
        },
    ]);

    f.coordinator.restore_progresses().await.unwrap();

    assert!(f.coordinator.is_active(&ray()).await);
    assert_eq!(
        f.coordinator.progress(&ray()).await.unwrap().completed_bytes,
        3000
    );
    assert_eq!(f.session.cancels.lock().unwrap().clone(), vec![(42, false)]);

    f.session.progress(41, 3500);
    let report = f
        .expect_event(|e| matches!(e, Event::DownloadProgress { .. }))
        .await;
    assert!(matches!(
        report,
        Event::DownloadProgress {
            completed_bytes: 3500,
            ..
        }
    ));

    // New tasks never reuse a carried-over id
    f.coordinator.start(&ArchiveId::from("soul")).await.unwrap();
    assert!(f.session.last_task(&ArchiveId::from("soul")) > 42);
}

#[tokio::test]
async fn shutdown_pauses_transfers_and_refuses_new_ones() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 700).await;

    f.coordinator.shutdown().await;

    assert_eq!(f.status(&ray()).await, Some(DownloadStatus::Paused));
    assert!(f.resume_file(&ray()).exists());
    assert!(matches!(
        f.coordinator.start(&ArchiveId::from("soul")).await.unwrap_err(),
        Error::ShuttingDown
    ));
}

#[tokio::test]
async fn list_downloads_describes_each_transfer() {
    let mut f = fixture().await;
    f.start_downloading(&ray(), 2048).await;
    f.coordinator.start(&ArchiveId::from("soul")).await.unwrap();

    let downloads = f.coordinator.list_downloads().await.unwrap();

    assert_eq!(downloads.len(), 2);
    let ray_summary = downloads.iter().find(|d| d.id == ray()).unwrap();
    assert_eq!(ray_summary.status, DownloadStatus::Downloading);
    assert_eq!(ray_summary.completed_bytes, 2048);
    assert_eq!(ray_summary.total_bytes, 4096);
    let soul_summary = downloads
        .iter()
        .find(|d| d.id == ArchiveId::from("soul"))
        .unwrap();
    assert_eq!(soul_summary.status, DownloadStatus::Queued);
    assert!(soul_summary.description.ends_with("Queued"));
}
