//! Directory stasis detection
//!
//! Copying a multi-gigabyte archive into the documents directory produces a
//! long stream of write events. Rescanning on each one would try to open a
//! half-written file, so [`DirectoryWatcher`] waits until the directory stops
//! changing and then emits a single [`Event::DirectoryChanged`].
//!
//! A raw event starts a checking cycle. The cycle fingerprints the directory
//! (sorted `name_size` entries) every `poll_interval`; after `stable_polls`
//! consecutive equal comparisons the directory is in stasis, and after a short
//! `cooldown` the notification goes out. A raw event arriving mid-cycle resets
//! the streak.

use crate::config::WatcherConfig;
use crate::types::Event;
use notify::event::ModifyKind;
use notify::{
    Config as NotifyConfig, Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lightweight directory fingerprint: sorted `name_size` entries
pub type Fingerprint = Vec<String>;

/// Result of comparing a fresh fingerprint with the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sample of a cycle, nothing to compare with yet
    Primed,
    /// The directory differs from the previous sample
    Changed,
    /// Equal to the previous sample, streak not long enough yet
    Stable,
    /// Equal for the required number of comparisons
    Stasis,
}

/// Counts consecutive equal fingerprints
#[derive(Debug, Clone)]
pub struct StasisDetector {
    required: u32,
    previous: Option<Fingerprint>,
    equal: u32,
}

impl StasisDetector {
    /// Detector declaring stasis after `required` equal comparisons
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            previous: None,
            equal: 0,
        }
    }

    /// Feed the next fingerprint
    ///
    /// On [`Observation::Stasis`] the detector resets itself for the next
    /// burst.
    pub fn observe(&mut self, current: Fingerprint) -> Observation {
        let Some(previous) = self.previous.replace(current) else {
            return Observation::Primed;
        };

        if self.previous.as_ref() != Some(&previous) {
            self.equal = 0;
            return Observation::Changed;
        }

        self.equal += 1;
        if self.equal >= self.required {
            self.previous = None;
            self.equal = 0;
            Observation::Stasis
        } else {
            Observation::Stable
        }
    }

    /// A raw event arrived: restart the streak
    pub fn interrupt(&mut self) {
        self.equal = 0;
    }
}

struct Running {
    // Dropping the watcher releases the OS watch
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches the documents directory and reports when it settles
pub struct DirectoryWatcher {
    dir: PathBuf,
    config: WatcherConfig,
    event_tx: broadcast::Sender<Event>,
    running: Mutex<Option<Running>>,
}

impl DirectoryWatcher {
    /// Create a watcher for `dir`; nothing is watched until [`start_monitoring`](Self::start_monitoring)
    pub fn new(dir: PathBuf, config: WatcherConfig, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            dir,
            config,
            event_tx,
            running: Mutex::new(None),
        }
    }

    /// Start listening for changes
    ///
    /// Idempotent. If the OS watch cannot be established the watcher logs a
    /// warning and stays inactive; explicit rescans still work.
    pub async fn start_monitoring(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                // The receiver is gone once monitoring stopped
                tx.send(res).ok();
            },
            NotifyConfig::default(),
        )
        .and_then(|mut watcher| {
            watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        let watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to watch documents directory, automatic rescans disabled"
                );
                return;
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_watch_loop(
            self.dir.clone(),
            self.config.clone(),
            self.event_tx.clone(),
            rx,
            cancel.clone(),
        ));

        info!(dir = %self.dir.display(), "Watching documents directory");
        *running = Some(Running {
            _watcher: watcher,
            cancel,
            task,
        });
    }

    /// Stop listening and release the OS watch
    pub async fn stop_monitoring(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!(error = %e, "Directory watch task panicked");
        }
        info!(dir = %self.dir.display(), "Stopped watching documents directory");
    }

    /// Whether an OS watch is active
    pub async fn is_monitoring(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

/// Whether a raw event can change the directory fingerprint
fn is_relevant(event: &notify::Result<NotifyEvent>) -> bool {
    match event {
        Ok(event) => match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => true,
            EventKind::Modify(ModifyKind::Metadata(_)) => false,
            EventKind::Modify(_) => true,
            EventKind::Access(_) | EventKind::Other => false,
        },
        Err(e) => {
            warn!(error = %e, "Filesystem watcher error");
            false
        }
    }
}

async fn run_watch_loop(
    dir: PathBuf,
    config: WatcherConfig,
    event_tx: broadcast::Sender<Event>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<NotifyEvent>>,
    cancel: CancellationToken,
) {
    let mut detector = StasisDetector::new(config.stable_polls);

    loop {
        // Idle until something happens
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = rx.recv() => match event {
                Some(event) if is_relevant(&event) => {}
                Some(_) => continue,
                None => return,
            },
        }

        detector.interrupt();
        debug!(dir = %dir.display(), "Directory activity, checking for stasis");

        loop {
            while let Ok(event) = rx.try_recv() {
                if is_relevant(&event) {
                    detector.interrupt();
                }
            }

            match detector.observe(fingerprint(&dir).await) {
                Observation::Primed => continue,
                Observation::Stasis => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(config.cooldown) => {}
                    }
                    debug!(dir = %dir.display(), "Directory settled");
                    event_tx.send(Event::DirectoryChanged).ok();
                    break;
                }
                Observation::Changed | Observation::Stable => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(config.poll_interval) => {}
                    }
                }
            }
        }
    }
}

/// Sorted `name_size` entries of `dir`; empty when the directory is unreadable
pub async fn fingerprint(dir: &Path) -> Fingerprint {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Cannot read directory for fingerprint");
            return Vec::new();
        }
    };

    let mut fingerprint = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let size = match entry.metadata().await {
            Ok(metadata) => metadata.len(),
            // Removed between listing and stat
            Err(_) => continue,
        };
        fingerprint.push(format!("{}_{}", entry.file_name().to_string_lossy(), size));
    }
    fingerprint.sort();
    fingerprint
}
