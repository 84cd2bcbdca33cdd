//! Open archive registry
//!
//! [`ArchiveRegistry`] owns the map of open [`ArchiveHandle`]s and keeps it,
//! and the persisted catalog, consistent with the documents directory.
//!
//! The registry is the single writer of the handle map. Other components read
//! it after waiting for [`ArchiveRegistry::wait_for_idle`], which resolves as
//! soon as no rescan is mutating the map. Every completed rescan bumps the
//! published generation.
//!
//! Methods are organized by domain:
//! - [`scan`] - Directory classification and snapshot diffing
//! - [`reconcile`] - Catalog reconciliation after a rescan
//! - [`lookups`] - Reader-side content and URL lookups

mod lookups;
mod reconcile;
mod scan;

use crate::config::LibraryConfig;
use crate::db::Database;
use crate::engine::{ArchiveEngine, ArchiveHandle};
use crate::error::{Error, Result};
use crate::types::{ArchiveId, Event};
use scan::{OpenedFile, ScanSnapshot};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, error, info, warn};

/// Published registry state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryState {
    /// Number of completed rescans
    pub generation: u64,
    /// Whether a rescan is mutating the handle map
    pub scanning: bool,
}

/// Outcome of one rescan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Generation published by this rescan
    pub generation: u64,
    /// Archives that became available
    pub added: Vec<ArchiveId>,
    /// Archives that went away
    pub removed: Vec<ArchiveId>,
    /// Files the engine could not open
    pub failed: Vec<PathBuf>,
    /// Set when the registry went from empty to exactly one archive
    pub first_archive: Option<ArchiveId>,
    /// Whether every archive was reopened because the index folders changed
    pub reopened_all: bool,
}

/// Open archives keyed by id (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ArchiveRegistry {
    pub(crate) config: Arc<LibraryConfig>,
    pub(crate) engine: Arc<dyn ArchiveEngine>,
    pub(crate) db: Arc<Database>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Handle map, replaced under one write lock per rescan
    pub(crate) handles: Arc<RwLock<HashMap<ArchiveId, Arc<dyn ArchiveHandle>>>>,
    /// Held for the whole rescan, which makes rescans mutually exclusive
    pub(crate) snapshot: Arc<Mutex<ScanSnapshot>>,
    pub(crate) state_tx: Arc<watch::Sender<RegistryState>>,
    /// Set while a requested rescan is waiting to run
    pub(crate) rescan_pending: Arc<AtomicBool>,
}

impl ArchiveRegistry {
    /// Create an empty registry; call [`rescan`](Self::rescan) to populate it
    pub fn new(
        config: LibraryConfig,
        engine: Arc<dyn ArchiveEngine>,
        db: Arc<Database>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RegistryState::default());
        Self {
            config: Arc::new(config),
            engine,
            db,
            event_tx,
            handles: Arc::new(RwLock::new(HashMap::new())),
            snapshot: Arc::new(Mutex::new(ScanSnapshot::default())),
            state_tx: Arc::new(state_tx),
            rescan_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current published state
    pub fn state(&self) -> RegistryState {
        *self.state_tx.borrow()
    }

    /// Receiver for state changes
    pub fn subscribe_state(&self) -> watch::Receiver<RegistryState> {
        self.state_tx.subscribe()
    }

    /// Wait until no rescan is running and return the published state
    pub async fn wait_for_idle(&self) -> RegistryState {
        let mut rx = self.state_tx.subscribe();
        match rx.wait_for(|state| !state.scanning).await {
            Ok(state) => *state,
            // The sender lives as long as self
            Err(_) => *self.state_tx.borrow(),
        }
    }

    /// Open handle for `id`
    pub async fn handle(&self, id: &ArchiveId) -> Option<Arc<dyn ArchiveHandle>> {
        self.handles.read().await.get(id).cloned()
    }

    /// All open handles, ordered by id
    pub async fn handles(&self) -> Vec<Arc<dyn ArchiveHandle>> {
        let handles = self.handles.read().await;
        let mut handles: Vec<_> = handles.values().cloned().collect();
        handles.sort_by_key(|handle| handle.id());
        handles
    }

    /// Ids of all open archives, ordered
    pub async fn ids(&self) -> Vec<ArchiveId> {
        let mut ids: Vec<_> = self.handles.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of open archives
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Whether no archive is open
    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Schedule a rescan, coalescing with one that is already waiting
    ///
    /// Requests that arrive while a rescan is waiting to start are folded into
    /// it. A request arriving while a rescan runs schedules exactly one more.
    pub fn request_rescan(&self) {
        if self.rescan_pending.swap(true, Ordering::SeqCst) {
            debug!("Rescan already pending");
            return;
        }

        let registry = self.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.rescan().await {
                error!(error = %e, "Rescan failed");
            }
        });
    }

    /// Bring the handle map and the catalog in line with the documents directory
    ///
    /// Only one rescan runs at a time; a concurrent call waits for the running
    /// one and then scans again. Archives that fail to open are skipped and
    /// reported in [`RescanReport::failed`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the directory itself cannot be listed. The
    /// handle map is left untouched in that case.
    pub async fn rescan(&self) -> Result<RescanReport> {
        let mut snapshot = self.snapshot.lock().await;
        self.rescan_pending.store(false, Ordering::SeqCst);
        self.state_tx.send_modify(|state| state.scanning = true);

        let generation = self.state().generation + 1;
        let result = self.rescan_locked(&mut snapshot, generation).await;

        self.state_tx.send_modify(|state| {
            state.scanning = false;
            if result.is_ok() {
                state.generation = generation;
            }
        });
        drop(snapshot);

        let report = result?;
        self.emit_rescan_events(&report);
        Ok(report)
    }

    async fn rescan_locked(
        &self,
        snapshot: &mut ScanSnapshot,
        generation: u64,
    ) -> Result<RescanReport> {
        let listing = scan::list_directory(
            &self.config.documents_dir,
            &self.config.archive_extension,
            &self.config.index_extension,
        )
        .await?;
        let plan = snapshot.plan(&listing);

        debug!(
            to_open = plan.to_open.len(),
            to_close = plan.to_close.len(),
            reopen_all = plan.reopen_all,
            "Rescanning documents directory"
        );

        let mut report = RescanReport {
            generation,
            reopened_all: plan.reopen_all,
            ..Default::default()
        };

        // Held across the opens so an id never has two live handles
        let mut handles = self.handles.write().await;
        let before: BTreeSet<ArchiveId> = handles.keys().cloned().collect();

        if plan.reopen_all {
            for (_, handle) in handles.drain() {
                handle.close();
            }
            snapshot.archives.clear();
        } else {
            for path in &plan.to_close {
                if let Some(opened) = snapshot.archives.remove(path)
                    && let Some(handle) = handles.remove(&opened.id)
                {
                    handle.close();
                }
            }
        }

        let engine = self.engine.clone();
        let to_open = plan.to_open.clone();
        let opened = tokio::task::spawn_blocking(move || {
            to_open
                .into_iter()
                .map(|path| {
                    let result = engine.open(&path);
                    (path, result)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| Error::Other(format!("archive open task failed: {}", e)))?;

        for (path, result) in opened {
            match result {
                Ok(handle) => {
                    let id = handle.id();
                    if handles.contains_key(&id) {
                        debug!(
                            archive_id = %id,
                            path = %path.display(),
                            "Archive already open from another file"
                        );
                        handle.close();
                        continue;
                    }
                    let stamp = listing.archives.get(&path).copied().unwrap_or_default();
                    handles.insert(id.clone(), handle);
                    snapshot.archives.insert(path, OpenedFile { id, stamp });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping archive that failed to open");
                    report.failed.push(path);
                }
            }
        }

        snapshot.index_folders = listing.index_folders;
        let after: BTreeSet<ArchiveId> = handles.keys().cloned().collect();
        drop(handles);

        report.added = after.difference(&before).cloned().collect();
        report.removed = before.difference(&after).cloned().collect();
        if before.is_empty() && after.len() == 1 && report.added.len() == 1 {
            report.first_archive = report.added.first().cloned();
        }

        self.reconcile_catalog().await;

        info!(
            generation,
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            open = after.len(),
            "Rescan complete"
        );

        Ok(report)
    }

    fn emit_rescan_events(&self, report: &RescanReport) {
        for id in &report.removed {
            self.event_tx
                .send(Event::ArchiveRemoved { id: id.clone() })
                .ok();
        }
        for id in &report.added {
            self.event_tx.send(Event::ArchiveAdded { id: id.clone() }).ok();
        }
        if let Some(id) = &report.first_archive {
            self.event_tx
                .send(Event::FirstArchiveAdded { id: id.clone() })
                .ok();
        }
        self.event_tx
            .send(Event::RescanComplete {
                generation: report.generation,
                added: report.added.len(),
                removed: report.removed.len(),
                failed: report.failed.len(),
            })
            .ok();
    }

    /// Close every handle and forget the snapshot
    ///
    /// The next rescan reopens everything still on disk.
    pub async fn close_all(&self) {
        let mut snapshot = self.snapshot.lock().await;
        let mut handles = self.handles.write().await;
        for (_, handle) in handles.drain() {
            handle.close();
        }
        *snapshot = ScanSnapshot::default();
    }
}
