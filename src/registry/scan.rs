//! Directory classification and snapshot diffing.

use crate::error::{Error, Result};
use crate::types::ArchiveId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Size and modification time of an archive file
///
/// A file replaced in place under the same name shows up as a changed stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FileStamp {
    pub(crate) size: u64,
    pub(crate) modified: Option<SystemTime>,
}

impl FileStamp {
    pub(crate) fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Archive files and index folders found in the documents directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DirectoryListing {
    pub(crate) archives: HashMap<PathBuf, FileStamp>,
    pub(crate) index_folders: HashSet<PathBuf>,
}

/// An archive file the previous rescan opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenedFile {
    pub(crate) id: ArchiveId,
    pub(crate) stamp: FileStamp,
}

/// What the previous rescan saw and opened
#[derive(Debug, Default)]
pub(crate) struct ScanSnapshot {
    /// Successfully opened archive files
    pub(crate) archives: HashMap<PathBuf, OpenedFile>,
    pub(crate) index_folders: HashSet<PathBuf>,
}

/// Work a rescan has to do
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ScanPlan {
    /// Every handle must be closed and every file reopened
    pub(crate) reopen_all: bool,
    pub(crate) to_close: Vec<PathBuf>,
    pub(crate) to_open: Vec<PathBuf>,
}

impl ScanSnapshot {
    /// Check the index folders against a fresh listing
    ///
    /// Returns whether index folders were added. A removed index folder is
    /// reported as [`Error::IndexMissingOrRemoved`]: the engine caches index
    /// availability per handle, so every archive has to be reopened.
    pub(crate) fn check_index_folders(&self, listing: &DirectoryListing) -> Result<bool> {
        if self
            .index_folders
            .difference(&listing.index_folders)
            .next()
            .is_some()
        {
            return Err(Error::IndexMissingOrRemoved);
        }
        Ok(listing
            .index_folders
            .difference(&self.index_folders)
            .next()
            .is_some())
    }

    /// Compare with a fresh listing
    ///
    /// Files that failed to open last time are not in the snapshot, so they are
    /// retried on every rescan. A file whose stamp changed is closed and
    /// opened again.
    pub(crate) fn plan(&self, listing: &DirectoryListing) -> ScanPlan {
        let reopen_all = match self.check_index_folders(listing) {
            Ok(added) => added,
            Err(e) => {
                tracing::info!(reason = %e, "Reopening all archives");
                true
            }
        };

        let mut plan = if reopen_all {
            ScanPlan {
                reopen_all,
                to_close: self.archives.keys().cloned().collect(),
                to_open: listing.archives.keys().cloned().collect(),
            }
        } else {
            let replaced = |path: &PathBuf, opened: &OpenedFile| {
                listing
                    .archives
                    .get(path)
                    .is_some_and(|stamp| *stamp != opened.stamp)
            };
            ScanPlan {
                reopen_all,
                to_close: self
                    .archives
                    .iter()
                    .filter(|(path, opened)| {
                        !listing.archives.contains_key(*path) || replaced(path, opened)
                    })
                    .map(|(path, _)| path.clone())
                    .collect(),
                to_open: listing
                    .archives
                    .keys()
                    .filter(|path| {
                        self.archives
                            .get(*path)
                            .is_none_or(|opened| replaced(path, opened))
                    })
                    .cloned()
                    .collect(),
            }
        };

        plan.to_close.sort();
        plan.to_open.sort();
        plan
    }
}

/// Whether `path` names an archive file
///
/// The extension only has to contain `archive_extension`, so split archives
/// (`.zimaa`, `.zimab`) match too.
pub(crate) fn is_archive_file(path: &Path, archive_extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.to_ascii_lowercase()
                .contains(&archive_extension.to_ascii_lowercase())
        })
        .unwrap_or(false)
}

/// Whether `path` names an index folder
pub(crate) fn is_index_folder(path: &Path, index_extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(index_extension))
        .unwrap_or(false)
}

/// Classify the entries of `dir`
///
/// A missing directory lists as empty.
pub(crate) async fn list_directory(
    dir: &Path,
    archive_extension: &str,
    index_extension: &str,
) -> Result<DirectoryListing> {
    let mut listing = DirectoryListing::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };

        if file_type.is_dir() {
            if is_index_folder(&path, index_extension) {
                listing.index_folders.insert(path);
            }
        } else if is_archive_file(&path, archive_extension) {
            // Gone between listing and stat
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            listing.archives.insert(path, FileStamp::of(&metadata));
        }
    }

    Ok(listing)
}
