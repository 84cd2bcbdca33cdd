//! Resume data blobs on disk, one file per archive id.
//!
//! The bytes are opaque: they are written and handed back verbatim.

use crate::error::{DownloadError, Error, Result};
use crate::types::ArchiveId;
use std::path::{Path, PathBuf};

/// File holding the resume data of `id`
pub(crate) fn resume_data_path(dir: &Path, id: &ArchiveId) -> PathBuf {
    dir.join(id.as_str().replace(['/', '\\'], "_"))
}

/// Persist resume data, replacing any earlier blob
pub(crate) async fn save(dir: &Path, id: &ArchiveId, data: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = resume_data_path(dir, id);
    let mut staging = path.clone().into_os_string();
    staging.push(".tmp");
    tokio::fs::write(&staging, data).await?;
    tokio::fs::rename(&staging, &path).await?;
    Ok(path)
}

/// Read resume data back
///
/// # Errors
///
/// A missing, unreadable or empty file is reported as
/// [`DownloadError::ResumeDataMissingOrCorrupt`].
pub(crate) async fn load(dir: &Path, id: &ArchiveId) -> Result<Vec<u8>> {
    let unavailable = |reason: String| {
        Error::Download(DownloadError::ResumeDataMissingOrCorrupt {
            id: id.clone(),
            reason,
        })
    };

    let data = tokio::fs::read(resume_data_path(dir, id))
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    if data.is_empty() {
        return Err(unavailable("resume data file is empty".to_string()));
    }
    Ok(data)
}

/// Whether resume data exists for `id`
pub(crate) async fn exists(dir: &Path, id: &ArchiveId) -> bool {
    tokio::fs::metadata(resume_data_path(dir, id))
        .await
        .map(|metadata| metadata.len() > 0)
        .unwrap_or(false)
}

/// Delete resume data, best-effort
pub(crate) async fn remove(dir: &Path, id: &ArchiveId) {
    match tokio::fs::remove_file(resume_data_path(dir, id)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(archive_id = %id, error = %e, "Failed to delete resume data"),
    }
}
