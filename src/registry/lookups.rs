//! Reader-side lookups across the open archives.

use crate::engine::ArchiveContent;
use crate::types::ArchiveId;
use rand::seq::SliceRandom;
use tracing::warn;

use super::ArchiveRegistry;

/// Run a blocking engine call on the blocking pool
async fn run_blocking<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> Option<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Archive lookup task failed");
            None
        }
    }
}

impl ArchiveRegistry {
    /// Content stored at `path` in archive `id`
    pub async fn content(&self, id: &ArchiveId, path: &str) -> Option<ArchiveContent> {
        let handle = self.handle(id).await?;
        let path = path.to_string();
        run_blocking(move || handle.content(&path)).await
    }

    /// URL of the page titled `title` in archive `id`
    pub async fn page_url(&self, id: &ArchiveId, title: &str) -> Option<String> {
        let handle = self.handle(id).await?;
        let title = title.to_string();
        run_blocking(move || handle.page_url(&title)).await
    }

    /// URL of the main page of archive `id`
    pub async fn main_page_url(&self, id: &ArchiveId) -> Option<String> {
        let handle = self.handle(id).await?;
        run_blocking(move || handle.main_page_url()).await
    }

    /// Random article from a uniformly chosen open archive
    pub async fn random_page_url(&self) -> Option<(ArchiveId, String)> {
        let handle = {
            let handles = self.handles().await;
            handles.choose(&mut rand::thread_rng()).cloned()?
        };
        let id = handle.id();
        let url = run_blocking(move || handle.random_page_url()).await?;
        Some((id, url))
    }
}
