//! Traits and types for the archive engine

use crate::error::Result;
use crate::types::{ArchiveId, ArchiveMetadata};
use std::path::Path;
use std::sync::Arc;

/// One hit returned by an archive query
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveHit {
    /// Article title
    pub title: String,
    /// Article path inside the archive
    pub path: String,
    /// Excerpt around the match (full-text hits only)
    pub snippet: Option<String>,
    /// Engine rank, lower is better
    pub score: f64,
}

/// Raw content stored at one path of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveContent {
    /// Content bytes
    pub data: Vec<u8>,
    /// MIME type recorded in the archive
    pub mime_type: String,
    /// Content length in bytes
    pub length: usize,
}

/// Opens archive files
///
/// Implementations are blocking; callers run them on the blocking pool. The
/// registry closes a handle before it reopens or replaces that handle's file.
pub trait ArchiveEngine: Send + Sync {
    /// Open the archive at `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveOpenFailed`](crate::Error::ArchiveOpenFailed) when the
    /// file is not a readable archive.
    fn open(&self, path: &Path) -> Result<Arc<dyn ArchiveHandle>>;
}

/// An open, queryable archive
///
/// All methods are blocking. Queries are expected to be case-insensitive.
pub trait ArchiveHandle: Send + Sync {
    /// Stable content identifier
    fn id(&self) -> ArchiveId;

    /// File this handle was opened from
    fn path(&self) -> &Path;

    /// Descriptive metadata
    fn metadata(&self) -> ArchiveMetadata;

    /// Whether a full-text index is available
    fn has_index(&self) -> bool;

    /// Whether the archive carries pictures
    ///
    /// Defaults to the catalog naming convention: "nopic" archives have none.
    fn has_pictures(&self) -> bool {
        !self
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().contains("nopic"))
            .unwrap_or(false)
    }

    /// Full-text query against the index
    fn search(&self, term: &str) -> Result<Vec<ArchiveHit>>;

    /// Title-suggestion query
    fn title_suggestions(&self, term: &str) -> Result<Vec<ArchiveHit>>;

    /// URL of the main page
    fn main_page_url(&self) -> Option<String>;

    /// URL of the page with exactly this title
    fn page_url(&self, title: &str) -> Option<String>;

    /// URL of a random article
    fn random_page_url(&self) -> Option<String>;

    /// Content stored at `path`
    fn content(&self, path: &str) -> Option<ArchiveContent>;

    /// Release engine resources
    fn close(&self) {}
}

/// URL addressing `path` inside archive `id`
pub fn archive_url(id: &ArchiveId, path: &str) -> String {
    format!("zim://{}/{}", id, path.trim_start_matches('/'))
}
