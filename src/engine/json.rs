//! Archives stored as JSON documents
//!
//! Layout of an archive file:
//!
//! ```json
//! {
//!   "metadata": { "title": "Ray Charles", "language_code": "eng" },
//!   "main_page": "A/Main_Page",
//!   "articles": [
//!     { "path": "A/Main_Page", "title": "Main Page", "content": "<p>Hello</p>" }
//!   ]
//! }
//! ```
//!
//! The archive id is the SHA-256 of the file bytes. A sibling directory named
//! `<file stem>.idx` marks the full-text index as present.

use crate::error::{Error, Result};
use crate::types::{ArchiveId, ArchiveMetadata};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::traits::{ArchiveContent, ArchiveEngine, ArchiveHandle, ArchiveHit, archive_url};

/// Maximum number of title suggestions per query
const TITLE_SUGGESTION_LIMIT: usize = 10;

/// Maximum number of full-text hits per query
const FULL_TEXT_LIMIT: usize = 25;

/// Characters of context on each side of a full-text match
const SNIPPET_CONTEXT: usize = 40;

/// One article of a JSON archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonArticle {
    /// Path inside the archive
    pub path: String,
    /// Display title
    pub title: String,
    /// MIME type (default: "text/html")
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Article body
    #[serde(default)]
    pub content: String,
}

/// Document stored in a JSON archive file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonArchive {
    /// Descriptive metadata
    #[serde(default)]
    pub metadata: ArchiveMetadata,
    /// Path of the main page
    #[serde(default)]
    pub main_page: Option<String>,
    /// Articles
    #[serde(default)]
    pub articles: Vec<JsonArticle>,
}

impl JsonArchive {
    /// Empty archive with a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            metadata: ArchiveMetadata {
                title: title.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Add an HTML article
    pub fn with_article(
        mut self,
        path: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.articles.push(JsonArticle {
            path: path.into(),
            title: title.into(),
            mime_type: default_mime_type(),
            content: content.into(),
        });
        self
    }

    /// Set the main page path
    pub fn with_main_page(mut self, path: impl Into<String>) -> Self {
        self.main_page = Some(path.into());
        self
    }

    /// Serialize to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn default_mime_type() -> String {
    "text/html".to_string()
}

/// Engine for [`JsonArchive`] files
#[derive(Debug, Clone)]
pub struct JsonArchiveEngine {
    index_extension: String,
}

impl JsonArchiveEngine {
    /// Engine looking for `<stem>.<index_extension>` index folders
    pub fn new(index_extension: impl Into<String>) -> Self {
        Self {
            index_extension: index_extension.into(),
        }
    }

    fn index_dir_for(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_string_lossy();
        let parent = path.parent()?;
        Some(parent.join(format!("{}.{}", stem, self.index_extension)))
    }
}

impl Default for JsonArchiveEngine {
    fn default() -> Self {
        Self::new("idx")
    }
}

impl ArchiveEngine for JsonArchiveEngine {
    fn open(&self, path: &Path) -> Result<Arc<dyn ArchiveHandle>> {
        let open_failed = |reason: String| Error::ArchiveOpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| open_failed(e.to_string()))?;
        let mut archive: JsonArchive =
            serde_json::from_slice(&bytes).map_err(|e| open_failed(e.to_string()))?;

        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let id = ArchiveId::new(format!("{:x}", hasher.finalize()));

        if archive.metadata.file_size == 0 {
            archive.metadata.file_size = bytes.len() as u64;
        }
        if archive.metadata.article_count == 0 {
            archive.metadata.article_count = archive
                .articles
                .iter()
                .filter(|a| a.mime_type.starts_with("text/html"))
                .count() as u64;
        }

        let has_index = self
            .index_dir_for(path)
            .map(|dir| dir.is_dir())
            .unwrap_or(false);

        tracing::debug!(archive_id = %id, path = %path.display(), has_index, "Opened JSON archive");

        Ok(Arc::new(JsonArchiveHandle {
            id,
            path: path.to_path_buf(),
            has_index,
            archive,
        }))
    }
}

struct JsonArchiveHandle {
    id: ArchiveId,
    path: PathBuf,
    has_index: bool,
    archive: JsonArchive,
}

impl JsonArchiveHandle {
    fn article(&self, path: &str) -> Option<&JsonArticle> {
        let path = path.trim_start_matches('/');
        self.archive.articles.iter().find(|a| a.path == path)
    }
}

impl ArchiveHandle for JsonArchiveHandle {
    fn id(&self) -> ArchiveId {
        self.id.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn metadata(&self) -> ArchiveMetadata {
        self.archive.metadata.clone()
    }

    fn has_index(&self) -> bool {
        self.has_index
    }

    fn search(&self, term: &str) -> Result<Vec<ArchiveHit>> {
        if !self.has_index {
            return Ok(Vec::new());
        }
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ArchiveHit> = self
            .archive
            .articles
            .iter()
            .filter_map(|article| {
                let haystack = article.content.to_lowercase();
                let occurrences = haystack.matches(&needle).count();
                if occurrences == 0 {
                    return None;
                }
                let snippet = haystack
                    .find(&needle)
                    .map(|pos| snippet_around(&article.content, &haystack, pos, &needle));
                Some(ArchiveHit {
                    title: article.title.clone(),
                    path: article.path.clone(),
                    snippet,
                    // More occurrences rank better
                    score: 100.0 / (occurrences as f64 + 1.0),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        hits.truncate(FULL_TEXT_LIMIT);
        Ok(hits)
    }

    fn title_suggestions(&self, term: &str) -> Result<Vec<ArchiveHit>> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let needle_len = needle.chars().count();

        let mut hits: Vec<ArchiveHit> = self
            .archive
            .articles
            .iter()
            .filter(|article| article.title.to_lowercase().starts_with(&needle))
            .map(|article| ArchiveHit {
                title: article.title.clone(),
                path: article.path.clone(),
                snippet: None,
                // Closer to the typed term ranks better; an exact title scores 0
                score: article.title.chars().count().saturating_sub(needle_len) as f64,
            })
            .collect();

        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        hits.truncate(TITLE_SUGGESTION_LIMIT);
        Ok(hits)
    }

    fn main_page_url(&self) -> Option<String> {
        let path = match &self.archive.main_page {
            Some(path) => path.clone(),
            None => self.archive.articles.first()?.path.clone(),
        };
        Some(archive_url(&self.id, &path))
    }

    fn page_url(&self, title: &str) -> Option<String> {
        self.archive
            .articles
            .iter()
            .find(|a| a.title == title)
            .map(|a| archive_url(&self.id, &a.path))
    }

    fn random_page_url(&self) -> Option<String> {
        let pages: Vec<&JsonArticle> = self
            .archive
            .articles
            .iter()
            .filter(|a| a.mime_type.starts_with("text/html"))
            .collect();
        let mut rng = rand::thread_rng();
        pages
            .choose(&mut rng)
            .map(|a| archive_url(&self.id, &a.path))
    }

    fn content(&self, path: &str) -> Option<ArchiveContent> {
        self.article(path).map(|article| ArchiveContent {
            data: article.content.as_bytes().to_vec(),
            mime_type: article.mime_type.clone(),
            length: article.content.len(),
        })
    }
}

/// Excerpt of `original` around the match found at byte `pos` of `lowered`
fn snippet_around(original: &str, lowered: &str, pos: usize, needle: &str) -> String {
    let match_start = lowered[..pos].chars().count();
    let match_len = needle.chars().count();
    let start = match_start.saturating_sub(SNIPPET_CONTEXT);
    let end = match_start + match_len + SNIPPET_CONTEXT;

    let excerpt: String = original
        .chars()
        .skip(start)
        .take(end - start)
        .collect();
    let excerpt = excerpt.split_whitespace().collect::<Vec<_>>().join(" ");

    let total = original.chars().count();
    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&excerpt);
    if end < total {
        snippet.push_str("...");
    }
    snippet
}
