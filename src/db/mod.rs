//! Database layer for zimkit
//!
//! Handles SQLite persistence for the archive catalog, download states,
//! article bookmarks and runtime state. This is the relational store behind the registry and the
//! download coordinator; nothing here knows about open archive handles.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`catalog`] - Catalog entry CRUD and reconciliation helpers
//! - [`languages`] - Language records referenced by catalog entries
//! - [`download_states`] - Persisted transfer states
//! - [`articles`] - Article bookmarks and reading history
//! - [`state`] - Runtime state (shutdown tracking, recent searches, refresh time)

use crate::types::{ArchiveId, ArchiveMetadata, DownloadStatus, LocalState};
use sqlx::{FromRow, sqlite::SqlitePool};

mod articles;
mod catalog;
mod download_states;
mod languages;
mod migrations;
mod state;

/// New catalog entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewCatalogEntry {
    /// Archive id
    pub id: ArchiveId,
    /// Descriptive metadata
    pub metadata: ArchiveMetadata,
    /// Remote download url
    pub url: Option<String>,
    /// Whether the archive is on this device
    pub local_state: LocalState,
    /// Include this archive in multi-archive searches
    pub include_in_search: bool,
    /// Whether a full-text index is present
    pub has_index: bool,
    /// Whether the archive carries pictures
    pub has_pictures: bool,
}

/// Catalog entry record from database
#[derive(Debug, Clone, FromRow)]
pub struct CatalogEntry {
    /// Archive id
    pub id: ArchiveId,
    /// Display title
    pub title: String,
    /// Content creator
    pub creator: Option<String>,
    /// Publisher
    pub publisher: Option<String>,
    /// Short description
    pub description: Option<String>,
    /// Language code (references `languages.code`)
    pub language_code: Option<String>,
    /// Number of articles
    pub article_count: i64,
    /// Number of media entries
    pub media_count: i64,
    /// File size in bytes
    pub file_size: i64,
    /// Favicon image bytes
    pub favicon: Option<Vec<u8>>,
    /// Publication date (YYYY-MM-DD)
    pub date: Option<String>,
    /// Remote download url
    pub url: Option<String>,
    /// Local state code (0=remote, 1=local, 2=transferring)
    pub local_state: i32,
    /// Include in multi-archive searches
    pub include_in_search: bool,
    /// Whether a full-text index is present
    pub has_index: bool,
    /// Whether the archive carries pictures
    pub has_pictures: bool,
    /// Unix timestamp when the entry was created
    pub created_at: i64,
}

impl CatalogEntry {
    /// Decoded local state
    pub fn local_state(&self) -> LocalState {
        LocalState::from_i32(self.local_state)
    }

    /// Metadata view of the stored columns
    pub fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata {
            title: self.title.clone(),
            creator: self.creator.clone(),
            publisher: self.publisher.clone(),
            description: self.description.clone(),
            language_code: self.language_code.clone(),
            article_count: self.article_count.max(0) as u64,
            media_count: self.media_count.max(0) as u64,
            file_size: self.file_size.max(0) as u64,
            favicon: self.favicon.clone(),
            date: self.date.clone(),
        }
    }
}

/// Language record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Language {
    /// ISO 639-3 code, lower-case
    pub code: String,
    /// Display name, when known
    pub name: Option<String>,
}

/// Download state record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadState {
    /// Catalog entry this transfer belongs to
    pub catalog_entry_id: ArchiveId,
    /// Status code (see [`DownloadStatus`])
    pub state: i32,
    /// Bytes written when the state was last persisted
    pub total_bytes_written: i64,
    /// Unix timestamp when the transfer was created
    pub created_at: i64,
}

impl DownloadState {
    /// Decoded status
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::from_i32(self.state)
    }
}

/// Article to record against a catalog entry
#[derive(Debug, Clone)]
pub struct NewArticle {
    /// Article url (`zim://<archive id>/<path>`)
    pub url: String,
    /// Archive the article belongs to
    pub catalog_entry_id: ArchiveId,
    /// Article title
    pub title: Option<String>,
    /// Whether this is the archive's main page
    pub is_main_page: bool,
}

/// Article record from database
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Article {
    /// Article url
    pub url: String,
    /// Archive the article belongs to
    pub catalog_entry_id: ArchiveId,
    /// Article title
    pub title: Option<String>,
    /// Whether this is the archive's main page
    pub is_main_page: bool,
    /// Whether the user bookmarked the article
    pub is_bookmarked: bool,
    /// Unix timestamp of the bookmark
    pub bookmark_date: Option<i64>,
    /// Unix timestamp of the last read
    pub last_read_date: Option<i64>,
    /// How far the article was read, 0.0 to 1.0
    pub last_position: f64,
    /// Unix timestamp when the article was first recorded
    pub created_at: i64,
}

/// Database handle for zimkit
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
