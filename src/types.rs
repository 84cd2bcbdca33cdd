//! Core types for zimkit

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stable content identifier of an archive
///
/// Reported by the archive engine and derived from the file's content, not its
/// path: renaming a file keeps its id, different bytes give a different id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(pub String);

impl ArchiveId {
    /// Create a new ArchiveId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ArchiveId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ArchiveId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<ArchiveId> for String {
    fn from(id: ArchiveId) -> Self {
        id.0
    }
}

impl AsRef<str> for ArchiveId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ArchiveId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for ArchiveId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ArchiveId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ArchiveId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Whether a catalog entry's archive is on this device
///
/// The third state covers the window between starting a transfer and the
/// finished file being picked up by a rescan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalState {
    /// Only available remotely
    Remote,
    /// Open in the registry
    Local,
    /// Unknown while a transfer is in flight
    Transferring,
}

impl LocalState {
    /// Convert integer code to LocalState
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => LocalState::Local,
            2 => LocalState::Transferring,
            _ => LocalState::Remote,
        }
    }

    /// Convert LocalState to integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            LocalState::Remote => 0,
            LocalState::Local => 1,
            LocalState::Transferring => 2,
        }
    }
}

/// State of one persisted transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Created, no bytes received yet
    Queued,
    /// Receiving bytes
    Downloading,
    /// Stopped by the user or by a transport error, resumable
    Paused,
    /// Failed with a non-retryable error
    Errored,
}

impl DownloadStatus {
    /// Convert integer status code to DownloadStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => DownloadStatus::Queued,
            1 => DownloadStatus::Downloading,
            2 => DownloadStatus::Paused,
            _ => DownloadStatus::Errored,
        }
    }

    /// Convert DownloadStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            DownloadStatus::Queued => 0,
            DownloadStatus::Downloading => 1,
            DownloadStatus::Paused => 2,
            DownloadStatus::Errored => 3,
        }
    }

    /// Whether a transfer task should be running in this state
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DownloadStatus::Queued | DownloadStatus::Downloading)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Free space in the documents directory relative to an archive's size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceState {
    /// The archive uses less than 80% of the free space
    Enough,
    /// The archive fits but leaves little room
    Caution,
    /// The archive does not fit
    NotEnough,
}

impl SpaceState {
    /// Classify `required` bytes against `available` bytes
    pub fn classify(required: u64, available: u64) -> Self {
        if (available as f64) * 0.8 > required as f64 {
            SpaceState::Enough
        } else if available < required {
            SpaceState::NotEnough
        } else {
            SpaceState::Caution
        }
    }
}

/// Descriptive metadata of an archive
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveMetadata {
    /// Display title
    pub title: String,
    /// Content creator
    pub creator: Option<String>,
    /// Publisher
    pub publisher: Option<String>,
    /// Short description
    pub description: Option<String>,
    /// Language code (ISO 639-3, lower-case)
    pub language_code: Option<String>,
    /// Number of articles
    pub article_count: u64,
    /// Number of media entries
    pub media_count: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Favicon image bytes
    pub favicon: Option<Vec<u8>>,
    /// Publication date (YYYY-MM-DD)
    pub date: Option<String>,
}

/// One hit of a merged multi-archive search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Archive the hit belongs to
    pub archive_id: ArchiveId,
    /// Article title
    pub title: String,
    /// Article path inside the archive
    pub path: String,
    /// Text excerpt around the match (full-text hits only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Engine rank, lower is better
    pub score: f64,
}

/// Event emitted by the registry, watcher and download coordinator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The documents directory settled after a burst of changes
    DirectoryChanged,

    /// A rescan finished and the handle map is consistent again
    RescanComplete {
        /// Registry generation after the rescan
        generation: u64,
        /// Number of archives that became available
        added: usize,
        /// Number of archives that went away
        removed: usize,
        /// Number of files the engine could not open
        failed: usize,
    },

    /// An archive was opened
    ArchiveAdded {
        /// Archive ID
        id: ArchiveId,
    },

    /// An archive was closed because its file disappeared
    ArchiveRemoved {
        /// Archive ID
        id: ArchiveId,
    },

    /// The library went from no archives to exactly one
    FirstArchiveAdded {
        /// Archive ID
        id: ArchiveId,
    },

    /// A transfer was created
    DownloadQueued {
        /// Archive ID
        id: ArchiveId,
    },

    /// First bytes of a transfer arrived
    DownloadStarted {
        /// Archive ID
        id: ArchiveId,
    },

    /// Throttled progress report
    DownloadProgress {
        /// Archive ID
        id: ArchiveId,
        /// Bytes written so far
        completed_bytes: u64,
        /// Expected total bytes (0 when unknown)
        total_bytes: u64,
        /// Smoothed speed in bytes per second, once enough samples exist
        #[serde(skip_serializing_if = "Option::is_none")]
        speed_bps: Option<u64>,
    },

    /// A transfer stopped and can be resumed
    DownloadPaused {
        /// Archive ID
        id: ArchiveId,
        /// Whether resume data was saved
        resumable: bool,
    },

    /// A transfer failed
    DownloadFailed {
        /// Archive ID
        id: ArchiveId,
        /// Error message
        error: String,
        /// Whether a later resume may succeed
        retryable: bool,
    },

    /// The finished file was moved into the documents directory
    DownloadComplete {
        /// Archive ID
        id: ArchiveId,
        /// Final location
        path: PathBuf,
    },

    /// A transfer was discarded
    DownloadCancelled {
        /// Archive ID
        id: ArchiveId,
    },

    /// The remote catalog was refreshed
    CatalogRefreshed {
        /// Entries inserted
        added: usize,
        /// Remote-only entries deleted
        removed: usize,
    },

    /// Library shutting down
    Shutdown,
}
