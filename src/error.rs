//! Error types for zimkit
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Download, Database, Config, etc.)
//! - Context information (archive id, file path, operation, etc.)
//! - A stable machine-readable code per variant for hosts that surface errors

use crate::types::ArchiveId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zimkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for zimkit
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "documents_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The archive engine could not open a file
    ///
    /// Non-fatal during a rescan: the file is skipped and stays on disk.
    #[error("failed to open archive {path}: {reason}")]
    ArchiveOpenFailed {
        /// The archive file that could not be opened
        path: PathBuf,
        /// Engine-reported reason
        reason: String,
    },

    /// A full-text index folder disappeared; every archive must be reopened
    #[error("full-text index missing or removed")]
    IndexMissingOrRemoved,

    /// Directory watching error
    #[error("directory watch error: {0}")]
    DirectoryWatch(String),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No download state or catalog entry exists for this archive
    #[error("download {id} not found")]
    NotFound {
        /// The archive id that was not found
        id: ArchiveId,
    },

    /// The catalog entry has no remote url to fetch from
    #[error("archive {id} has no remote url")]
    NoRemoteUrl {
        /// The archive id without a url
        id: ArchiveId,
    },

    /// Resume data is missing or unreadable; the transfer must restart from zero
    #[error("resume data for {id} is missing or corrupt: {reason}")]
    ResumeDataMissingOrCorrupt {
        /// The archive id whose resume data could not be used
        id: ArchiveId,
        /// Why the resume data could not be used
        reason: String,
    },

    /// Transport failure other than a user cancellation
    #[error("transfer of {id} failed: {message}")]
    Transport {
        /// The archive id whose transfer failed
        id: ArchiveId,
        /// Transport-reported message
        message: String,
        /// Whether retrying later may succeed
        retryable: bool,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {id} in state {current_state}")]
    InvalidState {
        /// The archive id that is in an invalid state for the operation
        id: ArchiveId,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Moving the finished file into the documents directory failed
    #[error("failed to move download {id} to {path}: {reason}")]
    MoveFailed {
        /// The archive id whose file could not be installed
        id: ArchiveId,
        /// The destination path
        path: PathBuf,
        /// The reason the move failed
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code
    ///
    /// Stable identifiers a host can match on without parsing messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Download(e) => match e {
                DownloadError::NotFound { .. } => "download_not_found",
                DownloadError::NoRemoteUrl { .. } => "no_remote_url",
                DownloadError::ResumeDataMissingOrCorrupt { .. } => "resume_data_unavailable",
                DownloadError::Transport { .. } => "transport_error",
                DownloadError::InvalidState { .. } => "invalid_state",
                DownloadError::MoveFailed { .. } => "move_failed",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ArchiveOpenFailed { .. } => "archive_open_failed",
            Error::IndexMissingOrRemoved => "index_missing_or_removed",
            Error::DirectoryWatch(_) => "directory_watch_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::Other(_) => "internal_error",
        }
    }
}
