//! Configuration types for zimkit

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Filesystem layout of the library
///
/// The documents directory is the one user-visible directory holding archive
/// files and their sibling index folders. The cache directory is private and
/// holds resume data and partial transfers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory scanned for archives and watched for changes (default: "./documents")
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Private cache directory (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Extension identifying archive files (default: "zim")
    ///
    /// Matching is a case-insensitive "contains", so split archives such as
    /// `.zimaa` are also picked up.
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,

    /// Extension identifying full-text index folders (default: "idx")
    #[serde(default = "default_index_extension")]
    pub index_extension: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            cache_dir: default_cache_dir(),
            archive_extension: default_archive_extension(),
            index_extension: default_index_extension(),
        }
    }
}

impl LibraryConfig {
    /// Directory holding serialized resume data, keyed by archive id
    pub fn resume_data_dir(&self) -> PathBuf {
        self.cache_dir.join("DownloadTemp")
    }
}

/// Directory stasis detection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Spacing between directory fingerprints while checking (default: 500ms)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    pub poll_interval: Duration,

    /// Consecutive equal fingerprint comparisons that declare stasis (default: 3)
    #[serde(default = "default_stable_polls")]
    pub stable_polls: u32,

    /// Delay between stasis and the notification (default: 100ms)
    #[serde(default = "default_cooldown", with = "duration_millis_serde")]
    pub cooldown: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            stable_polls: default_stable_polls(),
            cooldown: default_cooldown(),
        }
    }
}

/// Download coordination settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Interval between speed samples (default: 300ms)
    #[serde(default = "default_sample_interval", with = "duration_millis_serde")]
    pub sample_interval: Duration,

    /// Number of samples required before a speed is published (default: 9)
    #[serde(default = "default_speed_samples")]
    pub speed_samples: usize,

    /// Minimum spacing between progress reports per transfer (default: 1000ms)
    #[serde(default = "default_report_interval", with = "duration_millis_serde")]
    pub report_interval: Duration,

    /// Refuse to start a transfer that cannot fit on disk (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            sample_interval: default_sample_interval(),
            speed_samples: default_speed_samples(),
            report_interval: default_report_interval(),
            check_disk_space: true,
        }
    }
}

/// Remote catalog and search history settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// URL of the remote catalog document (None = refresh disabled)
    #[serde(default)]
    pub url: Option<String>,

    /// Number of recent search terms kept (default: 20)
    #[serde(default = "default_max_recent_searches")]
    pub max_recent_searches: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_recent_searches: default_max_recent_searches(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./zimkit.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a [`Library`](crate::Library)
///
/// Every field has a default, so `Config::default()` works out of the box and a
/// partial JSON document only needs to name what it overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directories and file classification
    #[serde(default)]
    pub library: LibraryConfig,

    /// Directory stasis detection
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Download coordination
    #[serde(default)]
    pub download: DownloadConfig,

    /// Remote catalog and search history
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry behaviour for catalog fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Documents directory
    pub fn documents_dir(&self) -> &PathBuf {
        &self.library.documents_dir
    }

    /// Reject settings the coordinators cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.watcher.stable_polls == 0 {
            return Err(crate::Error::Config {
                message: "stable_polls must be at least 1".to_string(),
                key: Some("watcher.stable_polls".to_string()),
            });
        }
        if self.download.speed_samples == 0 {
            return Err(crate::Error::Config {
                message: "speed_samples must be at least 1".to_string(),
                key: Some("download.speed_samples".to_string()),
            });
        }
        if self.download.sample_interval.is_zero() {
            return Err(crate::Error::Config {
                message: "sample_interval must be non-zero".to_string(),
                key: Some("download.sample_interval".to_string()),
            });
        }
        if self.library.archive_extension.is_empty() {
            return Err(crate::Error::Config {
                message: "archive_extension must not be empty".to_string(),
                key: Some("library.archive_extension".to_string()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_archive_extension() -> String {
    "zim".to_string()
}

fn default_index_extension() -> String {
    "idx".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_stable_polls() -> u32 {
    3
}

fn default_cooldown() -> Duration {
    Duration::from_millis(100)
}

fn default_sample_interval() -> Duration {
    Duration::from_millis(300)
}

fn default_speed_samples() -> usize {
    9
}

fn default_report_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_recent_searches() -> usize {
    20
}

fn default_database_path() -> PathBuf {
    PathBuf::from("zimkit.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Sub-second timings are stored as integer milliseconds
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
