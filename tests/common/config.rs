//! Test configuration helpers for creating libraries in temporary directories

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zimkit::config::{
    CatalogConfig, DownloadConfig, LibraryConfig, PersistenceConfig, RetryConfig, WatcherConfig,
};
use zimkit::{Config, JsonArchiveEngine, Library};

/// Configuration rooted in `temp_dir` with fast timers
pub fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        library: LibraryConfig {
            documents_dir: temp_dir.path().join("documents"),
            cache_dir: temp_dir.path().join("cache"),
            ..Default::default()
        },
        watcher: WatcherConfig {
            poll_interval: Duration::from_millis(20),
            stable_polls: 2,
            cooldown: Duration::from_millis(10),
        },
        download: DownloadConfig {
            sample_interval: Duration::from_millis(20),
            speed_samples: 3,
            report_interval: Duration::from_millis(20),
            check_disk_space: true,
        },
        catalog: CatalogConfig::default(),
        persistence: PersistenceConfig {
            database_path: temp_dir.path().join("zimkit.db"),
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Library over JSON archives that transfers over HTTP
///
/// Returns the library and temp directory (keep temp_dir alive for test duration)
pub async fn create_test_library() -> (Arc<Library>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let library = create_library_with_config(config).await;
    (library, temp_dir)
}

/// Library for an explicit configuration
pub async fn create_library_with_config(config: Config) -> Arc<Library> {
    let engine = Arc::new(JsonArchiveEngine::default());
    let library = Library::with_http_session(config, engine)
        .await
        .expect("Failed to create library");
    Arc::new(library)
}
