
use super::*;
use crate::config::LibraryConfig;
use crate::engine::{
    ArchiveContent, ArchiveEngine, ArchiveHit, JsonArchive, JsonArchiveEngine,
};
use crate::error::Error;
use crate::types::{ArchiveMetadata, Event};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Json engine whose "flaky" archives fail every query
struct FlakyEngine {
    inner: JsonArchiveEngine,
}

struct FlakyHandle {
    inner: Arc<dyn ArchiveHandle>,
}

impl ArchiveEngine for FlakyEngine {
    fn open(&self, path: &Path) -> crate::Result<Arc<dyn ArchiveHandle>> {
        let inner = self.inner.open(path)?;
        if path.to_string_lossy().contains("flaky") {
            Ok(Arc::new(FlakyHandle { inner }))
        } else {
            Ok(inner)
        }
    }
}

impl ArchiveHandle for FlakyHandle {
    fn id(&self) -> ArchiveId {
        self.inner.id()
    }
    fn path(&self) -> &Path {
        self.inner.path()
    }
    fn metadata(&self) -> ArchiveMetadata {
        self.inner.metadata()
    }
    fn has_index(&self) -> bool {
        true
    }
    fn search(&self, _term: &str) -> crate::Result<Vec<ArchiveHit>> {
        Err(Error::Other("index corrupt".to_string()))
    }
    fn title_suggestions(&self, _term: &str) -> crate::Result<Vec<ArchiveHit>> {
        Err(Error::Other("index corrupt".to_string()))
    }
    fn main_page_url(&self) -> Option<String> {
        None
    }
    fn page_url(&self, _title: &str) -> Option<String> {
        None
    }
    fn random_page_url(&self) -> Option<String> {
        None
    }
    fn content(&self, _path: &str) -> Option<ArchiveContent> {
        None
    }
}

struct Fixture {
    _temp_dir: TempDir,
    documents: PathBuf,
    registry: ArchiveRegistry,
    db: Arc<Database>,
    search: SearchCoordinator,
}

async fn fixture() -> Fixture {
    fixture_with(Arc::new(FlakyEngine {
        inner: JsonArchiveEngine::default(),
    }))
    .await
}

async fn fixture_with(engine: Arc<dyn ArchiveEngine>) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let documents = temp_dir.path().join("documents");
    std::fs::create_dir_all(&documents).unwrap();

    let config = LibraryConfig {
        documents_dir: documents.clone(),
        cache_dir: temp_dir.path().join("cache"),
        ..Default::default()
    };
    let db = Arc::new(Database::new(&temp_dir.path().join("zimkit.db")).await.unwrap());
    let (event_tx, _) = broadcast::channel::<Event>(100);
    let registry = ArchiveRegistry::new(config, engine, db.clone(), event_tx);
    let search = SearchCoordinator::new(registry.clone(), db.clone(), 20);

    Fixture {
        _temp_dir: temp_dir,
        documents,
        registry,
        db,
        search,
    }
}

fn write_music_archive(dir: &Path) {
    JsonArchive::new("Music")
        .with_article("A/Ray_Charles", "Ray Charles", "Ray Charles Robinson, a pioneer of soul.")
        .with_article("A/Soul", "Soul music", "Ray Charles shaped soul music.")
        .with_article("A/Jazz", "Jazz", "Ray Charles also played jazz.")
        .write_to(&dir.join("music.zim"))
        .unwrap();
    std::fs::create_dir(dir.join("music.idx")).unwrap();
}

fn write_people_archive(dir: &Path) {
    JsonArchive::new("People")
        .with_article("A/Ray", "Ray", "A given name.")
        .with_article("A/Raymond", "Raymond", "Another given name.")
        .write_to(&dir.join("people.zim"))
        .unwrap();
}

#[tokio::test]
async fn fans_out_and_merges_across_archives() {
    let f = fixture().await;
    write_music_archive(&f.documents);
    write_people_archive(&f.documents);
    f.registry.rescan().await.unwrap();

    let results = f.search.search("Ray").await.unwrap();
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();

    // Exact title first, then by score; the music title hit replaced its full-text twin
    assert_eq!(titles[0], "Ray");
    assert!(titles.contains(&"Raymond"));
    assert!(titles.contains(&"Ray Charles"));
    assert!(titles.contains(&"Soul music"));
    assert!(titles.contains(&"Jazz"));
    assert_eq!(
        results.iter().filter(|r| r.path == "A/Ray_Charles").count(),
        1
    );
    let ray_charles = results.iter().find(|r| r.path == "A/Ray_Charles").unwrap();
    assert!(ray_charles.snippet.is_none(), "title suggestion must win");

    for pair in results.windows(2) {
        assert_ne!(
            compare_results(&pair[0], &pair[1]),
            std::cmp::Ordering::Greater
        );
    }
}

/// Json engine whose `open` blocks until the test releases it
struct GatedEngine {
    inner: JsonArchiveEngine,
    entered: mpsc::UnboundedSender<PathBuf>,
    release: StdMutex<std_mpsc::Receiver<()>>,
}

impl ArchiveEngine for GatedEngine {
    fn open(&self, path: &Path) -> crate::Result<Arc<dyn ArchiveHandle>> {
        self.entered.send(path.to_path_buf()).ok();
        self.release.lock().unwrap().recv().ok();
        self.inner.open(path)
    }
}

#[tokio::test]
async fn search_waits_for_a_running_rescan() {
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let f = fixture_with(Arc::new(GatedEngine {
        inner: JsonArchiveEngine::default(),
        entered: entered_tx,
        release: StdMutex::new(release_rx),
    }))
    .await;
    write_people_archive(&f.documents);

    let rescan = tokio::spawn({
        let registry = f.registry.clone();
        async move { registry.rescan().await }
    });
    let opening = entered_rx.recv().await.unwrap();
    assert!(opening.ends_with("people.zim"));

    let search = tokio::spawn({
        let search = f.search.clone();
        async move { search.search("ray").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!search.is_finished(), "search ran against a half-built registry");

    release_tx.send(()).unwrap();
    let report = rescan.await.unwrap().unwrap();
    assert_eq!(report.added.len(), 1);

    let results = search.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.archive_id == report.added[0]));
}

#[tokio::test]
async fn excluded_archives_are_not_searched() {
    let f = fixture().await;
    write_music_archive(&f.documents);
    write_people_archive(&f.documents);
    f.registry.rescan().await.unwrap();

    let people = f
        .registry
        .handles()
        .await
        .into_iter()
        .find(|h| h.metadata().title == "People")
        .unwrap()
        .id();
    assert!(f.db.set_include_in_search(&people, false).await.unwrap());

    let results = f.search.search("ray").await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.archive_id != people));
}

#[tokio::test]
async fn failing_archive_does_not_abort_the_search() {
    let f = fixture().await;
    write_people_archive(&f.documents);
    JsonArchive::new("Flaky")
        .with_article("A/Ray", "Ray", "x")
        .write_to(&f.documents.join("flaky.zim"))
        .unwrap();
    f.registry.rescan().await.unwrap();
    assert_eq!(f.registry.len().await, 2);

    let results = f.search.search("ray").await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.path.starts_with("A/Ray")));
}

#[tokio::test]
async fn newer_search_supersedes_older_one() {
    let f = fixture().await;
    write_people_archive(&f.documents);
    f.registry.rescan().await.unwrap();

    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();

    let first = f.search.spawn_search("ray", move |results| {
        first_tx.send(results).ok();
    });
    let second = f.search.spawn_search("ray", move |results| {
        second_tx.send(results).ok();
    });
    first.await.unwrap();
    second.await.unwrap();

    assert!(first_rx.await.unwrap().is_none());
    assert_eq!(second_rx.await.unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn cancel_delivers_none() {
    let f = fixture().await;
    write_people_archive(&f.documents);
    f.registry.rescan().await.unwrap();

    let (tx, rx) = oneshot::channel();
    let task = f.search.spawn_search("ray", move |results| {
        tx.send(results).ok();
    });
    f.search.cancel();
    task.await.unwrap();

    assert!(rx.await.unwrap().is_none());

    // The coordinator keeps working afterwards
    assert!(f.search.search("ray").await.is_some());
}

#[tokio::test]
async fn empty_term_yields_empty_results() {
    let f = fixture().await;
    write_people_archive(&f.documents);
    f.registry.rescan().await.unwrap();

    assert_eq!(f.search.search("   ").await, Some(Vec::new()));
    assert!(f.search.recent_searches().await.unwrap().is_empty());
}

#[tokio::test]
async fn no_archives_yields_empty_results() {
    let f = fixture().await;
    f.registry.rescan().await.unwrap();
    assert_eq!(f.search.search("ray").await, Some(Vec::new()));
}

#[tokio::test]
async fn issued_terms_are_remembered() {
    let f = fixture().await;
    f.registry.rescan().await.unwrap();

    f.search.search("ray").await;
    f.search.search("soul").await;
    f.search.search("ray").await;

    assert_eq!(
        f.search.recent_searches().await.unwrap(),
        vec!["ray".to_string(), "soul".to_string()]
    );

    f.search.clear_recent_searches().await.unwrap();
    assert!(f.search.recent_searches().await.unwrap().is_empty());
}
