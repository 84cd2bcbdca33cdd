use crate::engine::*;
use crate::error::Error;
use std::path::Path;
use tempfile::TempDir;

fn sample_archive() -> JsonArchive {
    JsonArchive::new("Ray Charles")
        .with_main_page("A/Main_Page")
        .with_article("A/Main_Page", "Main Page", "Welcome to the Ray Charles archive")
        .with_article(
            "A/Ray_Charles",
            "Ray Charles",
            "Ray Charles Robinson was an American singer. Ray was a pioneer of soul.",
        )
        .with_article("A/Raymond", "Raymond", "A name unrelated to soul music.")
        .with_article("A/Piano", "Piano", "Instrument played by many, including Ray.")
}

fn write_archive(dir: &Path, name: &str, archive: &JsonArchive) -> std::path::PathBuf {
    let path = dir.join(name);
    archive.write_to(&path).unwrap();
    path
}

#[test]
fn test_id_is_content_derived_and_stable_across_renames() {
    let dir = TempDir::new().unwrap();
    let engine = JsonArchiveEngine::default();

    let path = write_archive(dir.path(), "ray.zim", &sample_archive());
    let first = engine.open(&path).unwrap().id();

    let renamed = dir.path().join("renamed.zim");
    std::fs::rename(&path, &renamed).unwrap();
    let second = engine.open(&renamed).unwrap().id();
    assert_eq!(first, second, "renaming must keep the id");

    let other = write_archive(
        dir.path(),
        "other.zim",
        &sample_archive().with_article("A/Extra", "Extra", "more bytes"),
    );
    let third = engine.open(&other).unwrap().id();
    assert_ne!(first, third, "different bytes must give a different id");
}

#[test]
fn test_open_failure_is_reported_with_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.zim");
    std::fs::write(&path, b"not json").unwrap();

    let err = match JsonArchiveEngine::default().open(&path) {
        Ok(_) => panic!("garbage must not open"),
        Err(e) => e,
    };
    match err {
        Error::ArchiveOpenFailed { path: p, .. } => assert_eq!(p, path),
        other => panic!("expected ArchiveOpenFailed, got {other:?}"),
    }
}

#[test]
fn test_index_folder_enables_full_text_search() {
    let dir = TempDir::new().unwrap();
    let engine = JsonArchiveEngine::default();
    let path = write_archive(dir.path(), "ray.zim", &sample_archive());

    let handle = engine.open(&path).unwrap();
    assert!(!handle.has_index());
    assert!(handle.search("soul").unwrap().is_empty());

    std::fs::create_dir(dir.path().join("ray.idx")).unwrap();
    let handle = engine.open(&path).unwrap();
    assert!(handle.has_index());

    let hits = handle.search("SOUL").unwrap();
    let paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"A/Ray_Charles"));
    assert!(paths.contains(&"A/Raymond"));
    assert!(hits.iter().all(|h| h.snippet.is_some()));
}

#[test]
fn test_title_suggestions_rank_exact_title_first() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "ray.zim", &sample_archive());
    let handle = JsonArchiveEngine::default().open(&path).unwrap();

    let hits = handle.title_suggestions("ray").unwrap();
    let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
    assert_eq!(titles, vec!["Raymond", "Ray Charles"]);
    assert!(hits.iter().all(|h| h.snippet.is_none()));

    let exact = handle.title_suggestions("piano").unwrap();
    assert_eq!(exact[0].score, 0.0);
}

#[test]
fn test_full_text_snippet_contains_match() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("ray.idx")).unwrap();
    let path = write_archive(dir.path(), "ray.zim", &sample_archive());
    let handle = JsonArchiveEngine::default().open(&path).unwrap();

    let hits = handle.search("pioneer").unwrap();
    assert_eq!(hits.len(), 1);
    let snippet = hits[0].snippet.as_deref().unwrap();
    assert!(snippet.contains("pioneer"), "snippet was {snippet:?}");
}

#[test]
fn test_lookups() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "ray.zim", &sample_archive());
    let handle = JsonArchiveEngine::default().open(&path).unwrap();
    let id = handle.id();

    assert_eq!(
        handle.main_page_url(),
        Some(format!("zim://{}/A/Main_Page", id))
    );
    assert_eq!(
        handle.page_url("Piano"),
        Some(format!("zim://{}/A/Piano", id))
    );
    assert_eq!(handle.page_url("Nope"), None);

    let random = handle.random_page_url().unwrap();
    assert!(random.starts_with(&format!("zim://{}/A/", id)));

    let content = handle.content("/A/Piano").unwrap();
    assert_eq!(content.mime_type, "text/html");
    assert_eq!(content.length, content.data.len());
    assert!(handle.content("A/Missing").is_none());
}

#[test]
fn test_metadata_defaults_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "ray.zim", &sample_archive());
    let handle = JsonArchiveEngine::default().open(&path).unwrap();

    let metadata = handle.metadata();
    assert_eq!(metadata.title, "Ray Charles");
    assert_eq!(metadata.article_count, 4);
    assert_eq!(
        metadata.file_size,
        std::fs::metadata(&path).unwrap().len()
    );
}

#[test]
fn test_has_pictures_follows_nopic_naming() {
    let dir = TempDir::new().unwrap();
    let engine = JsonArchiveEngine::default();

    let with = write_archive(dir.path(), "wiki_all.zim", &sample_archive());
    let without = write_archive(dir.path(), "wiki_nopic.zim", &sample_archive());

    assert!(engine.open(&with).unwrap().has_pictures());
    assert!(!engine.open(&without).unwrap().has_pictures());
}
