//! Archive fixtures

use sha2::{Digest, Sha256};
use std::path::Path;
use zimkit::ArchiveId;
use zimkit::engine::JsonArchive;

/// Archive about music, with a full-text index when written with [`write_archive`]
pub fn music_archive() -> JsonArchive {
    JsonArchive::new("Music")
        .with_article("A/Ray_Charles", "Ray Charles", "Ray Charles Robinson, a pioneer of soul.")
        .with_article("A/Soul", "Soul music", "Ray Charles shaped soul music.")
        .with_main_page("A/Ray_Charles")
}

/// Archive of given names, without a full-text index
pub fn names_archive() -> JsonArchive {
    JsonArchive::new("Names")
        .with_article("A/Ray", "Ray", "A given name.")
        .with_article("A/Raymond", "Raymond", "Another given name.")
}

/// Serialized archive bytes
pub fn archive_bytes(archive: &JsonArchive) -> Vec<u8> {
    serde_json::to_vec_pretty(archive).expect("Failed to serialize archive")
}

/// Id the JSON engine assigns to an archive file holding `bytes`
pub fn archive_id_of(bytes: &[u8]) -> ArchiveId {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ArchiveId::new(format!("{:x}", hasher.finalize()))
}

/// Write `archive` to `<dir>/<file_name>` and return its id
///
/// With `indexed`, a sibling `.idx` folder marks the full-text index present.
pub fn write_archive(dir: &Path, file_name: &str, archive: &JsonArchive, indexed: bool) -> ArchiveId {
    let bytes = archive_bytes(archive);
    std::fs::write(dir.join(file_name), &bytes).expect("Failed to write archive");
    if indexed {
        let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
        std::fs::create_dir_all(dir.join(format!("{}.idx", stem)))
            .expect("Failed to create index folder");
    }
    archive_id_of(&bytes)
}
