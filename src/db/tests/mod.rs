
use crate::db::NewCatalogEntry;
use crate::types::{ArchiveId, ArchiveMetadata, LocalState};

/// Remote entry with a download url and no local file
pub(super) fn remote_entry(id: &str, title: &str) -> NewCatalogEntry {
    NewCatalogEntry {
        id: ArchiveId::from(id),
        metadata: ArchiveMetadata {
            title: title.to_string(),
            file_size: 4096,
            ..Default::default()
        },
        url: Some(format!("https://download.example.org/{id}.zim")),
        local_state: LocalState::Remote,
        include_in_search: true,
        has_index: false,
        has_pictures: true,
    }
}
