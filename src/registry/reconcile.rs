//! Catalog reconciliation after a rescan.
//!
//! Every open handle gets a local catalog entry, and every local entry must
//! have an open handle. Store failures are logged and never undo the handle
//! map.

use crate::types::{ArchiveId, LocalState};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::ArchiveRegistry;

impl ArchiveRegistry {
    /// Apply the handle map to the catalog, best-effort
    pub(crate) async fn reconcile_catalog(&self) {
        let handles = self.handles().await;
        let open_ids: HashSet<ArchiveId> = handles.iter().map(|handle| handle.id()).collect();

        for handle in &handles {
            let id = handle.id();
            let mut metadata = handle.metadata();

            metadata.language_code = match metadata.language_code.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() => match self.db.ensure_language(code, None).await {
                    Ok(language) => Some(language.code),
                    Err(e) => {
                        warn!(archive_id = %id, error = %e, "Failed to record archive language");
                        None
                    }
                },
                _ => None,
            };

            if let Err(e) = self
                .db
                .upsert_local_archive(&id, &metadata, handle.has_index(), handle.has_pictures())
                .await
            {
                warn!(archive_id = %id, error = %e, "Failed to record local archive");
            }
        }

        let local_entries = match self
            .db
            .list_catalog_entries_by_local_state(LocalState::Local)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list local catalog entries");
                return;
            }
        };

        for entry in local_entries {
            if open_ids.contains(&entry.id) {
                continue;
            }

            let result = if entry.url.is_none() {
                debug!(archive_id = %entry.id, "Deleting catalog entry of removed archive");
                self.db.delete_catalog_entry(&entry.id).await.map(|_| ())
            } else {
                debug!(archive_id = %entry.id, "Archive removed, entry stays downloadable");
                self.db
                    .set_local_state(&entry.id, LocalState::Remote)
                    .await
            };

            if let Err(e) = result {
                warn!(archive_id = %entry.id, error = %e, "Failed to reconcile catalog entry");
            }
        }

        match self.db.purge_orphaned_entries().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged orphaned catalog entries"),
            Err(e) => warn!(error = %e, "Failed to purge orphaned catalog entries"),
        }
    }
}
