//! Catalog entry CRUD operations.

use crate::error::DatabaseError;
use crate::types::{ArchiveId, ArchiveMetadata, LocalState};
use crate::{Error, Result};

use super::{CatalogEntry, Database, NewCatalogEntry};

const CATALOG_COLUMNS: &str = r#"
    id, title, creator, publisher, description, language_code,
    article_count, media_count, file_size, favicon, date, url,
    local_state, include_in_search, has_index, has_pictures, created_at
"#;

impl Database {
    /// Insert a new catalog entry
    ///
    /// The entry's language, if any, must already exist (see [`Database::ensure_language`]).
    pub async fn insert_catalog_entry(&self, entry: &NewCatalogEntry) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let m = &entry.metadata;

        sqlx::query(
            r#"
            INSERT INTO catalog_entries (
                id, title, creator, publisher, description, language_code,
                article_count, media_count, file_size, favicon, date, url,
                local_state, include_in_search, has_index, has_pictures, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&m.title)
        .bind(&m.creator)
        .bind(&m.publisher)
        .bind(&m.description)
        .bind(&m.language_code)
        .bind(m.article_count as i64)
        .bind(m.media_count as i64)
        .bind(m.file_size as i64)
        .bind(&m.favicon)
        .bind(&m.date)
        .bind(&entry.url)
        .bind(entry.local_state.to_i32())
        .bind(entry.include_in_search)
        .bind(entry.has_index)
        .bind(entry.has_pictures)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert catalog entry {}: {}",
                entry.id, e
            )))
        })?;

        Ok(())
    }

    /// Record an archive that is open in the registry
    ///
    /// Creates the entry from the handle's metadata when it is unknown, otherwise
    /// marks it local and refreshes the index and picture flags. Remote metadata
    /// and the search toggle of an existing entry are left alone.
    pub async fn upsert_local_archive(
        &self,
        id: &ArchiveId,
        metadata: &ArchiveMetadata,
        has_index: bool,
        has_pictures: bool,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO catalog_entries (
                id, title, creator, publisher, description, language_code,
                article_count, media_count, file_size, favicon, date, url,
                local_state, include_in_search, has_index, has_pictures, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, 1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                local_state = excluded.local_state,
                has_index = excluded.has_index,
                has_pictures = excluded.has_pictures
            "#,
        )
        .bind(id)
        .bind(&metadata.title)
        .bind(&metadata.creator)
        .bind(&metadata.publisher)
        .bind(&metadata.description)
        .bind(&metadata.language_code)
        .bind(metadata.article_count as i64)
        .bind(metadata.media_count as i64)
        .bind(metadata.file_size as i64)
        .bind(&metadata.favicon)
        .bind(&metadata.date)
        .bind(LocalState::Local.to_i32())
        .bind(has_index)
        .bind(has_pictures)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert local archive {}: {}",
                id, e
            )))
        })?;

        Ok(())
    }

    /// Get a catalog entry by id
    pub async fn get_catalog_entry(&self, id: &ArchiveId) -> Result<Option<CatalogEntry>> {
        let sql = format!("SELECT {CATALOG_COLUMNS} FROM catalog_entries WHERE id = ?");
        let row = sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get catalog entry: {}",
                    e
                )))
            })?;

        Ok(row)
    }

    /// List all catalog entries ordered by title
    pub async fn list_catalog_entries(&self) -> Result<Vec<CatalogEntry>> {
        let sql = format!("SELECT {CATALOG_COLUMNS} FROM catalog_entries ORDER BY title COLLATE NOCASE ASC");
        let rows = sqlx::query_as::<_, CatalogEntry>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list catalog entries: {}",
                    e
                )))
            })?;

        Ok(rows)
    }

    /// List catalog entries in one local state
    pub async fn list_catalog_entries_by_local_state(
        &self,
        state: LocalState,
    ) -> Result<Vec<CatalogEntry>> {
        let sql = format!(
            "SELECT {CATALOG_COLUMNS} FROM catalog_entries WHERE local_state = ? ORDER BY title COLLATE NOCASE ASC"
        );
        let rows = sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(state.to_i32())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list catalog entries by local state: {}",
                    e
                )))
            })?;

        Ok(rows)
    }

    /// Ids of every catalog entry
    pub async fn catalog_entry_ids(&self) -> Result<Vec<ArchiveId>> {
        let ids = sqlx::query_scalar::<_, ArchiveId>("SELECT id FROM catalog_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list catalog entry ids: {}",
                    e
                )))
            })?;

        Ok(ids)
    }

    /// Update the local state of an entry
    pub async fn set_local_state(&self, id: &ArchiveId, state: LocalState) -> Result<()> {
        sqlx::query("UPDATE catalog_entries SET local_state = ? WHERE id = ?")
            .bind(state.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update local state: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Toggle whether an entry takes part in searches
    ///
    /// Returns false when no entry has this id.
    pub async fn set_include_in_search(&self, id: &ArchiveId, include: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE catalog_entries SET include_in_search = ? WHERE id = ?")
            .bind(include)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update include_in_search: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of entries the user excluded from searches
    pub async fn search_excluded_ids(&self) -> Result<Vec<ArchiveId>> {
        let ids = sqlx::query_scalar::<_, ArchiveId>(
            "SELECT id FROM catalog_entries WHERE include_in_search = 0",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list search exclusions: {}",
                e
            )))
        })?;

        Ok(ids)
    }

    /// Delete a catalog entry (its download state and articles cascade)
    ///
    /// Returns false when no entry had this id.
    pub async fn delete_catalog_entry(&self, id: &ArchiveId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete catalog entry: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete entries that are neither local nor downloadable
    ///
    /// Returns the number of purged entries.
    pub async fn purge_orphaned_entries(&self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM catalog_entries WHERE url IS NULL AND local_state = ?")
                .bind(LocalState::Remote.to_i32())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to purge orphaned entries: {}",
                        e
                    )))
                })?;

        Ok(result.rows_affected())
    }
}
