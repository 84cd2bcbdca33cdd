//! Persisted transfer states.

use crate::error::DatabaseError;
use crate::types::{ArchiveId, DownloadStatus};
use crate::{Error, Result};

use super::{Database, DownloadState};

impl Database {
    /// Create the download state of a catalog entry
    ///
    /// Fails if the entry already has one.
    pub async fn insert_download_state(&self, id: &ArchiveId, status: DownloadStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO download_states (catalog_entry_id, state, total_bytes_written, created_at)
            VALUES (?, ?, 0, ?)
            "#,
        )
        .bind(id)
        .bind(status.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download state for {}: {}",
                id, e
            )))
        })?;

        Ok(())
    }

    /// Get the download state of a catalog entry
    pub async fn get_download_state(&self, id: &ArchiveId) -> Result<Option<DownloadState>> {
        let row = sqlx::query_as::<_, DownloadState>(
            r#"
            SELECT catalog_entry_id, state, total_bytes_written, created_at
            FROM download_states
            WHERE catalog_entry_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download state: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all download states, oldest first
    pub async fn list_download_states(&self) -> Result<Vec<DownloadState>> {
        let rows = sqlx::query_as::<_, DownloadState>(
            r#"
            SELECT catalog_entry_id, state, total_bytes_written, created_at
            FROM download_states
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list download states: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update the status of a download state
    pub async fn update_download_status(&self, id: &ArchiveId, status: DownloadStatus) -> Result<()> {
        sqlx::query("UPDATE download_states SET state = ? WHERE catalog_entry_id = ?")
            .bind(status.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update download status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Persist the number of bytes written so far
    pub async fn update_bytes_written(&self, id: &ArchiveId, bytes: u64) -> Result<()> {
        sqlx::query("UPDATE download_states SET total_bytes_written = ? WHERE catalog_entry_id = ?")
            .bind(bytes as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update bytes written: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update status and bytes written together
    pub async fn update_download_state(
        &self,
        id: &ArchiveId,
        status: DownloadStatus,
        bytes: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE download_states SET state = ?, total_bytes_written = ? WHERE catalog_entry_id = ?",
        )
        .bind(status.to_i32())
        .bind(bytes as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download state: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Delete the download state of a catalog entry
    ///
    /// Returns false when there was none.
    pub async fn delete_download_state(&self, id: &ArchiveId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM download_states WHERE catalog_entry_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download state: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
