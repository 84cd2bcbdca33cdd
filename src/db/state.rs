//! Runtime state tracking: shutdown detection, recent searches, catalog refresh time.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

const CLEAN_SHUTDOWN_KEY: &str = "clean_shutdown";
const RECENT_SEARCHES_KEY: &str = "recent_search_terms";
const LAST_CATALOG_REFRESH_KEY: &str = "last_catalog_refresh";

impl Database {
    /// Read a runtime value
    pub async fn get_runtime_value(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to read runtime state {}: {}",
                        key, e
                    )))
                })?;

        Ok(value)
    }

    /// Write a runtime value
    pub async fn set_runtime_value(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write runtime state {}: {}",
                key, e
            )))
        })?;

        Ok(())
    }

    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session did not call set_clean_shutdown(),
    /// indicating a crash or forced termination.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value = self.get_runtime_value(CLEAN_SHUTDOWN_KEY).await?;

        // If the value is missing or "false", it was an unclean shutdown
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the library has started
    ///
    /// If shutdown() is not called before the next startup,
    /// was_unclean_shutdown() will return true.
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "false").await
    }

    /// Mark that the library is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "true").await
    }

    /// Recent search terms, most recent first
    pub async fn recent_search_terms(&self) -> Result<Vec<String>> {
        match self.get_runtime_value(RECENT_SEARCHES_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Push a term to the front of the recent search list
    ///
    /// An existing identical term moves to the front instead of repeating, and
    /// the list is capped at `max_terms`.
    pub async fn record_search_term(&self, term: &str, max_terms: usize) -> Result<Vec<String>> {
        let mut terms = self.recent_search_terms().await?;
        terms.retain(|t| t != term);
        terms.insert(0, term.to_string());
        terms.truncate(max_terms);

        let json = serde_json::to_string(&terms)?;
        self.set_runtime_value(RECENT_SEARCHES_KEY, &json).await?;

        Ok(terms)
    }

    /// Forget all recent search terms
    pub async fn clear_recent_search_terms(&self) -> Result<()> {
        self.set_runtime_value(RECENT_SEARCHES_KEY, "[]").await
    }

    /// When the remote catalog was last refreshed successfully
    pub async fn last_catalog_refresh(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let Some(value) = self.get_runtime_value(LAST_CATALOG_REFRESH_KEY).await? else {
            return Ok(None);
        };

        let parsed = chrono::DateTime::parse_from_rfc3339(&value).map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Invalid catalog refresh timestamp {}: {}",
                value, e
            )))
        })?;

        Ok(Some(parsed.with_timezone(&chrono::Utc)))
    }

    /// Record a successful catalog refresh
    pub async fn set_last_catalog_refresh(&self, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.set_runtime_value(LAST_CATALOG_REFRESH_KEY, &at.to_rfc3339())
            .await
    }
}
