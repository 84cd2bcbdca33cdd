//! Article bookmarks and reading history.
//!
//! Articles are keyed by their `zim://` url and belong to one catalog entry;
//! deleting the entry deletes its articles.

use crate::error::DatabaseError;
use crate::types::ArchiveId;
use crate::{Error, Result};

use super::{Article, Database, NewArticle};

const ARTICLE_COLUMNS: &str = r#"
    url, catalog_entry_id, title, is_main_page, is_bookmarked,
    bookmark_date, last_read_date, last_position, created_at
"#;

impl Database {
    /// Record an article, or refresh the title and owner of a known one
    ///
    /// Bookmark and reading state of a known article are kept.
    pub async fn add_or_update_article(&self, article: &NewArticle) -> Result<Article> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO articles (url, catalog_entry_id, title, is_main_page, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                catalog_entry_id = excluded.catalog_entry_id,
                title = excluded.title,
                is_main_page = excluded.is_main_page
            "#,
        )
        .bind(&article.url)
        .bind(&article.catalog_entry_id)
        .bind(&article.title)
        .bind(article.is_main_page)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record article {}: {}",
                article.url, e
            )))
        })?;

        self.get_article(&article.url).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "Article {} vanished after insert",
                article.url
            )))
        })
    }

    /// Article stored under `url`
    pub async fn get_article(&self, url: &str) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {} FROM articles WHERE url = ?",
            ARTICLE_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get article {}: {}",
                url, e
            )))
        })?;

        Ok(article)
    }

    /// Bookmark or unbookmark `url`
    ///
    /// Bookmarking stamps the bookmark date; unbookmarking clears it.
    /// Returns false when the article is unknown.
    pub async fn set_article_bookmarked(&self, url: &str, bookmarked: bool) -> Result<bool> {
        let bookmark_date = bookmarked.then(|| chrono::Utc::now().timestamp());

        let result = sqlx::query(
            "UPDATE articles SET is_bookmarked = ?, bookmark_date = ? WHERE url = ?",
        )
        .bind(bookmarked)
        .bind(bookmark_date)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update bookmark of {}: {}",
                url, e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Remember that `url` was read up to `position` (0.0 to 1.0)
    ///
    /// Returns false when the article is unknown.
    pub async fn record_article_read(&self, url: &str, position: f64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE articles SET last_read_date = ?, last_position = ? WHERE url = ?",
        )
        .bind(now)
        .bind(position.clamp(0.0, 1.0))
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record reading of {}: {}",
                url, e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Bookmarked articles, newest bookmark first, ties by title
    pub async fn recent_bookmarks(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {} FROM articles
            WHERE is_bookmarked = 1
            ORDER BY bookmark_date DESC, title ASC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list bookmarks: {}",
                e
            )))
        })?;

        Ok(articles)
    }

    /// Articles read so far, most recently read first
    pub async fn reading_history(&self, limit: u32) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {} FROM articles
            WHERE last_read_date IS NOT NULL
            ORDER BY last_read_date DESC, title ASC
            LIMIT ?
            "#,
            ARTICLE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list reading history: {}",
                e
            )))
        })?;

        Ok(articles)
    }

    /// Articles recorded for one archive
    pub async fn list_articles_for(&self, id: &ArchiveId) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            "SELECT {} FROM articles WHERE catalog_entry_id = ? ORDER BY title ASC",
            ARTICLE_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list articles of {}: {}",
                id, e
            )))
        })?;

        Ok(articles)
    }

    /// Forget the reading position of every article; bookmarks are kept
    pub async fn clear_reading_history(&self) -> Result<()> {
        sqlx::query("UPDATE articles SET last_read_date = NULL, last_position = 0")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear reading history: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
