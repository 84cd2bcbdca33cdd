//! Language records referenced by catalog entries.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, Language};

impl Database {
    /// Fetch or create a language record
    ///
    /// The code is stored lower-case. An existing record keeps its name unless it
    /// had none.
    pub async fn ensure_language(&self, code: &str, name: Option<&str>) -> Result<Language> {
        let code = code.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO languages (code, name) VALUES (?, ?)
            ON CONFLICT(code) DO UPDATE SET name = COALESCE(languages.name, excluded.name)
            "#,
        )
        .bind(&code)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to ensure language {}: {}",
                code, e
            )))
        })?;

        let language =
            sqlx::query_as::<_, Language>("SELECT code, name FROM languages WHERE code = ?")
                .bind(&code)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to fetch language {}: {}",
                        code, e
                    )))
                })?;

        Ok(language)
    }

    /// List all languages ordered by code
    pub async fn list_languages(&self) -> Result<Vec<Language>> {
        let rows = sqlx::query_as::<_, Language>("SELECT code, name FROM languages ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list languages: {}",
                    e
                )))
            })?;

        Ok(rows)
    }
}
