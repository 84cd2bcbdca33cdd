//! Remote catalog refresh
//!
//! The catalog document lists every archive available for download. Parsing
//! the document format is delegated to a [`CatalogParser`]; this module fetches
//! the bytes, normalizes each record and reconciles the catalog table.

use crate::config::RetryConfig;
use crate::db::{Database, NewCatalogEntry};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::types::{ArchiveId, ArchiveMetadata, LocalState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One archive as described by the remote catalog
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogRecord {
    /// Archive id
    pub id: String,
    /// Display title
    pub title: String,
    /// Content creator
    pub creator: Option<String>,
    /// Publisher
    pub publisher: Option<String>,
    /// Short description
    pub description: Option<String>,
    /// Language code, any case
    pub language: Option<String>,
    /// Number of articles
    pub article_count: u64,
    /// Number of media entries
    pub media_count: u64,
    /// Archive size in KiB
    pub size: u64,
    /// Favicon image bytes
    pub favicon: Option<Vec<u8>>,
    /// Publication date (YYYY-MM-DD)
    pub date: Option<String>,
    /// Metalink (or direct) download url
    pub url: Option<String>,
}

impl CatalogRecord {
    /// Catalog entry for this record, before the language is resolved
    pub fn to_entry(&self) -> NewCatalogEntry {
        let date = self
            .date
            .as_deref()
            .filter(|date| chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
            .map(str::to_string);

        NewCatalogEntry {
            id: ArchiveId::new(self.id.clone()),
            metadata: ArchiveMetadata {
                title: self.title.clone(),
                creator: self.creator.clone(),
                publisher: self.publisher.clone(),
                description: self.description.clone(),
                language_code: self.language.as_deref().map(normalize_language_code),
                article_count: self.article_count,
                media_count: self.media_count,
                file_size: self.size.saturating_mul(1024),
                favicon: self.favicon.clone(),
                date,
            },
            url: self.url.as_deref().map(download_url),
            local_state: LocalState::Remote,
            include_in_search: true,
            has_index: false,
            has_pictures: !self.url.as_deref().is_some_and(|url| url.contains("nopic")),
        }
    }
}

/// Parses a catalog document into records
pub trait CatalogParser: Send + Sync {
    /// Parse the raw document
    fn parse(&self, document: &[u8]) -> Result<Vec<CatalogRecord>>;
}

/// Parser for catalogs published as a JSON array of [`CatalogRecord`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCatalogParser;

impl CatalogParser for JsonCatalogParser {
    fn parse(&self, document: &[u8]) -> Result<Vec<CatalogRecord>> {
        Ok(serde_json::from_slice(document)?)
    }
}

/// Outcome of a catalog refresh
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CatalogRefresh {
    /// Entries inserted
    pub added: usize,
    /// Remote-only entries deleted
    pub removed: usize,
}

/// Download url of a catalog url
///
/// Metalink urls (`.meta4`) point next to the archive itself; the suffix is
/// dropped and the scheme forced to https.
pub fn download_url(url: &str) -> String {
    let stripped = url.replace(".meta4", "");
    match url::Url::parse(&stripped) {
        Ok(mut parsed) => {
            if parsed.scheme() != "https" && parsed.set_scheme("https").is_err() {
                return stripped;
            }
            parsed.to_string()
        }
        Err(_) => stripped,
    }
}

/// Lower-case, trimmed language code
pub fn normalize_language_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Fetches the remote catalog and applies it to the database
pub struct CatalogRefresher {
    http_client: reqwest::Client,
    db: Arc<Database>,
    retry: RetryConfig,
}

impl CatalogRefresher {
    /// Create a refresher
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(db: Arc<Database>, retry: RetryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent(concat!("zimkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            db,
            retry,
        })
    }

    /// Fetch the catalog document, retrying transient failures
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "Fetching catalog");
        let bytes = fetch_with_retry(&self.retry, || {
            let request = self.http_client.get(url);
            async move {
                let response = request.send().await?;
                let body = response.error_for_status()?.bytes().await?;
                Ok::<_, Error>(body)
            }
        })
        .await?;
        Ok(bytes.to_vec())
    }

    /// Fetch, parse and apply the catalog at `url`
    pub async fn refresh(&self, url: &str, parser: &dyn CatalogParser) -> Result<CatalogRefresh> {
        let document = self.fetch(url).await?;
        let records = parser.parse(&document)?;
        self.apply(&records).await
    }

    /// Reconcile the catalog table with `records`
    ///
    /// New ids are inserted and existing entries are left untouched. Entries
    /// missing from `records` are deleted only while they are remote; archives
    /// on disk or in transfer are kept.
    pub async fn apply(&self, records: &[CatalogRecord]) -> Result<CatalogRefresh> {
        let known: HashSet<ArchiveId> = self.db.catalog_entry_ids().await?.into_iter().collect();
        let mut listed = HashSet::new();
        let mut refresh = CatalogRefresh::default();

        for record in records {
            if record.id.is_empty() {
                warn!(title = %record.title, "Skipping catalog record without id");
                continue;
            }
            let mut entry = record.to_entry();
            listed.insert(entry.id.clone());
            if known.contains(&entry.id) {
                continue;
            }

            if let Some(code) = entry.metadata.language_code.take() {
                let language = self.db.ensure_language(&code, None).await?;
                entry.metadata.language_code = Some(language.code);
            }
            self.db.insert_catalog_entry(&entry).await?;
            refresh.added += 1;
        }

        for id in known.difference(&listed) {
            let Some(entry) = self.db.get_catalog_entry(id).await? else {
                continue;
            };
            if entry.local_state() == LocalState::Remote && self.db.delete_catalog_entry(id).await? {
                refresh.removed += 1;
            }
        }

        self.db.set_last_catalog_refresh(chrono::Utc::now()).await?;
        info!(
            added = refresh.added,
            removed = refresh.removed,
            "Catalog refreshed"
        );
        Ok(refresh)
    }
}
