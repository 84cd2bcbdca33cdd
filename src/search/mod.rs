//! Multi-archive search
//!
//! [`SearchCoordinator`] runs one query against every eligible open archive
//! concurrently and merges the hits. Only one search is live per coordinator:
//! starting a new one cancels the previous one, whose caller receives `None`.
//!
//! A search never reads the handle map while a rescan mutates it; it waits for
//! [`ArchiveRegistry::wait_for_idle`] first.

mod merge;

pub use merge::{compare_results, merge_results, union_by_path};

use crate::db::Database;
use crate::engine::ArchiveHandle;
use crate::error::Result;
use crate::registry::ArchiveRegistry;
use crate::types::{ArchiveId, SearchResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identifies one started search
#[derive(Debug, Clone)]
struct Ticket {
    id: u64,
    cancel: CancellationToken,
}

/// Fans a query out to all searchable archives (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct SearchCoordinator {
    registry: ArchiveRegistry,
    db: Arc<Database>,
    max_recent_searches: usize,
    current: Arc<Mutex<Option<Ticket>>>,
    next_id: Arc<AtomicU64>,
}

impl SearchCoordinator {
    /// Create a coordinator over `registry`
    pub fn new(registry: ArchiveRegistry, db: Arc<Database>, max_recent_searches: usize) -> Self {
        Self {
            registry,
            db,
            max_recent_searches,
            current: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Ticket>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a new search the live one, cancelling its predecessor
    fn begin(&self) -> Ticket {
        let ticket = Ticket {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            cancel: CancellationToken::new(),
        };
        if let Some(previous) = self.current().replace(ticket.clone()) {
            debug!(search = previous.id, "Superseding search");
            previous.cancel.cancel();
        }
        ticket
    }

    /// Retire `ticket`; results survive only if it is still the live search
    fn finish(
        &self,
        ticket: &Ticket,
        results: Option<Vec<SearchResult>>,
    ) -> Option<Vec<SearchResult>> {
        let mut current = self.current();
        if current.as_ref().is_some_and(|live| live.id == ticket.id) {
            *current = None;
        }
        if ticket.cancel.is_cancelled() {
            None
        } else {
            results
        }
    }

    /// Search all archives included in search
    ///
    /// Returns `None` when the search was cancelled or superseded before it
    /// completed. An empty term yields an empty list.
    pub async fn search(&self, term: &str) -> Option<Vec<SearchResult>> {
        let ticket = self.begin();
        self.execute(ticket, term.to_string()).await
    }

    /// Start a search in the background and hand the outcome to `on_complete`
    ///
    /// The search becomes live immediately, so two back-to-back calls always
    /// supersede in call order. A superseded search completes with `None`.
    pub fn spawn_search<F>(&self, term: impl Into<String>, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<Vec<SearchResult>>) + Send + 'static,
    {
        let ticket = self.begin();
        let coordinator = self.clone();
        let term = term.into();
        tokio::spawn(async move {
            let results = coordinator.execute(ticket, term).await;
            on_complete(results);
        })
    }

    /// Cancel the live search, if any
    pub fn cancel(&self) {
        if let Some(ticket) = self.current().take() {
            debug!(search = ticket.id, "Cancelling search");
            ticket.cancel.cancel();
        }
    }

    /// Recently issued terms, most recent first
    pub async fn recent_searches(&self) -> Result<Vec<String>> {
        self.db.recent_search_terms().await
    }

    /// Forget the recent terms
    pub async fn clear_recent_searches(&self) -> Result<()> {
        self.db.clear_recent_search_terms().await
    }

    async fn execute(&self, ticket: Ticket, term: String) -> Option<Vec<SearchResult>> {
        let term = term.trim();
        if term.is_empty() {
            return self.finish(&ticket, Some(Vec::new()));
        }

        if let Err(e) = self
            .db
            .record_search_term(term, self.max_recent_searches)
            .await
        {
            warn!(error = %e, "Failed to record search term");
        }

        let results = tokio::select! {
            _ = ticket.cancel.cancelled() => None,
            results = self.fan_out(term, &ticket.cancel) => Some(results),
        };

        self.finish(&ticket, results)
    }

    async fn fan_out(&self, term: &str, cancel: &CancellationToken) -> Vec<SearchResult> {
        let state = self.registry.wait_for_idle().await;

        let excluded: HashSet<ArchiveId> = match self.db.search_excluded_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read search exclusions, searching all archives");
                HashSet::new()
            }
        };

        let handles: Vec<Arc<dyn ArchiveHandle>> = self
            .registry
            .handles()
            .await
            .into_iter()
            .filter(|handle| !excluded.contains(&handle.id()))
            .collect();

        debug!(
            term,
            generation = state.generation,
            archives = handles.len(),
            "Searching archives"
        );

        let term = term.to_lowercase();
        let mut tasks = JoinSet::new();
        for handle in handles {
            let term = term.clone();
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || search_archive(handle.as_ref(), &term, &cancel));
        }

        let mut per_archive = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(results)) => per_archive.push(results),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Archive search task failed"),
            }
        }

        merge_results(per_archive)
    }
}

/// Query one archive; `None` when cancelled before finishing
fn search_archive(
    handle: &dyn ArchiveHandle,
    term: &str,
    cancel: &CancellationToken,
) -> Option<Vec<SearchResult>> {
    let id = handle.id();
    if cancel.is_cancelled() {
        return None;
    }

    let title_hits = handle.title_suggestions(term).unwrap_or_else(|e| {
        warn!(archive_id = %id, error = %e, "Title suggestion query failed");
        Vec::new()
    });
    if cancel.is_cancelled() {
        return None;
    }

    let full_text_hits = if handle.has_index() {
        handle.search(term).unwrap_or_else(|e| {
            warn!(archive_id = %id, error = %e, "Full-text query failed");
            Vec::new()
        })
    } else {
        Vec::new()
    };
    if cancel.is_cancelled() {
        return None;
    }

    Some(union_by_path(&id, title_hits, full_text_hits))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
