//! Per-archive union and cross-archive ordering of search hits.

use crate::engine::ArchiveHit;
use crate::types::{ArchiveId, SearchResult};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Union of one archive's title suggestions and full-text hits, keyed by path
///
/// A title suggestion wins over a full-text hit for the same path.
pub fn union_by_path(
    archive_id: &ArchiveId,
    title_hits: Vec<ArchiveHit>,
    full_text_hits: Vec<ArchiveHit>,
) -> Vec<SearchResult> {
    let mut by_path: HashMap<String, ArchiveHit> = HashMap::new();
    for hit in full_text_hits {
        by_path.insert(hit.path.clone(), hit);
    }
    for hit in title_hits {
        by_path.insert(hit.path.clone(), hit);
    }

    by_path
        .into_values()
        .map(|hit| SearchResult {
            archive_id: archive_id.clone(),
            title: hit.title,
            path: hit.path,
            snippet: hit.snippet,
            score: hit.score,
        })
        .collect()
}

/// Result order: lower score first, then snippet-bearing, then title
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| b.snippet.is_some().cmp(&a.snippet.is_some()))
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
}

/// Merge per-archive result sets into one sorted list
pub fn merge_results(per_archive: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = per_archive.into_iter().flatten().collect();
    merged.sort_by(compare_results);
    merged
}
