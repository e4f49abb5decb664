// serptrace-core/src/model/search_result.rs
// ============================================================================
// Module: Search Result Entity
// ============================================================================

//! A single ranked result collected from one engine for one benchmark query.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CrawlRunId;
use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::SearchResultId;

/// A persisted search result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Primary key.
    pub id: SearchResultId,
    /// Crawl run this result belongs to, when known.
    pub crawl_run_id: Option<CrawlRunId>,
    /// Benchmark query this result was collected for.
    pub query_id: QueryId,
    /// Engine that produced this result.
    pub engine: EngineId,
    /// Zero-based rank within the engine's result page.
    pub rank: u32,
    /// Result title.
    pub title: String,
    /// Result snippet, when present.
    pub snippet: Option<String>,
    /// Original URL as returned by the engine.
    pub url: String,
    /// Normalized URL used for cross-engine comparison.
    pub normalized_url: String,
    /// Hostname extracted from `url` (or `normalized_url`).
    pub domain: String,
    /// Instant the engine reported (or collection time, when absent).
    pub timestamp: DateTime<Utc>,
    /// Content hash used for deduplication, `sha256(url|title|snippet|timestamp)`.
    pub hash: String,
    /// Path to the archived raw HTML for this result, when retained.
    pub raw_html_path: Option<String>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::insert_search_results`].
///
/// Distinct from [`SearchResult`] because callers supply results before
/// `created_at`/`updated_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultInput {
    /// Primary key; callers generate this up front so crawl-run linkage is
    /// stable across retries.
    pub id: SearchResultId,
    /// Crawl run this result belongs to, when known.
    pub crawl_run_id: Option<CrawlRunId>,
    /// Benchmark query this result was collected for.
    pub query_id: QueryId,
    /// Engine that produced this result.
    pub engine: EngineId,
    /// Zero-based rank within the engine's result page.
    pub rank: u32,
    /// Result title.
    pub title: String,
    /// Result snippet, when present.
    pub snippet: Option<String>,
    /// Original URL as returned by the engine.
    pub url: String,
    /// Normalized URL used for cross-engine comparison.
    pub normalized_url: String,
    /// Hostname extracted from `url` (or `normalized_url`).
    pub domain: String,
    /// Instant the engine reported (or collection time, when absent).
    pub timestamp: DateTime<Utc>,
    /// Content hash used for deduplication.
    pub hash: String,
    /// Path to the archived raw HTML for this result, when retained.
    pub raw_html_path: Option<String>,
}

impl SearchResultInput {
    /// The deduplication key: `(query_id, engine, url)`.
    #[must_use]
    pub fn dedupe_key(&self) -> (String, String, String) {
        (
            self.query_id.as_str().to_owned(),
            self.engine.as_str().to_owned(),
            self.url.clone(),
        )
    }
}
