// serptrace-ingestion/src/ingest.rs
// ============================================================================
// Module: Collector JSON Ingestion
// Description: Normalize heterogeneous engine JSON into SearchResult and
//              CrawlRun rows and commit them atomically.
// Purpose: Turn whatever the (external) collector wrote to disk into a
//          deduplicated, storage-ready batch.
// Dependencies: serptrace-core, serde_json, chrono, url, tokio, tracing
// ============================================================================

//! ## Overview
//! The collector app (out of scope here) writes one or more `*.json` files
//! into a directory, each a JSON array of loosely-typed result objects. This
//! module reads every file, drops malformed items, derives missing fields,
//! reconstructs one [`CrawlRunInput`] per `(query_id, engine)` pair, and
//! deduplicates results by `(query_id, engine, url)` before handing the
//! batch to [`Storage`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;
use serptrace_core::StoreResult;
use serptrace_core::hashing;
use serptrace_core::identifiers::CrawlRunId;
use serptrace_core::identifiers::EngineId;
use serptrace_core::identifiers::QueryId;
use serptrace_core::identifiers::RunId;
use serptrace_core::identifiers::SearchResultId;
use serptrace_core::model::CrawlRunInput;
use serptrace_core::model::CrawlRunStatus;
use serptrace_core::model::SearchResultInput;
use serptrace_core::storage::Storage;

use crate::error::IngestionError;

// ============================================================================
// SECTION: Request / Summary
// ============================================================================

/// Inputs to [`ingest_directory`].
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Directory to scan for `*.json` collector output files.
    pub directory: PathBuf,
    /// Pipeline run this ingestion pass belongs to; flows through as
    /// `CrawlRun::batch_id`.
    pub run_id: RunId,
    /// Collector output directory used to synthesize `raw_html_path` when a
    /// record omits one.
    pub collector_output_dir: String,
}

/// Summary returned by [`ingest_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Number of search results actually persisted, after dedupe.
    pub ingested_results: u64,
    /// Number of distinct crawl runs reconstructed.
    pub runs: u64,
    /// Count of records sharing a `(query_id, hash)` key with an earlier one.
    pub hash_duplicate_count: u64,
    /// Count of records sharing a `url` with an earlier one.
    pub url_duplicate_count: u64,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Reads every `*.json` file under `request.directory`, normalizes and
/// deduplicates the contained records, and persists crawl runs followed by
/// search results.
///
/// # Errors
///
/// Returns [`IngestionError::DirectoryRead`] if the directory itself cannot
/// be listed, or [`IngestionError::Storage`] if persistence fails. Malformed
/// individual files or records are logged and skipped, never surfaced as an
/// error.
pub async fn ingest_directory(storage: &dyn Storage, request: &IngestRequest) -> Result<IngestSummary, IngestionError> {
    let files = list_json_files(&request.directory).await?;
    if files.is_empty() {
        tracing::warn!(directory = %request.directory.display(), "no collector JSON files found");
        return Ok(IngestSummary::default());
    }

    let mut crawl_runs: HashMap<(String, String), CrawlRunInput> = HashMap::new();
    let mut results: Vec<SearchResultInput> = Vec::new();
    let mut seen_hash_keys: HashMap<(String, String), u32> = HashMap::new();
    let mut seen_urls: HashMap<String, u32> = HashMap::new();
    let mut hash_duplicate_count: u64 = 0;
    let mut url_duplicate_count: u64 = 0;

    for path in &files {
        let items = match read_json_array(path).await {
            Some(items) => items,
            None => continue,
        };
        for item in items {
            let Some(item) = item.as_object() else {
                continue;
            };
            let Some(record) = normalize_record(item) else {
                continue;
            };

            let hash_key = (record.query_id.clone(), record.hash.clone());
            let hash_count = seen_hash_keys.entry(hash_key).or_insert(0);
            *hash_count += 1;
            if *hash_count > 1 {
                hash_duplicate_count += 1;
            }
            let url_count = seen_urls.entry(record.url.clone()).or_insert(0);
            *url_count += 1;
            if *url_count > 1 {
                url_duplicate_count += 1;
            }

            upsert_crawl_run(&mut crawl_runs, &request.run_id, &record);
            results.push(record.into_search_result_input(&request.collector_output_dir));
        }
    }

    let mut deduped: HashMap<(String, String, String), SearchResultInput> = HashMap::new();
    for result in results {
        deduped.insert(result.dedupe_key(), result);
    }
    let results: Vec<SearchResultInput> = deduped.into_values().collect();
    let runs: Vec<CrawlRunInput> = crawl_runs.into_values().collect();

    persist(storage, &runs, &results).await?;

    Ok(IngestSummary {
        ingested_results: u64::try_from(results.len()).unwrap_or(u64::MAX),
        runs: u64::try_from(runs.len()).unwrap_or(u64::MAX),
        hash_duplicate_count,
        url_duplicate_count,
    })
}

async fn persist(storage: &dyn Storage, runs: &[CrawlRunInput], results: &[SearchResultInput]) -> StoreResult<()> {
    storage.record_crawl_runs(runs).await?;
    storage.insert_search_results(results).await?;
    Ok(())
}

// ============================================================================
// SECTION: Directory Listing
// ============================================================================

async fn list_json_files(directory: &Path) -> Result<Vec<PathBuf>, IngestionError> {
    let mut entries = tokio::fs::read_dir(directory).await.map_err(|source| IngestionError::DirectoryRead {
        path: directory.display().to_string(),
        source,
    })?;

    let mut files = Vec::new();
    loop {
        let next = entries.next_entry().await.map_err(|source| IngestionError::DirectoryRead {
            path: directory.display().to_string(),
            source,
        })?;
        let Some(entry) = next else {
            break;
        };
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn read_json_array(path: &Path) -> Option<Vec<Value>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not read collector file");
            return None;
        }
    };
    let parsed: Value = match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "collector file is not valid JSON");
            return None;
        }
    };
    match parsed {
        Value::Array(items) => Some(items),
        _ => {
            tracing::warn!(path = %path.display(), "collector file is not a top-level JSON array");
            None
        }
    }
}

// ============================================================================
// SECTION: Record Normalization
// ============================================================================

/// A normalized collector record, prior to raw-HTML-path synthesis.
struct NormalizedRecord {
    id: SearchResultId,
    crawl_run_id: Option<CrawlRunId>,
    query_id: String,
    engine: String,
    rank: u32,
    title: String,
    snippet: String,
    url: String,
    normalized_url: String,
    domain: String,
    timestamp: DateTime<Utc>,
    hash: String,
    raw_html_path: Option<String>,
}

impl NormalizedRecord {
    fn into_search_result_input(self, collector_output_dir: &str) -> SearchResultInput {
        let raw_html_path = match self.raw_html_path {
            Some(path) => path,
            None => format!("{collector_output_dir}/raw_html/{}-{}.html", self.engine, self.query_id),
        };
        SearchResultInput {
            id: self.id,
            crawl_run_id: self.crawl_run_id,
            query_id: QueryId::new(self.query_id),
            engine: EngineId::new(self.engine),
            rank: self.rank,
            title: self.title,
            snippet: if self.snippet.is_empty() { None } else { Some(self.snippet) },
            url: self.url,
            normalized_url: self.normalized_url,
            domain: self.domain,
            timestamp: self.timestamp,
            hash: self.hash,
            raw_html_path: Some(raw_html_path),
        }
    }
}

fn normalize_record(item: &serde_json::Map<String, Value>) -> Option<NormalizedRecord> {
    let query_id = non_empty_str(item, "query_id")?;
    let engine = non_empty_str(item, "engine")?;
    let url = non_empty_str(item, "url")?;
    let title = non_empty_str(item, "title").unwrap_or_else(|| url.clone());

    let rank = item
        .get("rank")
        .and_then(parse_rank)
        .unwrap_or(0);
    let snippet = item.get("snippet").and_then(Value::as_str).unwrap_or_default().to_owned();
    let normalized_url = item.get("normalized_url").and_then(Value::as_str).filter(|s| !s.is_empty()).map_or_else(|| url.clone(), ToOwned::to_owned);
    let domain = derive_domain(item, &url);
    let timestamp = item.get("timestamp").and_then(Value::as_str).and_then(parse_timestamp).unwrap_or_else(Utc::now);
    let timestamp_iso = timestamp.to_rfc3339();
    let hash = item
        .get("hash")
        .and_then(Value::as_str)
        .filter(|candidate| hashing::is_valid_sha256_hex(candidate))
        .map_or_else(|| hashing::content_hash(&url, &title, &snippet, &timestamp_iso), ToOwned::to_owned);
    let raw_html_path = item.get("raw_html_path").and_then(Value::as_str).map(ToOwned::to_owned);
    let crawl_run_id = item.get("crawl_run_id").and_then(Value::as_str).map(CrawlRunId::new);
    let id = item.get("id").and_then(Value::as_str).map_or_else(SearchResultId::generate, SearchResultId::new);

    Some(NormalizedRecord {
        id,
        crawl_run_id,
        query_id,
        engine,
        rank,
        title,
        snippet,
        url,
        normalized_url,
        domain,
        timestamp,
        hash,
        raw_html_path,
    })
}

fn non_empty_str(item: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(ToOwned::to_owned)
}

fn parse_rank(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value.as_str().and_then(parse_leading_int)
}

/// Parses a leading integer prefix the way JavaScript's `parseInt(raw, 10)`
/// does: skip leading whitespace, take an optional sign immediately followed
/// by digits, and stop at the first non-digit. `"1abc"` and `"1.5"` both
/// yield `1`; a bare `"+"`/`"-"` or anything not starting with a sign or
/// digit yields `None` (`parseInt`'s `NaN`).
fn parse_leading_int(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let rest = trimmed.strip_prefix('+').or_else(|| trimmed.strip_prefix('-')).unwrap_or(trimmed);
    let is_negative = trimmed.starts_with('-');
    let digit_count = rest.chars().take_while(char::is_ascii_digit).count();
    if digit_count == 0 {
        return None;
    }
    let magnitude = rest[..digit_count].parse::<u32>().ok()?;
    if is_negative && magnitude != 0 { None } else { Some(magnitude) }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.with_timezone(&Utc))
}

fn derive_domain(item: &serde_json::Map<String, Value>, url: &str) -> String {
    if let Some(domain) = item.get("domain").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        return domain.to_owned();
    }
    url::Url::parse(url).ok().and_then(|parsed| parsed.host_str().map(ToOwned::to_owned)).unwrap_or_else(|| url.to_owned())
}

// ============================================================================
// SECTION: Crawl Run Reconstruction
// ============================================================================

fn upsert_crawl_run(map: &mut HashMap<(String, String), CrawlRunInput>, run_id: &RunId, record: &NormalizedRecord) {
    let key = (record.query_id.clone(), record.engine.clone());
    match map.entry(key) {
        Entry::Occupied(mut occupied) => {
            let run = occupied.get_mut();
            run.result_count += 1;
            if record.timestamp > run.completed_at.unwrap_or(run.started_at) {
                run.completed_at = Some(record.timestamp);
            }
        }
        Entry::Vacant(vacant) => {
            let id = record.crawl_run_id.clone().unwrap_or_else(CrawlRunId::generate);
            vacant.insert(CrawlRunInput {
                id,
                batch_id: run_id.clone(),
                query_id: QueryId::new(record.query_id.clone()),
                engine: EngineId::new(record.engine.clone()),
                status: CrawlRunStatus::Completed,
                started_at: record.timestamp,
                completed_at: Some(record.timestamp),
                error: None,
                result_count: 1,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serptrace_core::InMemoryStore;
    use serptrace_core::storage::PendingAnnotationsFilter;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).expect("create collector file");
        file.write_all(contents.as_bytes()).expect("write collector file");
    }

    #[test]
    fn parse_rank_takes_leading_digits_like_parse_int() {
        assert_eq!(parse_leading_int("1abc"), Some(1));
        assert_eq!(parse_leading_int("1.5"), Some(1));
        assert_eq!(parse_leading_int("42"), Some(42));
        assert_eq!(parse_leading_int("  7"), Some(7));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_directory_entries_yield_zero_summary() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = InMemoryStore::new();
        let request = IngestRequest {
            directory: dir.path().to_path_buf(),
            run_id: RunId::generate(),
            collector_output_dir: "data/serp".to_owned(),
        };
        let summary = ingest_directory(&store, &request).await.expect("ingest");
        assert_eq!(summary, IngestSummary::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ingests_and_dedupes_across_files() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        write_file(
            &dir,
            "a.json",
            r#"[
                {"query_id": "q1", "engine": "google", "url": "https://a.example/1", "title": "A", "rank": 0, "timestamp": "2026-01-01T00:00:00Z"},
                {"query_id": "q1", "engine": "google", "url": "https://a.example/2", "title": "B", "rank": "1", "timestamp": "2026-01-01T00:01:00Z"}
            ]"#,
        );
        write_file(
            &dir,
            "b.json",
            r#"[
                {"query_id": "q1", "engine": "google", "url": "https://a.example/1", "title": "A updated", "rank": 0, "timestamp": "2026-01-01T00:02:00Z"}
            ]"#,
        );

        let store = InMemoryStore::new();
        let request = IngestRequest {
            directory: dir.path().to_path_buf(),
            run_id: RunId::generate(),
            collector_output_dir: "data/serp".to_owned(),
        };
        let summary = ingest_directory(&store, &request).await.expect("ingest");

        assert_eq!(summary.ingested_results, 2);
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.url_duplicate_count, 1);

        let pending = store.fetch_pending_annotations(&PendingAnnotationsFilter::default()).await.expect("fetch");
        assert_eq!(pending.len(), 2);
        let updated = pending.iter().find(|r| r.url == "https://a.example/1").expect("updated row present");
        assert_eq!(updated.title, "A updated");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drops_records_missing_required_fields() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        write_file(
            &dir,
            "a.json",
            r#"[
                {"engine": "google", "url": "https://a.example/1", "title": "missing query_id"},
                {"query_id": "q1", "engine": "google", "url": "https://a.example/2"}
            ]"#,
        );

        let store = InMemoryStore::new();
        let request = IngestRequest {
            directory: dir.path().to_path_buf(),
            run_id: RunId::generate(),
            collector_output_dir: "data/serp".to_owned(),
        };
        let summary = ingest_directory(&store, &request).await.expect("ingest");
        assert_eq!(summary.ingested_results, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_array_files_are_skipped() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        write_file(&dir, "a.json", r#"{"not": "an array"}"#);

        let store = InMemoryStore::new();
        let request = IngestRequest {
            directory: dir.path().to_path_buf(),
            run_id: RunId::generate(),
            collector_output_dir: "data/serp".to_owned(),
        };
        let summary = ingest_directory(&store, &request).await.expect("ingest");
        assert_eq!(summary, IngestSummary::default());
    }
}
