// serptrace-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Validate SQLite Storage behavior against the shared contract.
// Dependencies: serptrace-store-sqlite, serptrace-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! Conformance tests for the SQLite-backed [`Storage`] implementation:
//! schema bootstrap, idempotent upsert semantics, the pending-annotations
//! anti-join, annotated-result-view synthesis, and Parquet dataset export.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted."
)]

use chrono::Duration;
use chrono::Utc;
use serptrace_core::identifiers::AnnotationId;
use serptrace_core::identifiers::CrawlRunId;
use serptrace_core::identifiers::EngineId;
use serptrace_core::identifiers::QueryId;
use serptrace_core::identifiers::RunId;
use serptrace_core::identifiers::SearchResultId;
use serptrace_core::model::AnnotationInput;
use serptrace_core::model::CrawlRunInput;
use serptrace_core::model::CrawlRunStatus;
use serptrace_core::model::DatasetFormat;
use serptrace_core::model::DatasetType;
use serptrace_core::model::DomainType;
use serptrace_core::model::FactualConsistency;
use serptrace_core::model::SearchResultInput;
use serptrace_core::storage::AnnotatedResultsFilter;
use serptrace_core::storage::DatasetFilter;
use serptrace_core::storage::ExportDatasetRequest;
use serptrace_core::storage::PendingAnnotationsFilter;
use serptrace_core::storage::Storage;
use serptrace_store_sqlite::SqliteStore;
use serptrace_store_sqlite::SqliteStoreConfig;
use serptrace_store_sqlite::SqliteStoreError;
use tempfile::TempDir;

fn search_result_input(id: &str, query_id: &str, engine: &str, crawl_run_id: Option<&str>) -> SearchResultInput {
    SearchResultInput {
        id: SearchResultId::new(id),
        crawl_run_id: crawl_run_id.map(CrawlRunId::new),
        query_id: QueryId::new(query_id),
        engine: EngineId::new(engine),
        rank: 0,
        title: "title".to_owned(),
        snippet: Some("snippet".to_owned()),
        url: format!("https://example.com/{id}"),
        normalized_url: format!("example.com/{id}"),
        domain: "example.com".to_owned(),
        timestamp: Utc::now(),
        hash: format!("hash-{id}"),
        raw_html_path: None,
    }
}

fn annotation_input(id: &str, search_result_id: &str, query_id: &str, engine: &str) -> AnnotationInput {
    AnnotationInput {
        id: AnnotationId::new(id),
        search_result_id: SearchResultId::new(search_result_id),
        query_id: QueryId::new(query_id),
        engine: EngineId::new(engine),
        domain_type: DomainType::News,
        factual_consistency: FactualConsistency::Aligned,
        confidence: Some(0.9),
        prompt_version: "v1".to_owned(),
        model_id: "model-1".to_owned(),
        extra: None,
    }
}

async fn open_store(dir: &TempDir) -> SqliteStore {
    let path = dir.path().join("store.sqlite3");
    SqliteStore::open(SqliteStoreConfig::new(path.to_string_lossy().into_owned())).expect("store opens")
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_initializes_on_fresh_path() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let runs = store.fetch_pipeline_runs(10).await.unwrap();
    assert!(runs.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn reopening_an_existing_database_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.sqlite3");
    {
        let store = SqliteStore::open(SqliteStoreConfig::new(path.to_string_lossy().into_owned())).unwrap();
        store.insert_search_results(&[search_result_input("r1", "q1", "google", None)]).await.unwrap();
    }
    let store = SqliteStore::open(SqliteStoreConfig::new(path.to_string_lossy().into_owned())).unwrap();
    let pending = store.fetch_pending_annotations(&PendingAnnotationsFilter::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_by_id_preserves_created_at() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let input = search_result_input("r1", "q1", "google", None);
    store.insert_search_results(&[input.clone()]).await.unwrap();

    let first = store.fetch_pending_annotations(&PendingAnnotationsFilter::default()).await.unwrap();
    let first_created_at = first[0].created_at;

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let mut updated = input;
    updated.title = "updated title".to_owned();
    store.insert_search_results(&[updated]).await.unwrap();

    let second = store.fetch_pending_annotations(&PendingAnnotationsFilter::default()).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].title, "updated title");
    assert_eq!(second[0].created_at, first_created_at);
    assert!(second[0].updated_at >= first_created_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_pending_annotations_excludes_annotated_results() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .insert_search_results(&[
            search_result_input("r1", "q1", "google", None),
            search_result_input("r2", "q1", "bing", None),
        ])
        .await
        .unwrap();
    store.insert_annotation_records(&[annotation_input("a1", "r1", "q1", "google")]).await.unwrap();

    let pending = store.fetch_pending_annotations(&PendingAnnotationsFilter::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id.as_str(), "r2");
}

#[tokio::test(flavor = "multi_thread")]
async fn annotated_view_links_crawl_run_batch_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let started_at = Utc::now();
    store
        .record_crawl_runs(&[CrawlRunInput {
            id: CrawlRunId::new("cr1"),
            batch_id: RunId::new("batch-1"),
            query_id: QueryId::new("q1"),
            engine: EngineId::new("google"),
            status: CrawlRunStatus::Completed,
            started_at,
            completed_at: Some(started_at),
            error: None,
            result_count: 1,
        }])
        .await
        .unwrap();
    store.insert_search_results(&[search_result_input("r1", "q1", "google", Some("cr1"))]).await.unwrap();
    store.insert_annotation_records(&[annotation_input("a1", "r1", "q1", "google")]).await.unwrap();

    let views = store.fetch_annotated_results(&AnnotatedResultsFilter::default()).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].run_id, "batch-1");
    assert_eq!(views[0].batch_id.as_ref().map(RunId::as_str), Some("batch-1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn annotated_view_synthesizes_run_id_without_crawl_run() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.insert_search_results(&[search_result_input("r1", "q1", "google", None)]).await.unwrap();
    store.insert_annotation_records(&[annotation_input("a1", "r1", "q1", "google")]).await.unwrap();

    let views = store.fetch_annotated_results(&AnnotatedResultsFilter::default()).await.unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].run_id.starts_with("q1|"));
    assert!(views[0].batch_id.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn export_dataset_writes_parquet_and_records_version() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.insert_search_results(&[search_result_input("r1", "q1", "google", None)]).await.unwrap();

    let output_dir = dir.path().join("exports");
    let request = ExportDatasetRequest {
        dataset_type: DatasetType::SearchResults,
        output_dir: output_dir.to_string_lossy().into_owned(),
        run_id: None,
        format: DatasetFormat::Parquet,
        filters: DatasetFilter::default(),
    };
    let exported = store.export_dataset(&request).await.unwrap();
    assert_eq!(exported.version.record_count, 1);
    assert!(std::path::Path::new(&exported.file_path).exists());

    let pipeline_runs = store.fetch_pipeline_runs(10).await.unwrap();
    assert!(pipeline_runs.is_empty());
}

#[test]
fn open_rejects_empty_path() {
    let err = SqliteStore::open(SqliteStoreConfig::new(String::new())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn export_dataset_honors_since_filter() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.insert_search_results(&[search_result_input("r1", "q1", "google", None)]).await.unwrap();

    let request = ExportDatasetRequest {
        dataset_type: DatasetType::SearchResults,
        output_dir: dir.path().join("exports").to_string_lossy().into_owned(),
        run_id: None,
        format: DatasetFormat::Parquet,
        filters: DatasetFilter {
            since: Some(Utc::now() + Duration::days(1)),
            ..DatasetFilter::default()
        },
    };
    let exported = store.export_dataset(&request).await.unwrap();
    assert_eq!(exported.version.record_count, 0);
}
