// serptrace-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// ============================================================================

//! Schema creation and version migration. A single `store_meta` row tracks
//! the on-disk schema version; unrecognized versions fail closed rather than
//! silently running against a mismatched shape.

use rusqlite::Connection;

use crate::error::SqliteStoreError;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES_SQL: &str = "
CREATE TABLE search_results (
    id TEXT PRIMARY KEY,
    crawl_run_id TEXT,
    query_id TEXT NOT NULL,
    engine TEXT NOT NULL,
    rank INTEGER NOT NULL,
    title TEXT NOT NULL,
    snippet TEXT,
    url TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    hash TEXT NOT NULL,
    raw_html_path TEXT,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_search_results_timestamp ON search_results(timestamp_ms);
CREATE INDEX idx_search_results_query_engine ON search_results(query_id, engine);

CREATE TABLE crawl_runs (
    id TEXT PRIMARY KEY,
    batch_id TEXT NOT NULL,
    query_id TEXT NOT NULL,
    engine TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at_ms INTEGER NOT NULL,
    completed_at_ms INTEGER,
    error TEXT,
    result_count INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_crawl_runs_batch ON crawl_runs(batch_id);

CREATE TABLE annotations (
    id TEXT PRIMARY KEY,
    search_result_id TEXT NOT NULL,
    query_id TEXT NOT NULL,
    engine TEXT NOT NULL,
    domain_type TEXT NOT NULL,
    factual_consistency TEXT NOT NULL,
    confidence REAL,
    prompt_version TEXT NOT NULL,
    model_id TEXT NOT NULL,
    extra TEXT,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE UNIQUE INDEX idx_annotations_search_result ON annotations(search_result_id);

CREATE TABLE annotated_result_view (
    annotation_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    batch_id TEXT,
    query_id TEXT NOT NULL,
    engine TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    domain TEXT NOT NULL,
    rank INTEGER NOT NULL,
    factual_consistency TEXT NOT NULL,
    domain_type TEXT NOT NULL,
    collected_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_annotated_view_collected ON annotated_result_view(collected_at_ms);
CREATE INDEX idx_annotated_view_query ON annotated_result_view(query_id);

CREATE TABLE metric_records (
    id TEXT PRIMARY KEY,
    crawl_run_id TEXT,
    query_id TEXT NOT NULL,
    engine TEXT,
    metric_type TEXT NOT NULL,
    value REAL NOT NULL,
    delta REAL,
    compared_to_run_id TEXT,
    collected_at_ms INTEGER NOT NULL,
    extra TEXT,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_metric_records_type_collected ON metric_records(metric_type, collected_at_ms);

CREATE TABLE annotation_aggregates (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    query_id TEXT NOT NULL,
    engine TEXT,
    domain_type TEXT NOT NULL,
    factual_consistency TEXT NOT NULL,
    count INTEGER NOT NULL,
    total_annotations INTEGER NOT NULL,
    collected_at_ms INTEGER NOT NULL,
    extra TEXT,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_aggregates_run ON annotation_aggregates(run_id);

CREATE TABLE audit_samples (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    annotation_id TEXT NOT NULL,
    query_id TEXT NOT NULL,
    engine TEXT NOT NULL,
    reviewer TEXT,
    status TEXT NOT NULL,
    notes TEXT,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_audit_samples_run ON audit_samples(run_id);

CREATE TABLE pipeline_runs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    started_at_ms INTEGER NOT NULL,
    completed_at_ms INTEGER,
    error TEXT,
    metadata TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_pipeline_runs_started ON pipeline_runs(started_at_ms);

CREATE TABLE pipeline_stage_logs (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    started_at_ms INTEGER NOT NULL,
    completed_at_ms INTEGER,
    error TEXT,
    metadata TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_stage_logs_run ON pipeline_stage_logs(run_id);

CREATE TABLE dataset_versions (
    id TEXT PRIMARY KEY,
    dataset_type TEXT NOT NULL,
    format TEXT NOT NULL,
    path TEXT NOT NULL,
    run_id TEXT,
    record_count INTEGER NOT NULL,
    metadata TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);

CREATE TABLE viewpoints (
    id TEXT PRIMARY KEY,
    query_id TEXT NOT NULL,
    run_id TEXT,
    engine TEXT NOT NULL,
    domain TEXT NOT NULL,
    normalized_url TEXT NOT NULL,
    stance TEXT NOT NULL,
    supporting_annotation_id TEXT,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX idx_viewpoints_query ON viewpoints(query_id);
";

/// Creates the schema on a fresh database, or validates the version on an
/// existing one, inside a single transaction.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] if the on-disk version is
/// not [`SCHEMA_VERSION`], or [`SqliteStoreError::Db`] on any SQL failure.
pub fn initialize_schema(conn: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);")?;

    let version: Option<i64> = tx
        .query_row("SELECT value FROM store_meta WHERE key = 'schema_version'", [], |row| {
            row.get::<_, String>(0)
        })
        .ok()
        .and_then(|value| value.parse().ok());

    match version {
        None => {
            tx.execute_batch(CREATE_TABLES_SQL)?;
            tx.execute(
                "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                rusqlite::params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(existing) if existing == SCHEMA_VERSION => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "on-disk schema version {other} is not supported by this binary (expected {SCHEMA_VERSION})"
            )));
        }
    }

    tx.commit()?;
    Ok(())
}
