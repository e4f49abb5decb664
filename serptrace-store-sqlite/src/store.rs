// serptrace-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: The production `Storage` implementation, backed by a single
//              SQLite connection guarded by a mutex and driven off a
//              blocking-task pool.
// Dependencies: rusqlite (bundled), tokio (spawn_blocking), polars, chrono
// ============================================================================

//! ## Overview
//! One [`rusqlite::Connection`] is shared behind `Arc<Mutex<Connection>>`,
//! mirroring the capability-store family this workspace grew out of: no
//! connection pool, one writer at a time, reads and writes alike serialized
//! through the mutex. Every trait method hands its work to
//! `tokio::task::spawn_blocking` so the async runtime is never blocked on
//! SQLite I/O.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde_json::Value;
use serptrace_core::identifiers::AnnotationId;
use serptrace_core::identifiers::EngineId;
use serptrace_core::identifiers::QueryId;
use serptrace_core::identifiers::RunId;
use serptrace_core::model::AnnotatedResultView;
use serptrace_core::model::AnnotationAggregate;
use serptrace_core::model::AnnotationAggregateInput;
use serptrace_core::model::AnnotationInput;
use serptrace_core::model::AuditSample;
use serptrace_core::model::AuditSampleInput;
use serptrace_core::model::AuditSampleStatus;
use serptrace_core::model::CrawlRunInput;
use serptrace_core::model::DatasetFormat;
use serptrace_core::model::DatasetType;
use serptrace_core::model::DatasetVersion;
use serptrace_core::model::DomainType;
use serptrace_core::model::FactualConsistency;
use serptrace_core::model::MetricRecord;
use serptrace_core::model::MetricRecordInput;
use serptrace_core::model::PipelineRun;
use serptrace_core::model::PipelineStage;
use serptrace_core::model::PipelineStageLog;
use serptrace_core::model::RunStatus;
use serptrace_core::model::SearchResult;
use serptrace_core::model::SearchResultInput;
use serptrace_core::model::Viewpoint;
use serptrace_core::model::ViewpointInput;
use serptrace_core::model::annotation::synthesize_run_id;
use serptrace_core::parquet;
use serptrace_core::storage::AlternativeSourcesFilter;
use serptrace_core::storage::AnnotatedResultsFilter;
use serptrace_core::storage::AnnotationAggregatesFilter;
use serptrace_core::storage::ExportDatasetRequest;
use serptrace_core::storage::ExportedDataset;
use serptrace_core::storage::PendingAnnotationsFilter;
use serptrace_core::storage::Storage;
use serptrace_core::storage::StoreError;
use serptrace_core::storage::StoreResult;
use serptrace_core::storage::ViewpointsFilter;

use crate::config::SqliteStoreConfig;
use crate::error::SqliteStoreError;
use crate::schema::initialize_schema;
use crate::time::from_millis;
use crate::time::to_millis;
use crate::time::to_millis_opt;

const MAX_PATH_LEN: usize = 4096;

/// The production, SQLite-backed [`Storage`] implementation.
pub struct SqliteStore {
    config: SqliteStoreConfig,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) a SQLite store at `config.path`, applying
    /// pragmas and running schema migration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for a malformed path,
    /// [`SqliteStoreError::Io`] if the parent directory or file cannot be
    /// created, and [`SqliteStoreError::VersionMismatch`] if an existing
    /// database carries an unsupported schema version.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        let path = PathBuf::from(&config.path);
        ensure_parent_dir(&path)?;
        let mut conn = open_connection(&path)?;
        apply_pragmas(&conn, &config)?;
        initialize_schema(&mut conn)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the configuration this store was opened with.
    #[must_use]
    pub fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `f` against the connection on a blocking-task thread, translating
    /// lock poisoning and task panics into [`StoreError::Backend`].
    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.connection);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SqliteStoreError::Db("sqlite connection mutex poisoned".to_owned()))?;
            f(&mut guard)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(StoreError::from),
            Err(err) => Err(StoreError::Backend(format!("sqlite worker task panicked: {err}"))),
        }
    }
}

fn validate_store_path(path: &str) -> Result<(), SqliteStoreError> {
    if path.trim().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_owned()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(SqliteStoreError::Invalid(format!("store path exceeds {MAX_PATH_LEN} bytes")));
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn open_connection(path: &Path) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    Connection::open_with_flags(path, flags).map_err(SqliteStoreError::from)
}

fn apply_pragmas(conn: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
    conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
    conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
    Ok(())
}

fn json_to_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn text_to_json(text: Option<String>) -> Result<Option<Value>, SqliteStoreError> {
    text.map(|t| serde_json::from_str(&t).map_err(|err| SqliteStoreError::Corrupt(format!("invalid json column: {err}"))))
        .transpose()
}

fn parse_domain_type(value: &str) -> Result<DomainType, SqliteStoreError> {
    DomainType::parse(value).ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown domain_type: {value}")))
}

fn parse_factual_consistency(value: &str) -> Result<FactualConsistency, SqliteStoreError> {
    FactualConsistency::parse(value).ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown factual_consistency: {value}")))
}

// ============================================================================
// SECTION: Row Mapping — Search Results
// ============================================================================

struct SearchResultRow {
    id: String,
    crawl_run_id: Option<String>,
    query_id: String,
    engine: String,
    rank: i64,
    title: String,
    snippet: Option<String>,
    url: String,
    normalized_url: String,
    domain: String,
    timestamp_ms: i64,
    hash: String,
    raw_html_path: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

const SEARCH_RESULT_COLUMNS: &str =
    "id, crawl_run_id, query_id, engine, rank, title, snippet, url, normalized_url, domain, timestamp_ms, hash, raw_html_path, created_at_ms, updated_at_ms";

fn map_search_result_row(row: &Row<'_>) -> rusqlite::Result<SearchResultRow> {
    Ok(SearchResultRow {
        id: row.get(0)?,
        crawl_run_id: row.get(1)?,
        query_id: row.get(2)?,
        engine: row.get(3)?,
        rank: row.get(4)?,
        title: row.get(5)?,
        snippet: row.get(6)?,
        url: row.get(7)?,
        normalized_url: row.get(8)?,
        domain: row.get(9)?,
        timestamp_ms: row.get(10)?,
        hash: row.get(11)?,
        raw_html_path: row.get(12)?,
        created_at_ms: row.get(13)?,
        updated_at_ms: row.get(14)?,
    })
}

impl SearchResultRow {
    fn into_domain(self) -> Result<SearchResult, SqliteStoreError> {
        Ok(SearchResult {
            id: self.id.into(),
            crawl_run_id: self.crawl_run_id.map(Into::into),
            query_id: self.query_id.into(),
            engine: self.engine.into(),
            rank: u32::try_from(self.rank).unwrap_or(0),
            title: self.title,
            snippet: self.snippet,
            url: self.url,
            normalized_url: self.normalized_url,
            domain: self.domain,
            timestamp: from_millis(self.timestamp_ms)?,
            hash: self.hash,
            raw_html_path: self.raw_html_path,
            created_at: from_millis(self.created_at_ms)?,
            updated_at: from_millis(self.updated_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Annotated Result View
// ============================================================================

struct AnnotatedViewRow {
    run_id: String,
    batch_id: Option<String>,
    annotation_id: String,
    query_id: String,
    engine: String,
    normalized_url: String,
    domain: String,
    rank: i64,
    factual_consistency: String,
    domain_type: String,
    collected_at_ms: i64,
}

const ANNOTATED_VIEW_COLUMNS: &str =
    "run_id, batch_id, annotation_id, query_id, engine, normalized_url, domain, rank, factual_consistency, domain_type, collected_at_ms";

fn map_annotated_view_row(row: &Row<'_>) -> rusqlite::Result<AnnotatedViewRow> {
    Ok(AnnotatedViewRow {
        run_id: row.get(0)?,
        batch_id: row.get(1)?,
        annotation_id: row.get(2)?,
        query_id: row.get(3)?,
        engine: row.get(4)?,
        normalized_url: row.get(5)?,
        domain: row.get(6)?,
        rank: row.get(7)?,
        factual_consistency: row.get(8)?,
        domain_type: row.get(9)?,
        collected_at_ms: row.get(10)?,
    })
}

impl AnnotatedViewRow {
    fn into_domain(self) -> Result<AnnotatedResultView, SqliteStoreError> {
        Ok(AnnotatedResultView {
            run_id: self.run_id,
            batch_id: self.batch_id.map(Into::into),
            annotation_id: self.annotation_id.into(),
            query_id: self.query_id.into(),
            engine: self.engine.into(),
            normalized_url: self.normalized_url,
            domain: self.domain,
            rank: u32::try_from(self.rank).unwrap_or(0),
            factual_consistency: parse_factual_consistency(&self.factual_consistency)?,
            domain_type: parse_domain_type(&self.domain_type)?,
            collected_at: from_millis(self.collected_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Metric Records
// ============================================================================

struct MetricRecordRow {
    id: String,
    crawl_run_id: Option<String>,
    query_id: String,
    engine: Option<String>,
    metric_type: String,
    value: f64,
    delta: Option<f64>,
    compared_to_run_id: Option<String>,
    collected_at_ms: i64,
    extra: Option<String>,
    created_at_ms: i64,
}

const METRIC_RECORD_COLUMNS: &str =
    "id, crawl_run_id, query_id, engine, metric_type, value, delta, compared_to_run_id, collected_at_ms, extra, created_at_ms";

fn map_metric_record_row(row: &Row<'_>) -> rusqlite::Result<MetricRecordRow> {
    Ok(MetricRecordRow {
        id: row.get(0)?,
        crawl_run_id: row.get(1)?,
        query_id: row.get(2)?,
        engine: row.get(3)?,
        metric_type: row.get(4)?,
        value: row.get(5)?,
        delta: row.get(6)?,
        compared_to_run_id: row.get(7)?,
        collected_at_ms: row.get(8)?,
        extra: row.get(9)?,
        created_at_ms: row.get(10)?,
    })
}

impl MetricRecordRow {
    fn into_domain(self) -> Result<MetricRecord, SqliteStoreError> {
        Ok(MetricRecord {
            id: self.id.into(),
            crawl_run_id: self.crawl_run_id.map(Into::into),
            query_id: self.query_id.into(),
            engine: self.engine.map(Into::into),
            metric_type: self.metric_type,
            value: self.value,
            delta: self.delta,
            compared_to_run_id: self.compared_to_run_id.map(Into::into),
            collected_at: from_millis(self.collected_at_ms)?,
            extra: text_to_json(self.extra)?,
            created_at: from_millis(self.created_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Annotation Aggregates
// ============================================================================

struct AggregateRow {
    id: String,
    run_id: String,
    query_id: String,
    engine: Option<String>,
    domain_type: String,
    factual_consistency: String,
    count: i64,
    total_annotations: i64,
    collected_at_ms: i64,
    extra: Option<String>,
    created_at_ms: i64,
}

const AGGREGATE_COLUMNS: &str =
    "id, run_id, query_id, engine, domain_type, factual_consistency, count, total_annotations, collected_at_ms, extra, created_at_ms";

fn map_aggregate_row(row: &Row<'_>) -> rusqlite::Result<AggregateRow> {
    Ok(AggregateRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        query_id: row.get(2)?,
        engine: row.get(3)?,
        domain_type: row.get(4)?,
        factual_consistency: row.get(5)?,
        count: row.get(6)?,
        total_annotations: row.get(7)?,
        collected_at_ms: row.get(8)?,
        extra: row.get(9)?,
        created_at_ms: row.get(10)?,
    })
}

impl AggregateRow {
    fn into_domain(self) -> Result<AnnotationAggregate, SqliteStoreError> {
        Ok(AnnotationAggregate {
            id: self.id.into(),
            run_id: self.run_id.into(),
            query_id: self.query_id.into(),
            engine: self.engine.map(Into::into),
            domain_type: parse_domain_type(&self.domain_type)?,
            factual_consistency: parse_factual_consistency(&self.factual_consistency)?,
            count: u32::try_from(self.count).unwrap_or(0),
            total_annotations: u32::try_from(self.total_annotations).unwrap_or(0),
            collected_at: from_millis(self.collected_at_ms)?,
            extra: text_to_json(self.extra)?,
            created_at: from_millis(self.created_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Audit Samples
// ============================================================================

struct AuditSampleRow {
    id: String,
    run_id: String,
    annotation_id: String,
    query_id: String,
    engine: String,
    reviewer: Option<String>,
    status: String,
    notes: Option<String>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

const AUDIT_SAMPLE_COLUMNS: &str =
    "id, run_id, annotation_id, query_id, engine, reviewer, status, notes, created_at_ms, updated_at_ms";

fn map_audit_sample_row(row: &Row<'_>) -> rusqlite::Result<AuditSampleRow> {
    Ok(AuditSampleRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        annotation_id: row.get(2)?,
        query_id: row.get(3)?,
        engine: row.get(4)?,
        reviewer: row.get(5)?,
        status: row.get(6)?,
        notes: row.get(7)?,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
    })
}

impl AuditSampleRow {
    fn into_domain(self) -> Result<AuditSample, SqliteStoreError> {
        let status = AuditSampleStatus::parse(&self.status)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown audit sample status: {}", self.status)))?;
        Ok(AuditSample {
            id: self.id.into(),
            run_id: self.run_id.into(),
            annotation_id: self.annotation_id.into(),
            query_id: self.query_id.into(),
            engine: self.engine.into(),
            reviewer: self.reviewer,
            status,
            notes: self.notes,
            created_at: from_millis(self.created_at_ms)?,
            updated_at: from_millis(self.updated_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Pipeline Runs & Stage Logs
// ============================================================================

struct PipelineRunRow {
    id: String,
    status: String,
    started_at_ms: i64,
    completed_at_ms: Option<i64>,
    error: Option<String>,
    metadata: String,
    created_at_ms: i64,
    updated_at_ms: i64,
}

const PIPELINE_RUN_COLUMNS: &str = "id, status, started_at_ms, completed_at_ms, error, metadata, created_at_ms, updated_at_ms";

fn map_pipeline_run_row(row: &Row<'_>) -> rusqlite::Result<PipelineRunRow> {
    Ok(PipelineRunRow {
        id: row.get(0)?,
        status: row.get(1)?,
        started_at_ms: row.get(2)?,
        completed_at_ms: row.get(3)?,
        error: row.get(4)?,
        metadata: row.get(5)?,
        created_at_ms: row.get(6)?,
        updated_at_ms: row.get(7)?,
    })
}

fn parse_run_status(value: &str) -> Result<RunStatus, SqliteStoreError> {
    RunStatus::parse(value).ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown run status: {value}")))
}

impl PipelineRunRow {
    fn into_domain(self) -> Result<PipelineRun, SqliteStoreError> {
        Ok(PipelineRun {
            id: self.id.into(),
            status: parse_run_status(&self.status)?,
            started_at: from_millis(self.started_at_ms)?,
            completed_at: self.completed_at_ms.map(from_millis).transpose()?,
            error: self.error,
            metadata: serde_json::from_str(&self.metadata)
                .map_err(|err| SqliteStoreError::Corrupt(format!("invalid pipeline run metadata: {err}")))?,
            created_at: from_millis(self.created_at_ms)?,
            updated_at: from_millis(self.updated_at_ms)?,
        })
    }
}

struct StageLogRow {
    id: String,
    run_id: String,
    stage: String,
    status: String,
    attempts: i64,
    started_at_ms: i64,
    completed_at_ms: Option<i64>,
    error: Option<String>,
    metadata: String,
    created_at_ms: i64,
    updated_at_ms: i64,
}

const STAGE_LOG_COLUMNS: &str =
    "id, run_id, stage, status, attempts, started_at_ms, completed_at_ms, error, metadata, created_at_ms, updated_at_ms";

fn map_stage_log_row(row: &Row<'_>) -> rusqlite::Result<StageLogRow> {
    Ok(StageLogRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        stage: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        started_at_ms: row.get(5)?,
        completed_at_ms: row.get(6)?,
        error: row.get(7)?,
        metadata: row.get(8)?,
        created_at_ms: row.get(9)?,
        updated_at_ms: row.get(10)?,
    })
}

impl StageLogRow {
    fn into_domain(self) -> Result<PipelineStageLog, SqliteStoreError> {
        let stage = PipelineStage::parse(&self.stage)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown pipeline stage: {}", self.stage)))?;
        Ok(PipelineStageLog {
            id: self.id.into(),
            run_id: self.run_id.into(),
            stage,
            status: parse_run_status(&self.status)?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            started_at: from_millis(self.started_at_ms)?,
            completed_at: self.completed_at_ms.map(from_millis).transpose()?,
            error: self.error,
            metadata: serde_json::from_str(&self.metadata)
                .map_err(|err| SqliteStoreError::Corrupt(format!("invalid stage log metadata: {err}")))?,
            created_at: from_millis(self.created_at_ms)?,
            updated_at: from_millis(self.updated_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Row Mapping — Viewpoints
// ============================================================================

struct ViewpointRow {
    id: String,
    query_id: String,
    run_id: Option<String>,
    engine: String,
    domain: String,
    normalized_url: String,
    stance: String,
    supporting_annotation_id: Option<String>,
    created_at_ms: i64,
}

const VIEWPOINT_COLUMNS: &str =
    "id, query_id, run_id, engine, domain, normalized_url, stance, supporting_annotation_id, created_at_ms";

fn map_viewpoint_row(row: &Row<'_>) -> rusqlite::Result<ViewpointRow> {
    Ok(ViewpointRow {
        id: row.get(0)?,
        query_id: row.get(1)?,
        run_id: row.get(2)?,
        engine: row.get(3)?,
        domain: row.get(4)?,
        normalized_url: row.get(5)?,
        stance: row.get(6)?,
        supporting_annotation_id: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}

impl ViewpointRow {
    fn into_domain(self) -> Result<Viewpoint, SqliteStoreError> {
        Ok(Viewpoint {
            id: self.id.into(),
            query_id: self.query_id.into(),
            run_id: self.run_id.map(Into::into),
            engine: self.engine.into(),
            domain: self.domain,
            normalized_url: self.normalized_url,
            stance: self.stance,
            supporting_annotation_id: self.supporting_annotation_id.map(Into::into),
            created_at: from_millis(self.created_at_ms)?,
        })
    }
}

// ============================================================================
// SECTION: Storage Implementation
// ============================================================================

#[async_trait]
impl Storage for SqliteStore {
    async fn fetch_pending_annotations(&self, filter: &PendingAnnotationsFilter) -> StoreResult<Vec<SearchResult>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sr.id, sr.crawl_run_id, sr.query_id, sr.engine, sr.rank, sr.title, sr.snippet, sr.url, \
                        sr.normalized_url, sr.domain, sr.timestamp_ms, sr.hash, sr.raw_html_path, sr.created_at_ms, sr.updated_at_ms \
                 FROM search_results sr \
                 LEFT JOIN annotations a ON a.search_result_id = sr.id \
                 WHERE a.id IS NULL ORDER BY sr.timestamp_ms ASC",
            )?;
            let raw = stmt.query_map([], map_search_result_row)?.collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            let mut rows: Vec<SearchResult> = rows
                .into_iter()
                .filter(|r| filter.query_ids.is_empty() || filter.query_ids.contains(&r.query_id))
                .filter(|r| filter.engines.is_empty() || filter.engines.contains(&r.engine))
                .collect();
            if let Some(limit) = filter.limit {
                rows.truncate(limit as usize);
            }
            Ok(rows)
        })
        .await
    }

    async fn insert_search_results(&self, results: &[SearchResultInput]) -> StoreResult<()> {
        let results = results.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &results {
                tx.execute(
                    "INSERT INTO search_results (id, crawl_run_id, query_id, engine, rank, title, snippet, url, normalized_url, domain, timestamp_ms, hash, raw_html_path, created_at_ms, updated_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14) \
                     ON CONFLICT(id) DO UPDATE SET \
                        crawl_run_id=excluded.crawl_run_id, query_id=excluded.query_id, engine=excluded.engine, \
                        rank=excluded.rank, title=excluded.title, snippet=excluded.snippet, url=excluded.url, \
                        normalized_url=excluded.normalized_url, domain=excluded.domain, timestamp_ms=excluded.timestamp_ms, \
                        hash=excluded.hash, raw_html_path=excluded.raw_html_path, updated_at_ms=excluded.updated_at_ms",
                    params![
                        input.id.as_str(),
                        input.crawl_run_id.as_ref().map(serptrace_core::identifiers::CrawlRunId::as_str),
                        input.query_id.as_str(),
                        input.engine.as_str(),
                        i64::from(input.rank),
                        input.title,
                        input.snippet,
                        input.url,
                        input.normalized_url,
                        input.domain,
                        to_millis(input.timestamp),
                        input.hash,
                        input.raw_html_path,
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn record_crawl_runs(&self, runs: &[CrawlRunInput]) -> StoreResult<()> {
        let runs = runs.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &runs {
                tx.execute(
                    "INSERT INTO crawl_runs (id, batch_id, query_id, engine, status, started_at_ms, completed_at_ms, error, result_count, created_at_ms, updated_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) \
                     ON CONFLICT(id) DO UPDATE SET \
                        batch_id=excluded.batch_id, query_id=excluded.query_id, engine=excluded.engine, status=excluded.status, \
                        started_at_ms=excluded.started_at_ms, completed_at_ms=excluded.completed_at_ms, error=excluded.error, \
                        result_count=excluded.result_count, updated_at_ms=excluded.updated_at_ms",
                    params![
                        input.id.as_str(),
                        input.batch_id.as_str(),
                        input.query_id.as_str(),
                        input.engine.as_str(),
                        input.status.as_str(),
                        to_millis(input.started_at),
                        to_millis_opt(input.completed_at),
                        input.error,
                        i64::from(input.result_count),
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert_annotation_records(&self, annotations: &[AnnotationInput]) -> StoreResult<()> {
        let annotations = annotations.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &annotations {
                tx.execute(
                    "INSERT INTO annotations (id, search_result_id, query_id, engine, domain_type, factual_consistency, confidence, prompt_version, model_id, extra, created_at_ms, updated_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11) \
                     ON CONFLICT(id) DO UPDATE SET \
                        search_result_id=excluded.search_result_id, query_id=excluded.query_id, engine=excluded.engine, \
                        domain_type=excluded.domain_type, factual_consistency=excluded.factual_consistency, \
                        confidence=excluded.confidence, prompt_version=excluded.prompt_version, model_id=excluded.model_id, \
                        extra=excluded.extra, updated_at_ms=excluded.updated_at_ms",
                    params![
                        input.id.as_str(),
                        input.search_result_id.as_str(),
                        input.query_id.as_str(),
                        input.engine.as_str(),
                        input.domain_type.as_str(),
                        input.factual_consistency.as_str(),
                        input.confidence,
                        input.prompt_version,
                        input.model_id,
                        json_to_text(&input.extra),
                        now_ms,
                    ],
                )?;

                let result_row: Option<(String, Option<String>, String, String, i64, i64)> = tx
                    .query_row(
                        "SELECT query_id, crawl_run_id, normalized_url, domain, rank, timestamp_ms FROM search_results WHERE id = ?1",
                        params![input.search_result_id.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
                    )
                    .optional()?;

                if let Some((query_id, crawl_run_id, normalized_url, domain, rank, timestamp_ms)) = result_row {
                    let batch_id: Option<String> = match &crawl_run_id {
                        Some(crawl_run_id) => tx
                            .query_row("SELECT batch_id FROM crawl_runs WHERE id = ?1", params![crawl_run_id], |row| row.get(0))
                            .optional()?,
                        None => None,
                    };
                    let collected_at = from_millis(timestamp_ms)?;
                    let run_id = batch_id.clone().unwrap_or_else(|| synthesize_run_id(&QueryId::new(query_id.clone()), collected_at));

                    tx.execute(
                        "INSERT INTO annotated_result_view (annotation_id, run_id, batch_id, query_id, engine, normalized_url, domain, rank, factual_consistency, domain_type, collected_at_ms) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                         ON CONFLICT(annotation_id) DO UPDATE SET \
                            run_id=excluded.run_id, batch_id=excluded.batch_id, query_id=excluded.query_id, engine=excluded.engine, \
                            normalized_url=excluded.normalized_url, domain=excluded.domain, rank=excluded.rank, \
                            factual_consistency=excluded.factual_consistency, domain_type=excluded.domain_type, \
                            collected_at_ms=excluded.collected_at_ms",
                        params![
                            input.id.as_str(),
                            run_id,
                            batch_id,
                            query_id,
                            input.engine.as_str(),
                            normalized_url,
                            domain,
                            rank,
                            input.factual_consistency.as_str(),
                            input.domain_type.as_str(),
                            timestamp_ms,
                        ],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_annotated_results(&self, filter: &AnnotatedResultsFilter) -> StoreResult<Vec<AnnotatedResultView>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {ANNOTATED_VIEW_COLUMNS} FROM annotated_result_view \
                 WHERE (?1 IS NULL OR collected_at_ms >= ?1) AND (?2 IS NULL OR collected_at_ms <= ?2)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(params![to_millis_opt(filter.since), to_millis_opt(filter.until)], map_annotated_view_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            let mut rows: Vec<AnnotatedResultView> = rows
                .into_iter()
                .filter(|v| filter.query_ids.is_empty() || filter.query_ids.contains(&v.query_id))
                .filter(|v| filter.run_ids.is_empty() || v.batch_id.as_ref().is_some_and(|b| filter.run_ids.contains(b)))
                .collect();
            rows.sort_by(|a, b| {
                a.collected_at
                    .cmp(&b.collected_at)
                    .then_with(|| a.query_id.cmp(&b.query_id))
                    .then_with(|| a.engine.cmp(&b.engine))
                    .then_with(|| a.rank.cmp(&b.rank))
            });
            Ok(rows)
        })
        .await
    }

    async fn fetch_alternative_sources(&self, filter: &AlternativeSourcesFilter) -> StoreResult<Vec<AnnotatedResultView>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {ANNOTATED_VIEW_COLUMNS} FROM annotated_result_view WHERE (?1 IS NULL OR collected_at_ms >= ?1)");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(params![to_millis_opt(filter.since)], map_annotated_view_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            let keywords = filter.query_keywords.as_ref().map(|k| k.to_lowercase());
            let mut rows: Vec<AnnotatedResultView> = rows
                .into_iter()
                .filter(|v| filter.domain_types.is_empty() || filter.domain_types.contains(&v.domain_type))
                .filter(|v| filter.factual_consistency.is_empty() || filter.factual_consistency.contains(&v.factual_consistency))
                .filter(|v| !filter.exclude_urls.contains(&v.normalized_url))
                .filter(|v| keywords.as_ref().is_none_or(|k| format!("{} {}", v.domain, v.normalized_url).to_lowercase().contains(k)))
                .collect();
            rows.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
            rows.truncate(filter.limit as usize);
            Ok(rows)
        })
        .await
    }

    async fn insert_metric_records(&self, records: &[MetricRecordInput]) -> StoreResult<()> {
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &records {
                tx.execute(
                    "INSERT INTO metric_records (id, crawl_run_id, query_id, engine, metric_type, value, delta, compared_to_run_id, collected_at_ms, extra, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                     ON CONFLICT(id) DO UPDATE SET \
                        crawl_run_id=excluded.crawl_run_id, query_id=excluded.query_id, engine=excluded.engine, \
                        metric_type=excluded.metric_type, value=excluded.value, delta=excluded.delta, \
                        compared_to_run_id=excluded.compared_to_run_id, collected_at_ms=excluded.collected_at_ms, extra=excluded.extra",
                    params![
                        input.id.as_str(),
                        input.crawl_run_id.as_ref().map(serptrace_core::identifiers::CrawlRunId::as_str),
                        input.query_id.as_str(),
                        input.engine.as_ref().map(EngineId::as_str),
                        input.metric_type,
                        input.value,
                        input.delta,
                        input.compared_to_run_id.as_ref().map(RunId::as_str),
                        to_millis(input.collected_at),
                        json_to_text(&input.extra),
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_recent_metric_records(&self, metric_type: &str, limit: u32) -> StoreResult<Vec<MetricRecord>> {
        let metric_type = metric_type.to_owned();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {METRIC_RECORD_COLUMNS} FROM metric_records WHERE metric_type = ?1 ORDER BY collected_at_ms DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(params![metric_type, i64::from(limit)], map_metric_record_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            Ok(rows)
        })
        .await
    }

    async fn upsert_annotation_aggregates(&self, aggregates: &[AnnotationAggregateInput]) -> StoreResult<()> {
        let aggregates = aggregates.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &aggregates {
                tx.execute(
                    "INSERT INTO annotation_aggregates (id, run_id, query_id, engine, domain_type, factual_consistency, count, total_annotations, collected_at_ms, extra, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                     ON CONFLICT(id) DO UPDATE SET \
                        run_id=excluded.run_id, query_id=excluded.query_id, engine=excluded.engine, domain_type=excluded.domain_type, \
                        factual_consistency=excluded.factual_consistency, count=excluded.count, total_annotations=excluded.total_annotations, \
                        collected_at_ms=excluded.collected_at_ms, extra=excluded.extra",
                    params![
                        input.id.as_str(),
                        input.run_id.as_str(),
                        input.query_id.as_str(),
                        input.engine.as_ref().map(EngineId::as_str),
                        input.domain_type.as_str(),
                        input.factual_consistency.as_str(),
                        i64::from(input.count),
                        i64::from(input.total_annotations),
                        to_millis(input.collected_at),
                        json_to_text(&input.extra),
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_annotation_aggregates(&self, filter: &AnnotationAggregatesFilter) -> StoreResult<Vec<AnnotationAggregate>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM annotation_aggregates ORDER BY collected_at_ms ASC");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt.query_map([], map_aggregate_row)?.collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            let rows: Vec<AnnotationAggregate> = rows
                .into_iter()
                .filter(|a| filter.run_ids.is_empty() || filter.run_ids.contains(&a.run_id))
                .filter(|a| filter.query_ids.is_empty() || filter.query_ids.contains(&a.query_id))
                .filter(|a| filter.engines.is_empty() || a.engine.as_ref().is_some_and(|e| filter.engines.contains(e)))
                .filter(|a| filter.domain_types.is_empty() || filter.domain_types.contains(&a.domain_type))
                .collect();
            Ok(rows)
        })
        .await
    }

    async fn record_audit_samples(&self, samples: &[AuditSampleInput]) -> StoreResult<()> {
        let samples = samples.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &samples {
                tx.execute(
                    "INSERT INTO audit_samples (id, run_id, annotation_id, query_id, engine, reviewer, status, notes, created_at_ms, updated_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
                     ON CONFLICT(id) DO UPDATE SET \
                        run_id=excluded.run_id, annotation_id=excluded.annotation_id, query_id=excluded.query_id, engine=excluded.engine, \
                        reviewer=excluded.reviewer, status=excluded.status, notes=excluded.notes, updated_at_ms=excluded.updated_at_ms",
                    params![
                        input.id.as_str(),
                        input.run_id.as_str(),
                        input.annotation_id.as_str(),
                        input.query_id.as_str(),
                        input.engine.as_str(),
                        input.reviewer,
                        input.status.as_str(),
                        input.notes,
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_audit_samples(&self, run_id: &RunId) -> StoreResult<Vec<AuditSample>> {
        let run_id = run_id.as_str().to_owned();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {AUDIT_SAMPLE_COLUMNS} FROM audit_samples WHERE run_id = ?1 ORDER BY created_at_ms ASC");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt.query_map(params![run_id], map_audit_sample_row)?.collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            Ok(rows)
        })
        .await
    }

    async fn export_dataset(&self, request: &ExportDatasetRequest) -> StoreResult<ExportedDataset> {
        if request.format != DatasetFormat::Parquet {
            return Err(StoreError::Invalid(format!("unsupported dataset format: {:?}", request.format)));
        }
        let request = request.clone();
        self.with_conn(move |conn| {
            let (frame, record_count, distinct_queries, distinct_engines, min_ts, max_ts) = match request.dataset_type {
                DatasetType::SearchResults => {
                    let sql = format!(
                        "SELECT {SEARCH_RESULT_COLUMNS} FROM search_results WHERE (?1 IS NULL OR timestamp_ms >= ?1) AND (?2 IS NULL OR timestamp_ms <= ?2)"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let raw = stmt
                        .query_map(params![to_millis_opt(request.filters.since), to_millis_opt(request.filters.until)], map_search_result_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut rows = Vec::with_capacity(raw.len());
                    for row in raw {
                        rows.push(row.into_domain()?);
                    }
                    let rows: Vec<&SearchResult> = rows
                        .iter()
                        .filter(|r| request.filters.query_ids.is_empty() || request.filters.query_ids.contains(&r.query_id))
                        .filter(|r| request.filters.engines.is_empty() || request.filters.engines.contains(&r.engine))
                        .collect();
                    parquet::search_results_frame(&rows).map_err(sqlite_error_from_store)?
                }
                DatasetType::AnnotatedResults => {
                    let sql = format!(
                        "SELECT {ANNOTATED_VIEW_COLUMNS} FROM annotated_result_view WHERE (?1 IS NULL OR collected_at_ms >= ?1) AND (?2 IS NULL OR collected_at_ms <= ?2)"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let raw = stmt
                        .query_map(params![to_millis_opt(request.filters.since), to_millis_opt(request.filters.until)], map_annotated_view_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut rows = Vec::with_capacity(raw.len());
                    for row in raw {
                        rows.push(row.into_domain()?);
                    }
                    let rows: Vec<&AnnotatedResultView> = rows
                        .iter()
                        .filter(|v| request.filters.query_ids.is_empty() || request.filters.query_ids.contains(&v.query_id))
                        .filter(|v| request.filters.engines.is_empty() || request.filters.engines.contains(&v.engine))
                        .collect();
                    parquet::annotated_results_frame(&rows).map_err(sqlite_error_from_store)?
                }
                DatasetType::Metrics => {
                    let sql = format!(
                        "SELECT {METRIC_RECORD_COLUMNS} FROM metric_records WHERE (?1 IS NULL OR collected_at_ms >= ?1) AND (?2 IS NULL OR collected_at_ms <= ?2)"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let raw = stmt
                        .query_map(params![to_millis_opt(request.filters.since), to_millis_opt(request.filters.until)], map_metric_record_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut rows = Vec::with_capacity(raw.len());
                    for row in raw {
                        rows.push(row.into_domain()?);
                    }
                    let rows: Vec<&MetricRecord> = rows
                        .iter()
                        .filter(|m| request.filters.query_ids.is_empty() || request.filters.query_ids.contains(&m.query_id))
                        .filter(|m| {
                            request.filters.engines.is_empty() || m.engine.as_ref().is_some_and(|e| request.filters.engines.contains(e))
                        })
                        .collect();
                    parquet::metrics_frame(&rows).map_err(sqlite_error_from_store)?
                }
            };

            let generated_at = Utc::now();
            let safe_ts = parquet::safe_timestamp(generated_at);
            let path = parquet::dataset_export_path(&request.output_dir, request.dataset_type.as_str(), &safe_ts);
            parquet::write_parquet_dataset(&frame, &path).map_err(sqlite_error_from_store)?;

            let metadata = serde_json::json!({
                "dataset_type": request.dataset_type.as_str(),
                "filters": request.filters,
                "run_id": request.run_id.as_ref().map(RunId::as_str),
                "distinct_queries": distinct_queries,
                "distinct_engines": distinct_engines,
                "time_range": { "min": min_ts, "max": max_ts },
                "generated_at": generated_at.to_rfc3339(),
            });

            let version = DatasetVersion {
                id: serptrace_core::identifiers::DatasetVersionId::generate(),
                dataset_type: request.dataset_type,
                format: request.format,
                path: path.to_string_lossy().into_owned(),
                run_id: request.run_id.clone(),
                record_count,
                metadata: metadata.clone(),
                created_at: generated_at,
            };

            conn.execute(
                "INSERT INTO dataset_versions (id, dataset_type, format, path, run_id, record_count, metadata, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    version.id.as_str(),
                    version.dataset_type.as_str(),
                    version.format.as_str(),
                    version.path,
                    version.run_id.as_ref().map(RunId::as_str),
                    i64::try_from(version.record_count).unwrap_or(i64::MAX),
                    metadata.to_string(),
                    to_millis(version.created_at),
                ],
            )?;

            Ok(ExportedDataset {
                file_path: version.path.clone(),
                version,
            })
        })
        .await
    }

    async fn record_pipeline_run(&self, run: &PipelineRun) -> StoreResult<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO pipeline_runs (id, status, started_at_ms, completed_at_ms, error, metadata, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET \
                    status=excluded.status, started_at_ms=excluded.started_at_ms, completed_at_ms=excluded.completed_at_ms, \
                    error=excluded.error, metadata=excluded.metadata, updated_at_ms=excluded.updated_at_ms",
                params![
                    run.id.as_str(),
                    run.status.as_str(),
                    to_millis(run.started_at),
                    to_millis_opt(run.completed_at),
                    run.error,
                    run.metadata.to_string(),
                    to_millis(run.created_at),
                    to_millis(run.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_pipeline_stage(&self, stage: &PipelineStageLog) -> StoreResult<()> {
        let stage = stage.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO pipeline_stage_logs (id, run_id, stage, status, attempts, started_at_ms, completed_at_ms, error, metadata, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(id) DO UPDATE SET \
                    run_id=excluded.run_id, stage=excluded.stage, status=excluded.status, attempts=excluded.attempts, \
                    started_at_ms=excluded.started_at_ms, completed_at_ms=excluded.completed_at_ms, error=excluded.error, \
                    metadata=excluded.metadata, updated_at_ms=excluded.updated_at_ms",
                params![
                    stage.id.as_str(),
                    stage.run_id.as_str(),
                    stage.stage.as_str(),
                    stage.status.as_str(),
                    i64::from(stage.attempts),
                    to_millis(stage.started_at),
                    to_millis_opt(stage.completed_at),
                    stage.error,
                    stage.metadata.to_string(),
                    to_millis(stage.created_at),
                    to_millis(stage.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn fetch_pipeline_runs(&self, limit: u32) -> StoreResult<Vec<PipelineRun>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {PIPELINE_RUN_COLUMNS} FROM pipeline_runs ORDER BY started_at_ms DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt.query_map(params![i64::from(limit)], map_pipeline_run_row)?.collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            Ok(rows)
        })
        .await
    }

    async fn fetch_pipeline_stages(&self, run_id: &RunId) -> StoreResult<Vec<PipelineStageLog>> {
        let run_id = run_id.as_str().to_owned();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {STAGE_LOG_COLUMNS} FROM pipeline_stage_logs WHERE run_id = ?1 ORDER BY started_at_ms ASC, attempts ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt.query_map(params![run_id], map_stage_log_row)?.collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            Ok(rows)
        })
        .await
    }

    async fn upsert_viewpoints(&self, viewpoints: &[ViewpointInput]) -> StoreResult<()> {
        let viewpoints = viewpoints.to_vec();
        self.with_conn(move |conn| {
            let now_ms = to_millis(Utc::now());
            let tx = conn.transaction()?;
            for input in &viewpoints {
                tx.execute(
                    "INSERT INTO viewpoints (id, query_id, run_id, engine, domain, normalized_url, stance, supporting_annotation_id, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(id) DO UPDATE SET \
                        query_id=excluded.query_id, run_id=excluded.run_id, engine=excluded.engine, domain=excluded.domain, \
                        normalized_url=excluded.normalized_url, stance=excluded.stance, \
                        supporting_annotation_id=excluded.supporting_annotation_id, created_at_ms=excluded.created_at_ms",
                    params![
                        input.id.as_str(),
                        input.query_id.as_str(),
                        input.run_id.as_ref().map(RunId::as_str),
                        input.engine.as_str(),
                        input.domain,
                        input.normalized_url,
                        input.stance,
                        input.supporting_annotation_id.as_ref().map(AnnotationId::as_str),
                        now_ms,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn fetch_viewpoints_by_query(&self, filter: &ViewpointsFilter) -> StoreResult<Vec<Viewpoint>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {VIEWPOINT_COLUMNS} FROM viewpoints WHERE query_id = ?1 ORDER BY created_at_ms ASC");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(params![filter.query_id.as_str()], map_viewpoint_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::with_capacity(raw.len());
            for row in raw {
                rows.push(row.into_domain()?);
            }
            let rows: Vec<Viewpoint> = rows
                .into_iter()
                .filter(|v| filter.run_id.is_none() || v.run_id == filter.run_id)
                .filter(|v| filter.engines.is_empty() || filter.engines.contains(&v.engine))
                .collect();
            Ok(rows)
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn sqlite_error_from_store(err: StoreError) -> SqliteStoreError {
    match err {
        StoreError::Io(msg) => SqliteStoreError::Io(msg),
        StoreError::Corrupt(msg) => SqliteStoreError::Corrupt(msg),
        StoreError::VersionMismatch(msg) => SqliteStoreError::VersionMismatch(msg),
        StoreError::Invalid(msg) => SqliteStoreError::Invalid(msg),
        StoreError::Backend(msg) => SqliteStoreError::Db(msg),
    }
}
