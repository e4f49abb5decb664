// serptrace-core/src/storage.rs
// ============================================================================
// Module: Serptrace Storage Contract
// Description: The capability surface every storage backend implements.
// Purpose: Idempotent persistence and time/filter-bounded queries over the
//          entity model, with identical semantics across backends.
// Dependencies: async-trait, chrono
// ============================================================================

//! ## Overview
//! `Storage` is a single narrow trait covering every persistence operation
//! the pipeline needs. Two implementations exist: an in-memory store (this
//! crate, used in tests and as a local fallback) and a SQLite-backed store
//! (`serptrace-store-sqlite`, used in production). Callers program to the
//! trait and never branch on which backend is in play.

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;
use crate::model::Annotation;
use crate::model::AnnotatedResultView;
use crate::model::AnnotationAggregate;
use crate::model::AnnotationAggregateInput;
use crate::model::AnnotationInput;
use crate::model::AuditSample;
use crate::model::AuditSampleInput;
use crate::model::CrawlRunInput;
use crate::model::DatasetFormat;
use crate::model::DatasetType;
use crate::model::DatasetVersion;
use crate::model::DomainType;
use crate::model::FactualConsistency;
use crate::model::MetricRecord;
use crate::model::MetricRecordInput;
use crate::model::PipelineRun;
use crate::model::PipelineStageLog;
use crate::model::SearchResult;
use crate::model::SearchResultInput;
use crate::model::Viewpoint;
use crate::model::ViewpointInput;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by a [`Storage`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O failure occurred opening or writing the backing store.
    #[error("storage io failure: {0}")]
    Io(String),
    /// A row failed to decode; the stored payload is inconsistent with the
    /// expected schema.
    #[error("storage row is corrupt: {0}")]
    Corrupt(String),
    /// The on-disk schema version is newer or older than this binary
    /// supports.
    #[error("storage schema version mismatch: {0}")]
    VersionMismatch(String),
    /// The caller supplied an invalid argument (e.g. an unsupported export
    /// format).
    #[error("invalid storage request: {0}")]
    Invalid(String),
    /// A backend-specific failure not covered by the other variants.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Convenience alias for storage operation results.
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// SECTION: Query / Filter Parameters
// ============================================================================

/// Filters for [`Storage::fetch_pending_annotations`].
#[derive(Debug, Clone, Default)]
pub struct PendingAnnotationsFilter {
    /// Restrict to these queries, when non-empty.
    pub query_ids: Vec<QueryId>,
    /// Restrict to these engines, when non-empty.
    pub engines: Vec<EngineId>,
    /// Maximum number of rows to return.
    pub limit: Option<u32>,
}

/// Filters for [`Storage::fetch_annotated_results`].
#[derive(Debug, Clone, Default)]
pub struct AnnotatedResultsFilter {
    /// Inclusive lower bound on `collected_at`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `collected_at`.
    pub until: Option<DateTime<Utc>>,
    /// Restrict to these queries, when non-empty.
    pub query_ids: Vec<QueryId>,
    /// Restrict to these pipeline runs, when non-empty.
    pub run_ids: Vec<RunId>,
}

/// Filters for [`Storage::fetch_alternative_sources`].
#[derive(Debug, Clone, Default)]
pub struct AlternativeSourcesFilter {
    /// Inclusive lower bound on `collected_at`.
    pub since: Option<DateTime<Utc>>,
    /// Restrict to these domain types, when non-empty.
    pub domain_types: Vec<DomainType>,
    /// Restrict to these factual-consistency labels, when non-empty.
    pub factual_consistency: Vec<FactualConsistency>,
    /// Exclude results whose `normalized_url` appears here.
    pub exclude_urls: Vec<String>,
    /// Case-insensitive substring match against `"{domain} {normalized_url}"`.
    pub query_keywords: Option<String>,
    /// Maximum number of rows to return.
    pub limit: u32,
}

/// Filters for [`Storage::fetch_annotation_aggregates`].
#[derive(Debug, Clone, Default)]
pub struct AnnotationAggregatesFilter {
    /// Restrict to these pipeline runs, when non-empty.
    pub run_ids: Vec<RunId>,
    /// Restrict to these queries, when non-empty.
    pub query_ids: Vec<QueryId>,
    /// Restrict to these engines, when non-empty.
    pub engines: Vec<EngineId>,
    /// Restrict to these domain types, when non-empty.
    pub domain_types: Vec<DomainType>,
}

/// Filters shared by dataset export calls across all three dataset types.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetFilter {
    /// Restrict to these queries, when non-empty.
    pub query_ids: Vec<QueryId>,
    /// Restrict to these engines, when non-empty.
    pub engines: Vec<EngineId>,
    /// Inclusive lower bound on the dataset's timestamp column.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the dataset's timestamp column.
    pub until: Option<DateTime<Utc>>,
}

/// Request to [`Storage::export_dataset`].
#[derive(Debug, Clone)]
pub struct ExportDatasetRequest {
    /// Which logical dataset to export.
    pub dataset_type: DatasetType,
    /// Directory the output file is written under (a `{dataset_type}/`
    /// subdirectory is created inside it).
    pub output_dir: String,
    /// Pipeline run to associate with the resulting [`DatasetVersion`].
    pub run_id: Option<RunId>,
    /// On-disk format; only [`DatasetFormat::Parquet`] is currently
    /// supported.
    pub format: DatasetFormat,
    /// Row filters to apply before export.
    pub filters: DatasetFilter,
}

/// Result of [`Storage::export_dataset`].
#[derive(Debug, Clone)]
pub struct ExportedDataset {
    /// The persisted bookkeeping row for this export.
    pub version: DatasetVersion,
    /// Path to the written file (duplicated from `version.path` for
    /// caller convenience).
    pub file_path: String,
}

/// Filters for [`Storage::fetch_viewpoints_by_query`].
#[derive(Debug, Clone)]
pub struct ViewpointsFilter {
    /// Benchmark query to fetch viewpoints for.
    pub query_id: QueryId,
    /// Restrict to this pipeline run, when set.
    pub run_id: Option<RunId>,
    /// Restrict to these engines, when non-empty.
    pub engines: Vec<EngineId>,
}

// ============================================================================
// SECTION: Storage Trait
// ============================================================================

/// The capability surface implemented by every storage backend.
///
/// Every insert/record/upsert method is idempotent by primary key: calling
/// it twice with the same id overwrites rather than duplicates.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns search results with no [`Annotation`] row, ordered by
    /// `timestamp ASC`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_pending_annotations(
        &self,
        filter: &PendingAnnotationsFilter,
    ) -> StoreResult<Vec<SearchResult>>;

    /// Upserts search results by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn insert_search_results(&self, results: &[SearchResultInput]) -> StoreResult<()>;

    /// Upserts crawl runs by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn record_crawl_runs(&self, runs: &[CrawlRunInput]) -> StoreResult<()>;

    /// Upserts annotations by `id`, and for each annotation updates the
    /// materialized annotated-result view keyed by `annotation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn insert_annotation_records(&self, annotations: &[AnnotationInput]) -> StoreResult<()>;

    /// Returns annotated-result view rows filtered on `collected_at` and
    /// optional query/run filters, ordered by
    /// `(collected_at ASC, query_id ASC, engine ASC, rank ASC)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_annotated_results(
        &self,
        filter: &AnnotatedResultsFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>>;

    /// Returns annotated-result view rows matching every supplied predicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_alternative_sources(
        &self,
        filter: &AlternativeSourcesFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>>;

    /// Upserts metric records by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn insert_metric_records(&self, records: &[MetricRecordInput]) -> StoreResult<()>;

    /// Returns the most recent `limit` metric records of `metric_type`,
    /// newest-first by `collected_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_recent_metric_records(
        &self,
        metric_type: &str,
        limit: u32,
    ) -> StoreResult<Vec<MetricRecord>>;

    /// Upserts annotation aggregates by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn upsert_annotation_aggregates(
        &self,
        aggregates: &[AnnotationAggregateInput],
    ) -> StoreResult<()>;

    /// Returns annotation aggregates matching the supplied filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_annotation_aggregates(
        &self,
        filter: &AnnotationAggregatesFilter,
    ) -> StoreResult<Vec<AnnotationAggregate>>;

    /// Upserts audit samples by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn record_audit_samples(&self, samples: &[AuditSampleInput]) -> StoreResult<()>;

    /// Returns every audit sample recorded for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_audit_samples(&self, run_id: &RunId) -> StoreResult<Vec<AuditSample>>;

    /// Materializes a filtered snapshot of one dataset type to disk and
    /// records a [`DatasetVersion`] row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for an unsupported format, or
    /// [`StoreError`] on backend/I/O failure.
    async fn export_dataset(&self, request: &ExportDatasetRequest) -> StoreResult<ExportedDataset>;

    /// Upserts a pipeline run row by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn record_pipeline_run(&self, run: &PipelineRun) -> StoreResult<()>;

    /// Upserts a pipeline stage log row by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn record_pipeline_stage(&self, stage: &PipelineStageLog) -> StoreResult<()>;

    /// Returns the most recent pipeline runs, newest-first by `started_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_pipeline_runs(&self, limit: u32) -> StoreResult<Vec<PipelineRun>>;

    /// Returns the stage logs for `run_id`, ordered by
    /// `(started_at ASC, attempts ASC)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_pipeline_stages(&self, run_id: &RunId) -> StoreResult<Vec<PipelineStageLog>>;

    /// Upserts viewpoints by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn upsert_viewpoints(&self, viewpoints: &[ViewpointInput]) -> StoreResult<()>;

    /// Returns viewpoints for a query, ordered by `created_at ASC`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn fetch_viewpoints_by_query(&self, filter: &ViewpointsFilter) -> StoreResult<Vec<Viewpoint>>;

    /// Releases any resources held by the backend (file handles,
    /// connections). Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failure.
    async fn close(&self) -> StoreResult<()>;
}
