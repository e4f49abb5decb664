// serptrace-core/src/model/metrics.rs
// ============================================================================
// Module: Metrics Entities
// ============================================================================

//! Bias-metric records produced by the external metrics stage, plus the
//! annotation-aggregate rollups computed alongside them.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::AggregateId;
use crate::identifiers::CrawlRunId;
use crate::identifiers::EngineId;
use crate::identifiers::MetricRecordId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;
use crate::model::annotation::DomainType;
use crate::model::annotation::FactualConsistency;

/// A persisted bias-metric record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Primary key.
    pub id: MetricRecordId,
    /// Crawl run this metric was computed over, when applicable.
    pub crawl_run_id: Option<CrawlRunId>,
    /// Benchmark query this metric was computed for.
    pub query_id: QueryId,
    /// Engine this metric is scoped to, when engine-specific.
    pub engine: Option<EngineId>,
    /// Metric kind, e.g. `"domain_diversity"`, `"engine_overlap"`,
    /// `"factual_alignment"`.
    pub metric_type: String,
    /// Computed metric value.
    pub value: f64,
    /// Change relative to `compared_to_run_id`, when available.
    pub delta: Option<f64>,
    /// Prior run this metric is compared against, when available.
    pub compared_to_run_id: Option<RunId>,
    /// Instant this metric was computed.
    pub collected_at: DateTime<Utc>,
    /// Additional metric-specific detail.
    pub extra: Option<Value>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::insert_metric_records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecordInput {
    /// Primary key.
    pub id: MetricRecordId,
    /// Crawl run this metric was computed over, when applicable.
    pub crawl_run_id: Option<CrawlRunId>,
    /// Benchmark query this metric was computed for.
    pub query_id: QueryId,
    /// Engine this metric is scoped to, when engine-specific.
    pub engine: Option<EngineId>,
    /// Metric kind.
    pub metric_type: String,
    /// Computed metric value.
    pub value: f64,
    /// Change relative to `compared_to_run_id`, when available.
    pub delta: Option<f64>,
    /// Prior run this metric is compared against, when available.
    pub compared_to_run_id: Option<RunId>,
    /// Instant this metric was computed.
    pub collected_at: DateTime<Utc>,
    /// Additional metric-specific detail.
    pub extra: Option<Value>,
}

/// A persisted rollup of annotation counts by domain type and factual
/// consistency for one run/query/engine combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationAggregate {
    /// Primary key.
    pub id: AggregateId,
    /// Pipeline run this rollup belongs to.
    pub run_id: RunId,
    /// Benchmark query this rollup is scoped to.
    pub query_id: QueryId,
    /// Engine this rollup is scoped to, when engine-specific.
    pub engine: Option<EngineId>,
    /// Domain type bucket.
    pub domain_type: DomainType,
    /// Factual-consistency bucket.
    pub factual_consistency: FactualConsistency,
    /// Number of annotations in this bucket.
    pub count: u32,
    /// Total annotations considered for the denominator.
    pub total_annotations: u32,
    /// Instant this rollup was computed.
    pub collected_at: DateTime<Utc>,
    /// Additional rollup-specific detail.
    pub extra: Option<Value>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::upsert_annotation_aggregates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationAggregateInput {
    /// Primary key.
    pub id: AggregateId,
    /// Pipeline run this rollup belongs to.
    pub run_id: RunId,
    /// Benchmark query this rollup is scoped to.
    pub query_id: QueryId,
    /// Engine this rollup is scoped to, when engine-specific.
    pub engine: Option<EngineId>,
    /// Domain type bucket.
    pub domain_type: DomainType,
    /// Factual-consistency bucket.
    pub factual_consistency: FactualConsistency,
    /// Number of annotations in this bucket.
    pub count: u32,
    /// Total annotations considered for the denominator.
    pub total_annotations: u32,
    /// Instant this rollup was computed.
    pub collected_at: DateTime<Utc>,
    /// Additional rollup-specific detail.
    pub extra: Option<Value>,
}
