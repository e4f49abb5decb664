// serptrace-core/src/store/shared.rs
// ============================================================================
// Module: Shared Storage Handle
// ============================================================================

//! A cheaply cloneable handle wrapping any [`Storage`] implementation behind
//! a trait object, so the runner and CLI do not need to be generic over the
//! concrete backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::identifiers::RunId;
use crate::model::AnnotatedResultView;
use crate::model::AnnotationAggregate;
use crate::model::AuditSample;
use crate::model::MetricRecord;
use crate::model::PipelineRun;
use crate::model::PipelineStageLog;
use crate::model::SearchResult;
use crate::model::Viewpoint;
use crate::storage::AlternativeSourcesFilter;
use crate::storage::AnnotatedResultsFilter;
use crate::storage::AnnotationAggregatesFilter;
use crate::storage::ExportDatasetRequest;
use crate::storage::ExportedDataset;
use crate::storage::PendingAnnotationsFilter;
use crate::storage::Storage;
use crate::storage::StoreResult;
use crate::storage::ViewpointsFilter;

/// `Arc<dyn Storage>`, newtyped so it can carry inherent constructors.
#[derive(Clone)]
pub struct SharedStorage(Arc<dyn Storage>);

impl SharedStorage {
    /// Wraps an already-constructed storage implementation.
    #[must_use]
    pub fn new(store: impl Storage + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Wraps an existing `Arc<dyn Storage>` without re-allocating.
    #[must_use]
    pub fn from_arc(store: Arc<dyn Storage>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl Storage for SharedStorage {
    async fn fetch_pending_annotations(
        &self,
        filter: &PendingAnnotationsFilter,
    ) -> StoreResult<Vec<SearchResult>> {
        self.0.fetch_pending_annotations(filter).await
    }

    async fn insert_search_results(
        &self,
        results: &[crate::model::SearchResultInput],
    ) -> StoreResult<()> {
        self.0.insert_search_results(results).await
    }

    async fn record_crawl_runs(&self, runs: &[crate::model::CrawlRunInput]) -> StoreResult<()> {
        self.0.record_crawl_runs(runs).await
    }

    async fn insert_annotation_records(
        &self,
        annotations: &[crate::model::AnnotationInput],
    ) -> StoreResult<()> {
        self.0.insert_annotation_records(annotations).await
    }

    async fn fetch_annotated_results(
        &self,
        filter: &AnnotatedResultsFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>> {
        self.0.fetch_annotated_results(filter).await
    }

    async fn fetch_alternative_sources(
        &self,
        filter: &AlternativeSourcesFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>> {
        self.0.fetch_alternative_sources(filter).await
    }

    async fn insert_metric_records(
        &self,
        records: &[crate::model::MetricRecordInput],
    ) -> StoreResult<()> {
        self.0.insert_metric_records(records).await
    }

    async fn fetch_recent_metric_records(
        &self,
        metric_type: &str,
        limit: u32,
    ) -> StoreResult<Vec<MetricRecord>> {
        self.0.fetch_recent_metric_records(metric_type, limit).await
    }

    async fn upsert_annotation_aggregates(
        &self,
        aggregates: &[crate::model::AnnotationAggregateInput],
    ) -> StoreResult<()> {
        self.0.upsert_annotation_aggregates(aggregates).await
    }

    async fn fetch_annotation_aggregates(
        &self,
        filter: &AnnotationAggregatesFilter,
    ) -> StoreResult<Vec<AnnotationAggregate>> {
        self.0.fetch_annotation_aggregates(filter).await
    }

    async fn record_audit_samples(&self, samples: &[crate::model::AuditSampleInput]) -> StoreResult<()> {
        self.0.record_audit_samples(samples).await
    }

    async fn fetch_audit_samples(&self, run_id: &RunId) -> StoreResult<Vec<AuditSample>> {
        self.0.fetch_audit_samples(run_id).await
    }

    async fn export_dataset(&self, request: &ExportDatasetRequest) -> StoreResult<ExportedDataset> {
        self.0.export_dataset(request).await
    }

    async fn record_pipeline_run(&self, run: &PipelineRun) -> StoreResult<()> {
        self.0.record_pipeline_run(run).await
    }

    async fn record_pipeline_stage(&self, stage: &PipelineStageLog) -> StoreResult<()> {
        self.0.record_pipeline_stage(stage).await
    }

    async fn fetch_pipeline_runs(&self, limit: u32) -> StoreResult<Vec<PipelineRun>> {
        self.0.fetch_pipeline_runs(limit).await
    }

    async fn fetch_pipeline_stages(&self, run_id: &RunId) -> StoreResult<Vec<PipelineStageLog>> {
        self.0.fetch_pipeline_stages(run_id).await
    }

    async fn upsert_viewpoints(&self, viewpoints: &[crate::model::ViewpointInput]) -> StoreResult<()> {
        self.0.upsert_viewpoints(viewpoints).await
    }

    async fn fetch_viewpoints_by_query(&self, filter: &ViewpointsFilter) -> StoreResult<Vec<Viewpoint>> {
        self.0.fetch_viewpoints_by_query(filter).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.0.close().await
    }
}
