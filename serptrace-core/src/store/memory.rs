// serptrace-core/src/store/memory.rs
// ============================================================================
// Module: In-Memory Storage Backend
// Description: A `Storage` implementation backed by in-process maps.
// Purpose: Test double and local fallback with the same observable semantics
//          as the SQLite-backed store.
// Dependencies: tokio (sync only, via std::sync::Mutex), polars
// ============================================================================

//! ## Overview
//! Every table is a `BTreeMap<String, T>` keyed by the entity's primary key,
//! guarded by a single `std::sync::Mutex`. This mirrors
//! `InMemoryRunStateStore` from the broader capability-store family this
//! workspace grew out of: one coarse lock, plain maps, no secondary indexes.
//! Queries that need an index (e.g. the pending-annotations anti-join) just
//! scan; the store is sized for tests and small local deployments, not
//! production query volume.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use polars::prelude::DataFrame;

use crate::identifiers::DatasetVersionId;
use crate::identifiers::RunId;
use crate::model::annotation::synthesize_run_id;
use crate::model::Annotation;
use crate::model::AnnotatedResultView;
use crate::model::AnnotationAggregate;
use crate::model::AnnotationAggregateInput;
use crate::model::AnnotationInput;
use crate::model::AuditSample;
use crate::model::AuditSampleInput;
use crate::model::CrawlRun;
use crate::model::CrawlRunInput;
use crate::model::CrawlRunStatus;
use crate::model::DatasetType;
use crate::model::DatasetVersion;
use crate::model::MetricRecord;
use crate::model::MetricRecordInput;
use crate::model::PipelineRun;
use crate::model::PipelineStageLog;
use crate::model::SearchResult;
use crate::model::SearchResultInput;
use crate::model::Viewpoint;
use crate::model::ViewpointInput;
use crate::parquet::dataset_export_path;
use crate::parquet::safe_timestamp;
use crate::parquet::write_parquet_dataset;
use crate::storage::AlternativeSourcesFilter;
use crate::storage::AnnotatedResultsFilter;
use crate::storage::AnnotationAggregatesFilter;
use crate::storage::ExportDatasetRequest;
use crate::storage::ExportedDataset;
use crate::storage::PendingAnnotationsFilter;
use crate::storage::Storage;
use crate::storage::StoreError;
use crate::storage::StoreResult;
use crate::storage::ViewpointsFilter;

/// In-process tables backing [`InMemoryStore`].
#[derive(Default)]
struct Tables {
    search_results: BTreeMap<String, SearchResult>,
    crawl_runs: BTreeMap<String, CrawlRun>,
    annotations: BTreeMap<String, Annotation>,
    annotated_view: BTreeMap<String, AnnotatedResultView>,
    metric_records: BTreeMap<String, MetricRecord>,
    aggregates: BTreeMap<String, AnnotationAggregate>,
    audit_samples: BTreeMap<String, AuditSample>,
    pipeline_runs: BTreeMap<String, PipelineRun>,
    stage_logs: BTreeMap<String, PipelineStageLog>,
    dataset_versions: Vec<DatasetVersion>,
    viewpoints: BTreeMap<String, Viewpoint>,
}

/// An in-memory [`Storage`] implementation.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Locks the tables, translating lock poisoning into a backend error.
    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store mutex poisoned".to_owned()))
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn fetch_pending_annotations(
        &self,
        filter: &PendingAnnotationsFilter,
    ) -> StoreResult<Vec<SearchResult>> {
        let tables = self.lock()?;
        let annotated: BTreeSet<&str> =
            tables.annotations.values().map(|a| a.search_result_id.as_str()).collect();
        let mut rows: Vec<SearchResult> = tables
            .search_results
            .values()
            .filter(|r| !annotated.contains(r.id.as_str()))
            .filter(|r| filter.query_ids.is_empty() || filter.query_ids.contains(&r.query_id))
            .filter(|r| filter.engines.is_empty() || filter.engines.contains(&r.engine))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        if let Some(limit) = filter.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert_search_results(&self, results: &[SearchResultInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in results {
            let key = input.id.as_str().to_owned();
            let created_at = tables.search_results.get(&key).map_or(now, |existing| existing.created_at);
            tables.search_results.insert(
                key,
                SearchResult {
                    id: input.id.clone(),
                    crawl_run_id: input.crawl_run_id.clone(),
                    query_id: input.query_id.clone(),
                    engine: input.engine.clone(),
                    rank: input.rank,
                    title: input.title.clone(),
                    snippet: input.snippet.clone(),
                    url: input.url.clone(),
                    normalized_url: input.normalized_url.clone(),
                    domain: input.domain.clone(),
                    timestamp: input.timestamp,
                    hash: input.hash.clone(),
                    raw_html_path: input.raw_html_path.clone(),
                    created_at,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn record_crawl_runs(&self, runs: &[CrawlRunInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in runs {
            let key = input.id.as_str().to_owned();
            let created_at = tables.crawl_runs.get(&key).map_or(now, |existing| existing.created_at);
            tables.crawl_runs.insert(
                key,
                CrawlRun {
                    id: input.id.clone(),
                    batch_id: input.batch_id.clone(),
                    query_id: input.query_id.clone(),
                    engine: input.engine.clone(),
                    status: input.status,
                    started_at: input.started_at,
                    completed_at: input.completed_at,
                    error: input.error.clone(),
                    result_count: input.result_count,
                    created_at,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn insert_annotation_records(&self, annotations: &[AnnotationInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in annotations {
            let key = input.id.as_str().to_owned();
            let created_at = tables.annotations.get(&key).map_or(now, |existing| existing.created_at);
            let annotation = Annotation {
                id: input.id.clone(),
                search_result_id: input.search_result_id.clone(),
                query_id: input.query_id.clone(),
                engine: input.engine.clone(),
                domain_type: input.domain_type,
                factual_consistency: input.factual_consistency,
                confidence: input.confidence,
                prompt_version: input.prompt_version.clone(),
                model_id: input.model_id.clone(),
                extra: input.extra.clone(),
                created_at,
                updated_at: now,
            };

            if let Some(result) = tables.search_results.get(annotation.search_result_id.as_str()).cloned() {
                let batch_id = result
                    .crawl_run_id
                    .as_ref()
                    .and_then(|crid| tables.crawl_runs.get(crid.as_str()))
                    .map(|run| run.batch_id.clone());
                let run_id = batch_id
                    .clone()
                    .map_or_else(|| synthesize_run_id(&result.query_id, result.timestamp), |id| id.as_str().to_owned());
                tables.annotated_view.insert(
                    key.clone(),
                    AnnotatedResultView {
                        run_id,
                        batch_id,
                        annotation_id: annotation.id.clone(),
                        query_id: result.query_id.clone(),
                        engine: result.engine.clone(),
                        normalized_url: result.normalized_url.clone(),
                        domain: result.domain.clone(),
                        rank: result.rank,
                        factual_consistency: annotation.factual_consistency,
                        domain_type: annotation.domain_type,
                        collected_at: result.timestamp,
                    },
                );
            }

            tables.annotations.insert(key, annotation);
        }
        Ok(())
    }

    async fn fetch_annotated_results(
        &self,
        filter: &AnnotatedResultsFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>> {
        let tables = self.lock()?;
        let mut rows: Vec<AnnotatedResultView> = tables
            .annotated_view
            .values()
            .filter(|v| filter.since.is_none_or(|since| v.collected_at >= since))
            .filter(|v| filter.until.is_none_or(|until| v.collected_at <= until))
            .filter(|v| filter.query_ids.is_empty() || filter.query_ids.contains(&v.query_id))
            .filter(|v| {
                filter.run_ids.is_empty()
                    || v.batch_id.as_ref().is_some_and(|b| filter.run_ids.contains(b))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.collected_at
                .cmp(&b.collected_at)
                .then_with(|| a.query_id.cmp(&b.query_id))
                .then_with(|| a.engine.cmp(&b.engine))
                .then_with(|| a.rank.cmp(&b.rank))
        });
        Ok(rows)
    }

    async fn fetch_alternative_sources(
        &self,
        filter: &AlternativeSourcesFilter,
    ) -> StoreResult<Vec<AnnotatedResultView>> {
        let tables = self.lock()?;
        let keywords = filter.query_keywords.as_ref().map(|k| k.to_lowercase());
        let mut rows: Vec<AnnotatedResultView> = tables
            .annotated_view
            .values()
            .filter(|v| filter.since.is_none_or(|since| v.collected_at >= since))
            .filter(|v| filter.domain_types.is_empty() || filter.domain_types.contains(&v.domain_type))
            .filter(|v| {
                filter.factual_consistency.is_empty()
                    || filter.factual_consistency.contains(&v.factual_consistency)
            })
            .filter(|v| !filter.exclude_urls.contains(&v.normalized_url))
            .filter(|v| {
                keywords.as_ref().is_none_or(|k| {
                    format!("{} {}", v.domain, v.normalized_url).to_lowercase().contains(k)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        rows.truncate(filter.limit as usize);
        Ok(rows)
    }

    async fn insert_metric_records(&self, records: &[MetricRecordInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in records {
            let key = input.id.as_str().to_owned();
            let created_at = tables.metric_records.get(&key).map_or(now, |existing| existing.created_at);
            tables.metric_records.insert(
                key,
                MetricRecord {
                    id: input.id.clone(),
                    crawl_run_id: input.crawl_run_id.clone(),
                    query_id: input.query_id.clone(),
                    engine: input.engine.clone(),
                    metric_type: input.metric_type.clone(),
                    value: input.value,
                    delta: input.delta,
                    compared_to_run_id: input.compared_to_run_id.clone(),
                    collected_at: input.collected_at,
                    extra: input.extra.clone(),
                    created_at,
                },
            );
        }
        Ok(())
    }

    async fn fetch_recent_metric_records(
        &self,
        metric_type: &str,
        limit: u32,
    ) -> StoreResult<Vec<MetricRecord>> {
        let tables = self.lock()?;
        let mut rows: Vec<MetricRecord> = tables
            .metric_records
            .values()
            .filter(|m| m.metric_type == metric_type)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn upsert_annotation_aggregates(&self, aggregates: &[AnnotationAggregateInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in aggregates {
            let key = input.id.as_str().to_owned();
            let created_at = tables.aggregates.get(&key).map_or(now, |existing| existing.created_at);
            tables.aggregates.insert(
                key,
                AnnotationAggregate {
                    id: input.id.clone(),
                    run_id: input.run_id.clone(),
                    query_id: input.query_id.clone(),
                    engine: input.engine.clone(),
                    domain_type: input.domain_type,
                    factual_consistency: input.factual_consistency,
                    count: input.count,
                    total_annotations: input.total_annotations,
                    collected_at: input.collected_at,
                    extra: input.extra.clone(),
                    created_at,
                },
            );
        }
        Ok(())
    }

    async fn fetch_annotation_aggregates(
        &self,
        filter: &AnnotationAggregatesFilter,
    ) -> StoreResult<Vec<AnnotationAggregate>> {
        let tables = self.lock()?;
        let mut rows: Vec<AnnotationAggregate> = tables
            .aggregates
            .values()
            .filter(|a| filter.run_ids.is_empty() || filter.run_ids.contains(&a.run_id))
            .filter(|a| filter.query_ids.is_empty() || filter.query_ids.contains(&a.query_id))
            .filter(|a| {
                filter.engines.is_empty() || a.engine.as_ref().is_some_and(|e| filter.engines.contains(e))
            })
            .filter(|a| filter.domain_types.is_empty() || filter.domain_types.contains(&a.domain_type))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.collected_at);
        Ok(rows)
    }

    async fn record_audit_samples(&self, samples: &[AuditSampleInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in samples {
            let key = input.id.as_str().to_owned();
            let created_at = tables.audit_samples.get(&key).map_or(now, |existing| existing.created_at);
            tables.audit_samples.insert(
                key,
                AuditSample {
                    id: input.id.clone(),
                    run_id: input.run_id.clone(),
                    annotation_id: input.annotation_id.clone(),
                    query_id: input.query_id.clone(),
                    engine: input.engine.clone(),
                    reviewer: input.reviewer.clone(),
                    status: input.status,
                    notes: input.notes.clone(),
                    created_at,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn fetch_audit_samples(&self, run_id: &RunId) -> StoreResult<Vec<AuditSample>> {
        let tables = self.lock()?;
        let mut rows: Vec<AuditSample> =
            tables.audit_samples.values().filter(|s| &s.run_id == run_id).cloned().collect();
        rows.sort_by_key(|s| s.created_at);
        Ok(rows)
    }

    async fn export_dataset(&self, request: &ExportDatasetRequest) -> StoreResult<ExportedDataset> {
        let (frame, record_count, distinct_queries, distinct_engines, min_ts, max_ts) = {
            let tables = self.lock()?;
            build_export_frame(&tables, request)?
        };

        let generated_at = Utc::now();
        let safe_ts = safe_timestamp(generated_at);
        let path = dataset_export_path(&request.output_dir, request.dataset_type.as_str(), &safe_ts);
        write_parquet_dataset(&frame, &path)?;

        let metadata = serde_json::json!({
            "dataset_type": request.dataset_type.as_str(),
            "filters": request.filters,
            "run_id": request.run_id.as_ref().map(crate::identifiers::RunId::as_str),
            "distinct_queries": distinct_queries,
            "distinct_engines": distinct_engines,
            "time_range": { "min": min_ts, "max": max_ts },
            "generated_at": generated_at.to_rfc3339(),
        });

        let version = DatasetVersion {
            id: DatasetVersionId::generate(),
            dataset_type: request.dataset_type,
            format: request.format,
            path: path.to_string_lossy().into_owned(),
            run_id: request.run_id.clone(),
            record_count,
            metadata,
            created_at: generated_at,
        };

        let mut tables = self.lock()?;
        tables.dataset_versions.push(version.clone());

        Ok(ExportedDataset {
            file_path: version.path.clone(),
            version,
        })
    }

    async fn record_pipeline_run(&self, run: &PipelineRun) -> StoreResult<()> {
        let mut tables = self.lock()?;
        tables.pipeline_runs.insert(run.id.as_str().to_owned(), run.clone());
        Ok(())
    }

    async fn record_pipeline_stage(&self, stage: &PipelineStageLog) -> StoreResult<()> {
        let mut tables = self.lock()?;
        tables.stage_logs.insert(stage.id.as_str().to_owned(), stage.clone());
        Ok(())
    }

    async fn fetch_pipeline_runs(&self, limit: u32) -> StoreResult<Vec<PipelineRun>> {
        let tables = self.lock()?;
        let mut rows: Vec<PipelineRun> = tables.pipeline_runs.values().cloned().collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn fetch_pipeline_stages(&self, run_id: &RunId) -> StoreResult<Vec<PipelineStageLog>> {
        let tables = self.lock()?;
        let mut rows: Vec<PipelineStageLog> =
            tables.stage_logs.values().filter(|s| &s.run_id == run_id).cloned().collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.attempts.cmp(&b.attempts)));
        Ok(rows)
    }

    async fn upsert_viewpoints(&self, viewpoints: &[ViewpointInput]) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        for input in viewpoints {
            tables.viewpoints.insert(
                input.id.as_str().to_owned(),
                Viewpoint {
                    id: input.id.clone(),
                    query_id: input.query_id.clone(),
                    run_id: input.run_id.clone(),
                    engine: input.engine.clone(),
                    domain: input.domain.clone(),
                    normalized_url: input.normalized_url.clone(),
                    stance: input.stance.clone(),
                    supporting_annotation_id: input.supporting_annotation_id.clone(),
                    created_at: now,
                },
            );
        }
        Ok(())
    }

    async fn fetch_viewpoints_by_query(&self, filter: &ViewpointsFilter) -> StoreResult<Vec<Viewpoint>> {
        let tables = self.lock()?;
        let mut rows: Vec<Viewpoint> = tables
            .viewpoints
            .values()
            .filter(|v| v.query_id == filter.query_id)
            .filter(|v| filter.run_id.is_none() || v.run_id == filter.run_id)
            .filter(|v| filter.engines.is_empty() || filter.engines.contains(&v.engine))
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.created_at);
        Ok(rows)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Builds the `polars` frame and summary statistics for one dataset export,
/// shared by all three dataset types. The actual column construction lives
/// in [`crate::parquet`] so both backends emit byte-identical frames.
fn build_export_frame(
    tables: &Tables,
    request: &ExportDatasetRequest,
) -> StoreResult<(DataFrame, u64, u64, u64, Option<String>, Option<String>)> {
    let filters = &request.filters;
    match request.dataset_type {
        DatasetType::SearchResults => {
            let rows: Vec<&SearchResult> = tables
                .search_results
                .values()
                .filter(|r| filters.query_ids.is_empty() || filters.query_ids.contains(&r.query_id))
                .filter(|r| filters.engines.is_empty() || filters.engines.contains(&r.engine))
                .filter(|r| filters.since.is_none_or(|since| r.timestamp >= since))
                .filter(|r| filters.until.is_none_or(|until| r.timestamp <= until))
                .collect();
            crate::parquet::search_results_frame(&rows)
        }
        DatasetType::AnnotatedResults => {
            let rows: Vec<&AnnotatedResultView> = tables
                .annotated_view
                .values()
                .filter(|v| filters.query_ids.is_empty() || filters.query_ids.contains(&v.query_id))
                .filter(|v| filters.engines.is_empty() || filters.engines.contains(&v.engine))
                .filter(|v| filters.since.is_none_or(|since| v.collected_at >= since))
                .filter(|v| filters.until.is_none_or(|until| v.collected_at <= until))
                .collect();
            crate::parquet::annotated_results_frame(&rows)
        }
        DatasetType::Metrics => {
            let rows: Vec<&MetricRecord> = tables
                .metric_records
                .values()
                .filter(|m| filters.query_ids.is_empty() || filters.query_ids.contains(&m.query_id))
                .filter(|m| {
                    filters.engines.is_empty() || m.engine.as_ref().is_some_and(|e| filters.engines.contains(e))
                })
                .filter(|m| filters.since.is_none_or(|since| m.collected_at >= since))
                .filter(|m| filters.until.is_none_or(|until| m.collected_at <= until))
                .collect();
            crate::parquet::metrics_frame(&rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::InMemoryStore;
    use crate::identifiers::EngineId;
    use crate::identifiers::QueryId;
    use crate::identifiers::SearchResultId;
    use crate::model::SearchResultInput;
    use crate::storage::PendingAnnotationsFilter;
    use crate::storage::Storage;

    fn sample_result(id: &str, ts_secs: i64) -> SearchResultInput {
        SearchResultInput {
            id: SearchResultId::new(id),
            crawl_run_id: None,
            query_id: QueryId::new("q1"),
            engine: EngineId::new("google"),
            rank: 0,
            title: "Title".to_owned(),
            snippet: None,
            url: format!("https://example.com/{id}"),
            normalized_url: format!("https://example.com/{id}"),
            domain: "example.com".to_owned(),
            timestamp: Utc.timestamp_opt(ts_secs, 0).single().expect("valid timestamp"),
            hash: crate::hashing::content_hash("https://example.com", "Title", "", "2026-01-01T00:00:00Z"),
            raw_html_path: None,
        }
    }

    #[tokio::test]
    async fn pending_annotations_excludes_annotated_results() {
        let store = InMemoryStore::new();
        store
            .insert_search_results(&[sample_result("r1", 100), sample_result("r2", 200)])
            .await
            .expect("insert results");

        let pending = store
            .fetch_pending_annotations(&PendingAnnotationsFilter::default())
            .await
            .expect("fetch pending");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id.as_str(), "r1");
    }

    #[tokio::test]
    async fn insert_search_results_is_idempotent_by_id() {
        let store = InMemoryStore::new();
        store.insert_search_results(&[sample_result("r1", 100)]).await.expect("first insert");
        store.insert_search_results(&[sample_result("r1", 100)]).await.expect("second insert");

        let pending = store
            .fetch_pending_annotations(&PendingAnnotationsFilter::default())
            .await
            .expect("fetch pending");
        assert_eq!(pending.len(), 1);
    }
}
