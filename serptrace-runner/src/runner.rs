// serptrace-runner/src/runner.rs
// ============================================================================
// Module: Pipeline Runner
// Description: Drives the collector, annotation, and metrics stages for a
//              single pipeline run, with per-stage retry and bookkeeping.
// Purpose: Core orchestration loop of the search-transparency pipeline.
// Dependencies: serptrace-core, serptrace-ingestion, serptrace-audit,
//               serptrace-analytics, tokio
// ============================================================================

//! ## Overview
//! [`Runner::run_once`] is the single entry point used by both the
//! scheduler and the CLI's `run-once` command. A [`std::sync::atomic::AtomicBool`]
//! guards against concurrent runs on the same process: a trigger arriving
//! while a run is already in flight logs a warning and returns successfully
//! rather than queuing or erroring. Within a run, the three stages execute
//! strictly sequentially through [`Runner::execute_stage`], which owns the
//! stage's [`PipelineStageLog`] row across retry attempts so that
//! `started_at`/`created_at` stay stable even though the storage backends
//! upsert by id with no field-merging of their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use serde_json::json;
use serptrace_analytics::ExportDatasetsRequest;
use serptrace_analytics::ReportRequest;
use serptrace_core::identifiers::RunId;
use serptrace_core::identifiers::StageLogId;
use serptrace_core::model::PipelineRun;
use serptrace_core::model::PipelineStage;
use serptrace_core::model::PipelineStageLog;
use serptrace_core::model::RunStatus;
use serptrace_core::storage::DatasetFilter;
use serptrace_core::storage::Storage;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::error::StageError;
use crate::ports::AnnotationContext;
use crate::ports::AnnotationPort;
use crate::ports::CollectorContext;
use crate::ports::CollectorPort;
use crate::ports::MetricsContext;
use crate::ports::MetricsPort;
use crate::sanitizer;

/// Drives a single pipeline run end to end.
pub struct Runner {
    storage: Arc<dyn Storage>,
    config: RunnerConfig,
    collector_port: Arc<dyn CollectorPort>,
    annotation_port: Arc<dyn AnnotationPort>,
    metrics_port: Arc<dyn MetricsPort>,
    running: AtomicBool,
}

impl Runner {
    /// Builds a runner over the given storage handle, configuration, and
    /// external stage ports.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        config: RunnerConfig,
        collector_port: Arc<dyn CollectorPort>,
        annotation_port: Arc<dyn AnnotationPort>,
        metrics_port: Arc<dyn MetricsPort>,
    ) -> Self {
        Self { storage, config, collector_port, annotation_port, metrics_port, running: AtomicBool::new(false) }
    }

    /// Returns whether a run is currently in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs the pipeline once: collector, then annotation, then an
    /// audit sample, then metrics. A concurrent call while a run is already
    /// in flight is logged and treated as a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when a stage exhausts its retry budget or a
    /// storage call outside of a stage fails. The failing run is recorded
    /// with `status = failed` before the error is returned.
    pub async fn run_once(&self) -> Result<(), RunnerError> {
        if self.running.compare_exchange(false, true, Ordering::Release, Ordering::Acquire).is_err() {
            tracing::warn!("pipeline run already in progress, skipping trigger");
            return Ok(());
        }
        let result = self.run_once_inner().await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_once_inner(&self) -> Result<(), RunnerError> {
        let run_id = RunId::generate();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, "pipeline run starting");

        let mut run = PipelineRun {
            id: run_id.clone(),
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            error: None,
            metadata: json!({}),
            created_at: started_at,
            updated_at: started_at,
        };
        self.storage.record_pipeline_run(&run).await?;

        match self.drive_stages(&run_id).await {
            Ok(metadata) => {
                run.status = RunStatus::Completed;
                run.completed_at = Some(Utc::now());
                run.metadata = metadata;
                run.updated_at = Utc::now();
                self.storage.record_pipeline_run(&run).await?;
                tracing::info!(run_id = %run_id, "pipeline run completed");
                Ok(())
            }
            Err(err) => {
                run.status = RunStatus::Failed;
                run.completed_at = Some(Utc::now());
                run.error = Some(err.to_string());
                run.updated_at = Utc::now();
                self.storage.record_pipeline_run(&run).await?;
                tracing::error!(run_id = %run_id, error = %err, "pipeline run failed");
                Err(err)
            }
        }
    }

    async fn drive_stages(&self, run_id: &RunId) -> Result<Value, RunnerError> {
        let collector_metadata = self.execute_stage(run_id, PipelineStage::Collector, || self.run_collector(run_id)).await?;

        let annotation_metadata =
            self.execute_stage(run_id, PipelineStage::Annotation, || self.run_annotation(run_id)).await?;

        let audit_value = self.run_audit_sample(run_id).await;
        let annotation_metadata = merge_audit(annotation_metadata, audit_value);

        let metrics_metadata = self.execute_stage(run_id, PipelineStage::Metrics, || self.run_metrics(run_id)).await?;

        let aggregated = json!({
            "run_id": run_id.as_str(),
            "collector": collector_metadata,
            "annotation": annotation_metadata,
            "metrics": metrics_metadata,
        });
        Ok(sanitizer::sanitize(&aggregated))
    }

    /// Executes a stage closure with retry, owning its `PipelineStageLog`
    /// row across attempts so `started_at`/`created_at` stay stable.
    async fn execute_stage<F, Fut>(&self, run_id: &RunId, stage: PipelineStage, f: F) -> Result<Value, RunnerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<Value, StageError>>,
    {
        let started_at = Utc::now();
        let mut log = PipelineStageLog {
            id: StageLogId::generate(),
            run_id: run_id.clone(),
            stage,
            status: RunStatus::Running,
            attempts: 0,
            started_at,
            completed_at: None,
            error: None,
            metadata: json!({}),
            created_at: started_at,
            updated_at: started_at,
        };
        self.storage.record_pipeline_stage(&log).await?;

        let max_attempts = 1 + self.config.max_retries;
        loop {
            log.attempts += 1;
            log.status = RunStatus::Running;
            log.updated_at = Utc::now();
            self.storage.record_pipeline_stage(&log).await?;

            match f().await {
                Ok(metadata) => {
                    log.status = RunStatus::Completed;
                    log.completed_at = Some(Utc::now());
                    log.error = None;
                    log.metadata = sanitizer::sanitize(&metadata);
                    log.updated_at = Utc::now();
                    self.storage.record_pipeline_stage(&log).await?;
                    return Ok(metadata);
                }
                Err(err) => {
                    let retries_left = max_attempts.saturating_sub(log.attempts);
                    if retries_left > 0 {
                        tracing::warn!(
                            stage = stage.as_str(),
                            attempt = log.attempts,
                            retries_left,
                            error = %err,
                            "pipeline stage retry"
                        );
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                        continue;
                    }
                    log.status = RunStatus::Failed;
                    log.completed_at = Some(Utc::now());
                    log.error = Some(err.to_string());
                    log.updated_at = Utc::now();
                    self.storage.record_pipeline_stage(&log).await?;
                    return Err(RunnerError::StageFailed { stage: stage.as_str(), attempts: log.attempts, source: err });
                }
            }
        }
    }

    async fn run_collector(&self, run_id: &RunId) -> Result<Value, StageError> {
        let ctx = CollectorContext {
            run_id: run_id.to_string(),
            collector_output_dir: self.config.collector_output_dir.clone(),
        };
        self.collector_port.run_collection(&ctx).await.map_err(|err| StageError::Port(err.to_string()))?;

        let ingest_request = serptrace_ingestion::IngestRequest {
            directory: PathBuf::from(&self.config.collector_output_dir),
            run_id: run_id.clone(),
            collector_output_dir: self.config.collector_output_dir.clone(),
        };
        let summary = serptrace_ingestion::ingest_directory(self.storage.as_ref(), &ingest_request).await?;
        Ok(json!({
            "ingested_results": summary.ingested_results,
            "runs": summary.runs,
            "hash_duplicate_count": summary.hash_duplicate_count,
            "url_duplicate_count": summary.url_duplicate_count,
        }))
    }

    async fn run_annotation(&self, run_id: &RunId) -> Result<Value, StageError> {
        let ctx = AnnotationContext { run_id: run_id.to_string() };
        self.annotation_port.run_annotation(&ctx).await.map_err(|err| StageError::Port(err.to_string()))?;
        Ok(json!({ "status": "completed" }))
    }

    /// Draws the manual audit sample between annotation and metrics. Never
    /// fails the pipeline; a sampling failure is logged and recorded in the
    /// returned JSON value instead of being propagated.
    async fn run_audit_sample(&self, run_id: &RunId) -> Value {
        let result =
            serptrace_audit::draw_audit_sample(self.storage.as_ref(), run_id, None, self.config.manual_audit_sample_percent)
                .await;
        match result {
            Ok(summary) => {
                json!({ "sampled": summary.sampled, "total_annotated": summary.total_annotated })
            }
            Err(err) => {
                tracing::warn!(run_id = %run_id, error = %err, "audit sampling failed, continuing");
                json!({ "error": err.to_string() })
            }
        }
    }

    async fn run_metrics(&self, run_id: &RunId) -> Result<Value, StageError> {
        let ctx = MetricsContext { run_id: run_id.to_string() };
        self.metrics_port.run_metrics(&ctx).await.map_err(|err| StageError::Port(err.to_string()))?;

        let export_request = ExportDatasetsRequest {
            run_id: Some(run_id.clone()),
            output_dir: self.config.export.output_dir.clone(),
            filters: DatasetFilter::default(),
        };
        let outcome = serptrace_analytics::export_datasets(self.storage.as_ref(), &export_request).await;
        if !outcome.failed.is_empty() {
            tracing::warn!(run_id = %run_id, failed = ?outcome.failed, "some datasets failed to export");
        }

        let report_request = ReportRequest {
            run_id: run_id.clone(),
            output_dir: self.config.report.output_dir.clone(),
            benchmark_queries_path: self.config.report.benchmark_queries_path.clone(),
        };
        if let Err(err) = serptrace_analytics::generate_transparency_report(self.storage.as_ref(), &report_request).await {
            tracing::warn!(run_id = %run_id, error = %err, "transparency report generation failed, continuing");
        }

        Ok(json!({
            "dataset_exports": outcome.file_paths(),
            "export_count": outcome.exported.len(),
        }))
    }
}

fn merge_audit(annotation_metadata: Value, audit: Value) -> Value {
    match annotation_metadata {
        Value::Object(mut map) => {
            map.insert("audit".to_owned(), audit);
            Value::Object(map)
        }
        other => json!({ "result": other, "audit": audit }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering as AtomicOrdering;

    use async_trait::async_trait;
    use serptrace_core::InMemoryStore;

    use super::*;
    use crate::error::AnnotationPortError;
    use crate::error::CollectorPortError;
    use crate::error::MetricsPortError;
    use crate::ports::NoopStagePort;

    fn test_config() -> RunnerConfig {
        RunnerConfig {
            cron_expression: "0 * * * *".to_owned(),
            timezone: "UTC".to_owned(),
            run_on_start: false,
            max_retries: 0,
            retry_delay_ms: 1000,
            collector_output_dir: "data/serp".to_owned(),
            manual_audit_sample_percent: 5,
            storage: crate::config::StorageConfig::default(),
            export: crate::config::ExportConfig::default(),
            report: crate::config::ReportConfig::default(),
            collector_command: None,
            annotation_command: None,
            metrics_command: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_once_with_noop_ports_completes_and_records_run() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let port = Arc::new(NoopStagePort);
        let runner = Runner::new(storage.clone(), test_config(), port.clone(), port.clone(), port);

        runner.run_once().await.expect("run_once");
        assert!(!runner.is_running());

        let runs = storage.fetch_pipeline_runs(10).await.expect("fetch runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);

        let stages = storage.fetch_pipeline_stages(&runs[0].id).await.expect("fetch stages");
        assert_eq!(stages.len(), 3);
        assert!(stages.iter().all(|stage| stage.status == RunStatus::Completed));
        assert!(stages.iter().all(|stage| stage.attempts == 1));
    }

    struct AlwaysFailsPort;

    #[async_trait]
    impl CollectorPort for AlwaysFailsPort {
        async fn run_collection(&self, _ctx: &CollectorContext) -> Result<(), CollectorPortError> {
            Err(CollectorPortError::Failed("boom".to_owned()))
        }
    }

    #[async_trait]
    impl AnnotationPort for AlwaysFailsPort {
        async fn run_annotation(&self, _ctx: &AnnotationContext) -> Result<(), AnnotationPortError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsPort for AlwaysFailsPort {
        async fn run_metrics(&self, _ctx: &MetricsContext) -> Result<(), MetricsPortError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_collector_marks_run_and_stage_failed() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let noop = Arc::new(NoopStagePort);
        let failing = Arc::new(AlwaysFailsPort);
        let mut config = test_config();
        config.max_retries = 0;
        let runner = Runner::new(storage.clone(), config, failing, noop.clone(), noop);

        let result = runner.run_once().await;
        assert!(result.is_err());
        assert!(!runner.is_running());

        let runs = storage.fetch_pipeline_runs(10).await.expect("fetch runs");
        assert_eq!(runs[0].status, RunStatus::Failed);

        let stages = storage.fetch_pipeline_stages(&runs[0].id).await.expect("fetch stages");
        let collector_stage = stages.iter().find(|stage| stage.stage == PipelineStage::Collector).expect("collector stage");
        assert_eq!(collector_stage.status, RunStatus::Failed);
        assert_eq!(collector_stage.attempts, 1);
    }

    struct FlakyCollectorPort {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl CollectorPort for FlakyCollectorPort {
        async fn run_collection(&self, _ctx: &CollectorContext) -> Result<(), CollectorPortError> {
            if self.failures_remaining.fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                if n == 0 { None } else { Some(n - 1) }
            }).is_ok()
            {
                return Err(CollectorPortError::Failed("flaky".to_owned()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AnnotationPort for FlakyCollectorPort {
        async fn run_annotation(&self, _ctx: &AnnotationContext) -> Result<(), AnnotationPortError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsPort for FlakyCollectorPort {
        async fn run_metrics(&self, _ctx: &MetricsContext) -> Result<(), MetricsPortError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stage_succeeds_after_retries_within_budget() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let flaky = Arc::new(FlakyCollectorPort { failures_remaining: AtomicU32::new(1) });
        let noop = Arc::new(NoopStagePort);
        let mut config = test_config();
        config.max_retries = 2;
        config.retry_delay_ms = 5;
        let runner = Runner::new(storage.clone(), config, flaky, noop.clone(), noop);

        runner.run_once().await.expect("run_once should succeed after one retry");

        let runs = storage.fetch_pipeline_runs(10).await.expect("fetch runs");
        assert_eq!(runs[0].status, RunStatus::Completed);
        let stages = storage.fetch_pipeline_stages(&runs[0].id).await.expect("fetch stages");
        let collector_stage = stages.iter().find(|stage| stage.stage == PipelineStage::Collector).expect("collector stage");
        assert_eq!(collector_stage.attempts, 2);
    }

    struct SlowCollectorPort;

    #[async_trait]
    impl CollectorPort for SlowCollectorPort {
        async fn run_collection(&self, _ctx: &CollectorContext) -> Result<(), CollectorPortError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }

    #[async_trait]
    impl AnnotationPort for SlowCollectorPort {
        async fn run_annotation(&self, _ctx: &AnnotationContext) -> Result<(), AnnotationPortError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MetricsPort for SlowCollectorPort {
        async fn run_metrics(&self, _ctx: &MetricsContext) -> Result<(), MetricsPortError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_trigger_is_swallowed_as_a_warning() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let slow = Arc::new(SlowCollectorPort);
        let noop = Arc::new(NoopStagePort);
        let runner = Arc::new(Runner::new(storage.clone(), test_config(), slow, noop.clone(), noop));

        let first = Arc::clone(&runner);
        let second = Arc::clone(&runner);
        let (first_result, second_result) =
            tokio::join!(tokio::spawn(async move { first.run_once().await }), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                second.run_once().await
            });

        first_result.expect("first task did not panic").expect("first run_once");
        second_result.expect("second run_once returns Ok even though a run was already in flight");

        let runs = storage.fetch_pipeline_runs(10).await.expect("fetch runs");
        assert_eq!(runs.len(), 1, "the in-flight trigger must not start a second run");
    }
}
