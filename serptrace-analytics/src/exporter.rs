// serptrace-analytics/src/exporter.rs
// ============================================================================
// Module: Dataset Exporter
// Description: Materialize filtered snapshots of all three datasets.
// Purpose: Drive `Storage::export_dataset` across dataset types, tolerating
//          a failure in any one without losing the others.
// Dependencies: serptrace-core, tracing
// ============================================================================

//! ## Overview
//! [`export_datasets`] calls [`Storage::export_dataset`] once per
//! [`DatasetType`], in the fixed order `DatasetType::all()` returns. A
//! failure exporting one dataset is logged and skipped; the caller always
//! gets back whichever datasets succeeded.

use serptrace_core::model::DatasetFormat;
use serptrace_core::model::DatasetType;
use serptrace_core::storage::DatasetFilter;
use serptrace_core::storage::ExportDatasetRequest;
use serptrace_core::storage::ExportedDataset;
use serptrace_core::storage::Storage;

/// Inputs to [`export_datasets`], shared across all three dataset types.
#[derive(Debug, Clone)]
pub struct ExportDatasetsRequest {
    /// Pipeline run to associate with each export.
    pub run_id: Option<serptrace_core::identifiers::RunId>,
    /// Directory each dataset's Parquet file is written under.
    pub output_dir: String,
    /// Row filters applied to every dataset type.
    pub filters: DatasetFilter,
}

/// Result of [`export_datasets`].
#[derive(Debug, Clone, Default)]
pub struct ExportDatasetsOutcome {
    /// Datasets that exported successfully, in export order.
    pub exported: Vec<ExportedDataset>,
    /// Dataset types that failed to export, in the same order they were
    /// attempted.
    pub failed: Vec<DatasetType>,
}

impl ExportDatasetsOutcome {
    /// File paths of every successfully exported dataset.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.exported.iter().map(|dataset| dataset.file_path.clone()).collect()
    }
}

/// Exports every dataset type, collecting successes and logging failures.
///
/// This call cannot fail as a whole: an individual dataset export error is
/// recorded in [`ExportDatasetsOutcome::failed`] and logged at `warn`, never
/// propagated.
pub async fn export_datasets(storage: &dyn Storage, request: &ExportDatasetsRequest) -> ExportDatasetsOutcome {
    let mut outcome = ExportDatasetsOutcome::default();
    for dataset_type in DatasetType::all() {
        let export_request = ExportDatasetRequest {
            dataset_type,
            output_dir: request.output_dir.clone(),
            run_id: request.run_id.clone(),
            format: DatasetFormat::Parquet,
            filters: request.filters.clone(),
        };
        match storage.export_dataset(&export_request).await {
            Ok(exported) => {
                tracing::info!(dataset_type = dataset_type.as_str(), file_path = %exported.file_path, "exported dataset");
                outcome.exported.push(exported);
            }
            Err(err) => {
                tracing::warn!(dataset_type = dataset_type.as_str(), error = %err, "dataset export failed, skipping");
                outcome.failed.push(dataset_type);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use serptrace_core::InMemoryStore;
    use serptrace_core::identifiers::EngineId;
    use serptrace_core::identifiers::QueryId;
    use serptrace_core::identifiers::SearchResultId;
    use serptrace_core::model::SearchResultInput;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn exports_all_three_dataset_types() {
        let store = InMemoryStore::new();
        store
            .insert_search_results(&[SearchResultInput {
                id: SearchResultId::new("r1"),
                crawl_run_id: None,
                query_id: QueryId::new("q1"),
                engine: EngineId::new("google"),
                rank: 0,
                title: "title".to_owned(),
                snippet: None,
                url: "https://example.com/1".to_owned(),
                normalized_url: "example.com/1".to_owned(),
                domain: "example.com".to_owned(),
                timestamp: chrono::Utc::now(),
                hash: "hash-r1".to_owned(),
                raw_html_path: None,
            }])
            .await
            .expect("seed result");

        let dir = tempfile::TempDir::new().expect("tempdir");
        let request = ExportDatasetsRequest {
            run_id: None,
            output_dir: dir.path().to_string_lossy().into_owned(),
            filters: DatasetFilter::default(),
        };
        let outcome = export_datasets(&store, &request).await;
        assert_eq!(outcome.exported.len(), 3);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.file_paths().len(), 3);
    }
}
