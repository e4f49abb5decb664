// serptrace-core/src/parquet.rs
// ============================================================================
// Module: Parquet Export Helper
// Description: Shared Parquet-writing routine used by every storage backend.
// Dependencies: polars
// ============================================================================

//! ## Overview
//! Both the in-memory store and the SQLite-backed store materialize
//! dataset exports as Parquet files. This module holds the one place that
//! actually drives `polars`' writer so the two backends stay byte-for-byte
//! consistent in compression and statistics settings.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use polars::io::parquet::write::ParquetCompression;
use polars::io::parquet::write::ParquetWriter;
use polars::io::parquet::write::StatisticsOptions;
use polars::prelude::DataFrame;
use polars::prelude::NamedFrom;
use polars::prelude::Series;

use crate::identifiers::EngineId;
use crate::model::AnnotatedResultView;
use crate::model::MetricRecord;
use crate::model::SearchResult;
use crate::storage::StoreError;

/// Summary statistics every dataset export reports alongside its row count.
#[allow(clippy::type_complexity, reason = "internal helper tuple, not a public contract")]
type ExportFrame = (DataFrame, u64, u64, u64, Option<String>, Option<String>);

/// Writes `frame` to `path` as a Parquet file with Zstd compression and
/// default column statistics, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the parent directory cannot be created or
/// the file cannot be opened, and [`StoreError::Backend`] if the Parquet
/// writer fails.
pub fn write_parquet_dataset(frame: &DataFrame, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
    }
    let file = File::create(path).map_err(|err| StoreError::Io(err.to_string()))?;
    let mut writer = BufWriter::new(file);
    let mut clone = frame.clone();
    ParquetWriter::new(&mut writer)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(&mut clone)
        .map_err(|err| StoreError::Backend(format!("parquet write failed: {err}")))?;
    Ok(())
}

/// Builds the output path for a dataset export:
/// `{output_dir}/{dataset_type}/{dataset_type}-{safe_timestamp}.parquet`.
#[must_use]
pub fn dataset_export_path(output_dir: &str, dataset_type: &str, safe_timestamp: &str) -> std::path::PathBuf {
    Path::new(output_dir)
        .join(dataset_type)
        .join(format!("{dataset_type}-{safe_timestamp}.parquet"))
}

/// Replaces `:` and `.` in an ISO-8601 instant so it is safe to use in a file
/// name.
#[must_use]
pub fn safe_timestamp(instant: chrono::DateTime<chrono::Utc>) -> String {
    instant.to_rfc3339().replace([':', '.'], "-")
}

/// Builds the `search_results` export frame and its summary statistics.
/// Shared by every backend so the two implementations of
/// [`crate::storage::Storage::export_dataset`] stay consistent.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if `polars` rejects the assembled columns.
pub fn search_results_frame(rows: &[&SearchResult]) -> Result<ExportFrame, StoreError> {
    let queries: BTreeSet<&str> = rows.iter().map(|r| r.query_id.as_str()).collect();
    let engines: BTreeSet<&str> = rows.iter().map(|r| r.engine.as_str()).collect();
    let min_ts = rows.iter().map(|r| r.timestamp).min().map(|t| t.to_rfc3339());
    let max_ts = rows.iter().map(|r| r.timestamp).max().map(|t| t.to_rfc3339());
    let frame = DataFrame::new(vec![
        Series::new("id".into(), rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>()),
        Series::new("query_id".into(), rows.iter().map(|r| r.query_id.as_str()).collect::<Vec<_>>()),
        Series::new("engine".into(), rows.iter().map(|r| r.engine.as_str()).collect::<Vec<_>>()),
        Series::new("rank".into(), rows.iter().map(|r| r.rank).collect::<Vec<_>>()),
        Series::new("title".into(), rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>()),
        Series::new("url".into(), rows.iter().map(|r| r.url.as_str()).collect::<Vec<_>>()),
        Series::new("normalized_url".into(), rows.iter().map(|r| r.normalized_url.as_str()).collect::<Vec<_>>()),
        Series::new("domain".into(), rows.iter().map(|r| r.domain.as_str()).collect::<Vec<_>>()),
        Series::new("timestamp".into(), rows.iter().map(|r| r.timestamp.to_rfc3339()).collect::<Vec<_>>()),
        Series::new("hash".into(), rows.iter().map(|r| r.hash.as_str()).collect::<Vec<_>>()),
    ])
    .map_err(|err| StoreError::Backend(format!("failed to build search_results frame: {err}")))?;
    Ok((frame, rows.len() as u64, queries.len() as u64, engines.len() as u64, min_ts, max_ts))
}

/// Builds the `annotated_results` export frame and its summary statistics.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if `polars` rejects the assembled columns.
pub fn annotated_results_frame(rows: &[&AnnotatedResultView]) -> Result<ExportFrame, StoreError> {
    let queries: BTreeSet<&str> = rows.iter().map(|v| v.query_id.as_str()).collect();
    let engines: BTreeSet<&str> = rows.iter().map(|v| v.engine.as_str()).collect();
    let min_ts = rows.iter().map(|v| v.collected_at).min().map(|t| t.to_rfc3339());
    let max_ts = rows.iter().map(|v| v.collected_at).max().map(|t| t.to_rfc3339());
    let frame = DataFrame::new(vec![
        Series::new("run_id".into(), rows.iter().map(|v| v.run_id.as_str()).collect::<Vec<_>>()),
        Series::new("annotation_id".into(), rows.iter().map(|v| v.annotation_id.as_str()).collect::<Vec<_>>()),
        Series::new("query_id".into(), rows.iter().map(|v| v.query_id.as_str()).collect::<Vec<_>>()),
        Series::new("engine".into(), rows.iter().map(|v| v.engine.as_str()).collect::<Vec<_>>()),
        Series::new("normalized_url".into(), rows.iter().map(|v| v.normalized_url.as_str()).collect::<Vec<_>>()),
        Series::new("domain".into(), rows.iter().map(|v| v.domain.as_str()).collect::<Vec<_>>()),
        Series::new("rank".into(), rows.iter().map(|v| v.rank).collect::<Vec<_>>()),
        Series::new("factual_consistency".into(), rows.iter().map(|v| v.factual_consistency.as_str()).collect::<Vec<_>>()),
        Series::new("domain_type".into(), rows.iter().map(|v| v.domain_type.as_str()).collect::<Vec<_>>()),
        Series::new("collected_at".into(), rows.iter().map(|v| v.collected_at.to_rfc3339()).collect::<Vec<_>>()),
    ])
    .map_err(|err| StoreError::Backend(format!("failed to build annotated_results frame: {err}")))?;
    Ok((frame, rows.len() as u64, queries.len() as u64, engines.len() as u64, min_ts, max_ts))
}

/// Builds the `metrics` export frame and its summary statistics.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if `polars` rejects the assembled columns.
pub fn metrics_frame(rows: &[&MetricRecord]) -> Result<ExportFrame, StoreError> {
    let queries: BTreeSet<&str> = rows.iter().map(|m| m.query_id.as_str()).collect();
    let engines: BTreeSet<&str> = rows.iter().filter_map(|m| m.engine.as_ref().map(EngineId::as_str)).collect();
    let min_ts = rows.iter().map(|m| m.collected_at).min().map(|t| t.to_rfc3339());
    let max_ts = rows.iter().map(|m| m.collected_at).max().map(|t| t.to_rfc3339());
    let frame = DataFrame::new(vec![
        Series::new("id".into(), rows.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()),
        Series::new("query_id".into(), rows.iter().map(|m| m.query_id.as_str()).collect::<Vec<_>>()),
        Series::new("engine".into(), rows.iter().map(|m| m.engine.as_ref().map_or("", EngineId::as_str)).collect::<Vec<_>>()),
        Series::new("metric_type".into(), rows.iter().map(|m| m.metric_type.as_str()).collect::<Vec<_>>()),
        Series::new("value".into(), rows.iter().map(|m| m.value).collect::<Vec<_>>()),
        Series::new("delta".into(), rows.iter().map(|m| m.delta).collect::<Vec<_>>()),
        Series::new("collected_at".into(), rows.iter().map(|m| m.collected_at.to_rfc3339()).collect::<Vec<_>>()),
    ])
    .map_err(|err| StoreError::Backend(format!("failed to build metrics frame: {err}")))?;
    Ok((frame, rows.len() as u64, queries.len() as u64, engines.len() as u64, min_ts, max_ts))
}
