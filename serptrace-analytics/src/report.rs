// serptrace-analytics/src/report.rs
// ============================================================================
// Module: Transparency Report Generator
// Description: Render the latest bias-metric records into a Markdown report.
// Purpose: Give human reviewers a readable summary of each run's metrics.
// Dependencies: serptrace-core, serde_json, chrono, tokio, tracing
// ============================================================================

//! ## Overview
//! Fetches the last 100 records of each of the three known metric types
//! concurrently, reduces each to the latest record per query, ranks the top
//! 5 by value, and writes a Markdown table per metric plus the run-wide
//! average. Benchmark query metadata (`config/benchmark-queries.json`) is
//! consulted for human-readable query/topic labels, falling back to the raw
//! `query_id` when absent. Any failure here is logged and swallowed by the
//! caller; it never fails the pipeline run.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serptrace_core::identifiers::RunId;
use serptrace_core::model::MetricRecord;
use serptrace_core::storage::Storage;

use crate::error::ReportError;

const METRIC_TYPES: [&str; 3] = ["domain_diversity", "engine_overlap", "factual_alignment"];
const RECORDS_PER_METRIC: u32 = 100;
const TOP_N: usize = 5;

/// Inputs to [`generate_transparency_report`].
#[derive(Debug, Clone)]
pub struct ReportRequest {
    /// Pipeline run this report summarizes.
    pub run_id: RunId,
    /// Directory the Markdown report is written under.
    pub output_dir: String,
    /// Override for the benchmark query metadata path; falls back to
    /// `config/benchmark-queries.json` (cwd, then parent) when absent.
    pub benchmark_queries_path: Option<String>,
}

/// Benchmark query metadata entry.
#[derive(Debug, Clone, Deserialize)]
struct BenchmarkQuery {
    id: String,
    query: String,
    topic: String,
    #[serde(default)]
    #[allow(dead_code, reason = "carried through for forward-compatible metadata, not yet rendered")]
    tags: Vec<String>,
}

/// Generates the transparency report for `request`, writing it to disk.
///
/// Never fails the pipeline: callers should log a warning on `Err` and
/// continue. Returns the written file path on success.
///
/// # Errors
///
/// Returns [`ReportError`] if fetching metric records or writing the report
/// file fails.
pub async fn generate_transparency_report(storage: &dyn Storage, request: &ReportRequest) -> Result<String, ReportError> {
    let (domain_diversity, engine_overlap, factual_alignment) = tokio::try_join!(
        storage.fetch_recent_metric_records(METRIC_TYPES[0], RECORDS_PER_METRIC),
        storage.fetch_recent_metric_records(METRIC_TYPES[1], RECORDS_PER_METRIC),
        storage.fetch_recent_metric_records(METRIC_TYPES[2], RECORDS_PER_METRIC),
    )?;

    let benchmark_queries = load_benchmark_queries(request.benchmark_queries_path.as_deref()).await;

    let mut sections = Vec::with_capacity(METRIC_TYPES.len());
    for (metric_type, records) in METRIC_TYPES.iter().zip([domain_diversity, engine_overlap, factual_alignment]) {
        sections.push(render_metric_section(metric_type, &records, &benchmark_queries));
    }

    let generated_at = chrono::Utc::now();
    let body = format!(
        "# Search Transparency Report\n\nRun: {}\nGenerated: {}\n\n{}\n",
        request.run_id,
        generated_at.to_rfc3339(),
        sections.join("\n")
    );

    let safe_ts = generated_at.to_rfc3339().replace([':', '.'], "-");
    let output_dir = PathBuf::from(&request.output_dir);
    tokio::fs::create_dir_all(&output_dir).await?;
    let path = output_dir.join(format!("search-transparency-report-{safe_ts}.md"));
    tokio::fs::write(&path, body).await?;

    Ok(path.to_string_lossy().into_owned())
}

fn render_metric_section(metric_type: &str, records: &[MetricRecord], benchmark_queries: &HashMap<String, BenchmarkQuery>) -> String {
    let latest_per_query = latest_by_query(records);
    let mut ranked = latest_per_query;
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(TOP_N);

    let mut table = String::new();
    table.push_str(&format!("## {metric_type}\n\n"));
    table.push_str("| Query | Topic | Value | Delta |\n|---|---|---|---|\n");
    for record in &ranked {
        let (query_label, topic_label) = benchmark_queries
            .get(record.query_id.as_str())
            .map_or_else(|| (record.query_id.as_str().to_owned(), "Unknown".to_owned()), |meta| (meta.query.clone(), meta.topic.clone()));
        table.push_str(&format!(
            "| {query_label} | {topic_label} | {} | {} |\n",
            format_metric_value(metric_type, record.value),
            record.delta.map_or_else(|| "\u{2013}".to_owned(), |delta| format_metric_value(metric_type, delta))
        ));
    }

    if records.is_empty() {
        table.push_str("\n_No records in this window._\n");
    } else {
        let average = records.iter().map(|record| record.value).sum::<f64>() / records.len() as f64;
        table.push_str(&format!("\nAverage over last {} records: {}\n", records.len(), format_metric_value(metric_type, average)));
    }
    table
}

fn latest_by_query(records: &[MetricRecord]) -> Vec<MetricRecord> {
    let mut sorted: Vec<&MetricRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));
    let mut seen = HashSet::new();
    let mut latest = Vec::new();
    for record in sorted {
        if seen.insert(record.query_id.as_str().to_owned()) {
            latest.push(record.clone());
        }
    }
    latest
}

fn format_metric_value(metric_type: &str, value: f64) -> String {
    if metric_type == "domain_diversity" {
        format!("{value:.1}")
    } else {
        format!("{:.1}%", value * 100.0)
    }
}

async fn load_benchmark_queries(override_path: Option<&str>) -> HashMap<String, BenchmarkQuery> {
    for candidate in benchmark_query_candidates(override_path) {
        if let Ok(contents) = tokio::fs::read_to_string(&candidate).await {
            match serde_json::from_str::<Vec<BenchmarkQuery>>(&contents) {
                Ok(entries) => return entries.into_iter().map(|entry| (entry.id.clone(), entry)).collect(),
                Err(err) => {
                    tracing::warn!(path = %candidate.display(), error = %err, "benchmark query metadata is malformed");
                }
            }
        }
    }
    HashMap::new()
}

fn benchmark_query_candidates(override_path: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = override_path {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(Path::new("config/benchmark-queries.json").to_path_buf());
    candidates.push(Path::new("../config/benchmark-queries.json").to_path_buf());
    candidates
}

#[cfg(test)]
mod tests {
    use serptrace_core::InMemoryStore;
    use serptrace_core::identifiers::MetricRecordId;
    use serptrace_core::identifiers::QueryId;
    use serptrace_core::model::MetricRecordInput;

    use super::*;

    async fn seed_metric(store: &InMemoryStore, metric_type: &str, query_id: &str, value: f64) {
        store
            .insert_metric_records(&[MetricRecordInput {
                id: MetricRecordId::generate(),
                crawl_run_id: None,
                query_id: QueryId::new(query_id),
                engine: None,
                metric_type: metric_type.to_owned(),
                value,
                delta: None,
                compared_to_run_id: None,
                collected_at: chrono::Utc::now(),
                extra: None,
            }])
            .await
            .expect("seed metric");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_report_with_sections_for_every_metric_type() {
        let store = InMemoryStore::new();
        seed_metric(&store, "domain_diversity", "q1", 0.82).await;
        seed_metric(&store, "engine_overlap", "q1", 0.4).await;
        seed_metric(&store, "factual_alignment", "q1", 0.95).await;

        let dir = tempfile::TempDir::new().expect("tempdir");
        let request = ReportRequest {
            run_id: RunId::generate(),
            output_dir: dir.path().to_string_lossy().into_owned(),
            benchmark_queries_path: None,
        };
        let path = generate_transparency_report(&store, &request).await.expect("report");
        let contents = tokio::fs::read_to_string(&path).await.expect("read report");
        assert!(contents.contains("## domain_diversity"));
        assert!(contents.contains("## engine_overlap"));
        assert!(contents.contains("## factual_alignment"));
        assert!(contents.contains("82.0%") || contents.contains("0.8"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_metrics_produce_no_records_notice() {
        let store = InMemoryStore::new();
        let dir = tempfile::TempDir::new().expect("tempdir");
        let request = ReportRequest {
            run_id: RunId::generate(),
            output_dir: dir.path().to_string_lossy().into_owned(),
            benchmark_queries_path: None,
        };
        let path = generate_transparency_report(&store, &request).await.expect("report");
        let contents = tokio::fs::read_to_string(&path).await.expect("read report");
        assert!(contents.contains("No records in this window"));
    }
}
