// serptrace-audit/src/sampler.rs
// ============================================================================
// Module: Audit Sampler
// Description: Draw a uniform sample of annotated results for manual review.
// Purpose: Give human reviewers a bias-free slice of each run's annotations.
// Dependencies: serptrace-core, rand, chrono, tracing
// ============================================================================

//! ## Overview
//! [`draw_audit_sample`] fetches every annotated result collected since a
//! cutoff, shuffles a copy with Fisher-Yates, and persists the first
//! `ceil(n * percent / 100)` (at least one) as pending [`AuditSample`] rows.

use chrono::DateTime;
use chrono::Utc;
use rand::seq::SliceRandom;
use serptrace_core::identifiers::AuditSampleId;
use serptrace_core::identifiers::RunId;
use serptrace_core::model::AuditSampleInput;
use serptrace_core::model::AuditSampleStatus;
use serptrace_core::storage::AnnotatedResultsFilter;
use serptrace_core::storage::Storage;

use crate::error::AuditError;

/// Summary returned by [`draw_audit_sample`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    /// Number of annotated results considered (before sampling).
    pub total_annotated: u64,
    /// Number of audit samples drawn and persisted.
    pub sampled: u64,
}

/// Draws and persists an audit sample for `run_id`.
///
/// `sample_percent` is expected to already be validated to `1..=100` by the
/// caller's configuration layer; this function does not re-validate it.
///
/// # Errors
///
/// Returns [`AuditError::Storage`] if fetching annotated results or
/// persisting the drawn sample fails.
pub async fn draw_audit_sample(
    storage: &dyn Storage,
    run_id: &RunId,
    since: Option<DateTime<Utc>>,
    sample_percent: u8,
) -> Result<AuditSummary, AuditError> {
    let filter = AnnotatedResultsFilter {
        since,
        ..AnnotatedResultsFilter::default()
    };
    let fetched = storage.fetch_annotated_results(&filter).await?;
    if fetched.is_empty() {
        return Ok(AuditSummary::default());
    }

    let total_annotated = fetched.len();
    let sample_count = sample_count_for(total_annotated, sample_percent);

    let mut shuffled = fetched;
    shuffled.shuffle(&mut rand::thread_rng());
    shuffled.truncate(sample_count.min(shuffled.len()));

    let now = Utc::now();
    let samples: Vec<AuditSampleInput> = shuffled
        .into_iter()
        .map(|view| AuditSampleInput {
            id: AuditSampleId::generate(),
            run_id: run_id.clone(),
            annotation_id: view.annotation_id,
            query_id: view.query_id,
            engine: view.engine,
            reviewer: None,
            status: AuditSampleStatus::Pending,
            notes: None,
        })
        .collect();

    let sampled = samples.len();
    storage.record_audit_samples(&samples).await?;

    tracing::info!(run_id = %run_id, total_annotated, sampled, "drew audit sample");

    Ok(AuditSummary {
        total_annotated: u64::try_from(total_annotated).unwrap_or(u64::MAX),
        sampled: u64::try_from(sampled).unwrap_or(u64::MAX),
    })
}

/// `max(1, ceil(total * percent / 100))`.
fn sample_count_for(total: usize, percent: u8) -> usize {
    let percent = usize::from(percent);
    let raw = total.saturating_mul(percent).div_ceil(100);
    raw.max(1)
}

#[cfg(test)]
mod tests {
    use serptrace_core::InMemoryStore;
    use serptrace_core::identifiers::AnnotationId;
    use serptrace_core::identifiers::EngineId;
    use serptrace_core::identifiers::QueryId;
    use serptrace_core::identifiers::SearchResultId;
    use serptrace_core::model::AnnotationInput;
    use serptrace_core::model::DomainType;
    use serptrace_core::model::FactualConsistency;
    use serptrace_core::model::SearchResultInput;

    use super::*;

    #[test]
    fn sample_count_rounds_up_and_floors_at_one() {
        assert_eq!(sample_count_for(100, 5), 5);
        assert_eq!(sample_count_for(3, 5), 1);
        assert_eq!(sample_count_for(0, 5), 1);
        assert_eq!(sample_count_for(21, 10), 3);
    }

    async fn seed_annotated_result(store: &InMemoryStore, id: &str) {
        let result = SearchResultInput {
            id: SearchResultId::new(id),
            crawl_run_id: None,
            query_id: QueryId::new("q1"),
            engine: EngineId::new("google"),
            rank: 0,
            title: "title".to_owned(),
            snippet: None,
            url: format!("https://example.com/{id}"),
            normalized_url: format!("example.com/{id}"),
            domain: "example.com".to_owned(),
            timestamp: Utc::now(),
            hash: format!("hash-{id}"),
            raw_html_path: None,
        };
        store.insert_search_results(&[result]).await.expect("insert result");
        let annotation = AnnotationInput {
            id: AnnotationId::new(format!("ann-{id}")),
            search_result_id: SearchResultId::new(id),
            query_id: QueryId::new("q1"),
            engine: EngineId::new("google"),
            domain_type: DomainType::News,
            factual_consistency: FactualConsistency::Aligned,
            confidence: Some(0.9),
            prompt_version: "v1".to_owned(),
            model_id: "model-1".to_owned(),
            extra: None,
        };
        store.insert_annotation_records(&[annotation]).await.expect("insert annotation");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_annotated_results_yield_zero_summary() {
        let store = InMemoryStore::new();
        let summary = draw_audit_sample(&store, &RunId::generate(), None, 10).await.expect("sample");
        assert_eq!(summary, AuditSummary::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn draws_and_persists_expected_count() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            seed_annotated_result(&store, &format!("r{i}")).await;
        }

        let run_id = RunId::generate();
        let summary = draw_audit_sample(&store, &run_id, None, 50).await.expect("sample");
        assert_eq!(summary.total_annotated, 10);
        assert_eq!(summary.sampled, 5);

        let persisted = store.fetch_audit_samples(&run_id).await.expect("fetch samples");
        assert_eq!(persisted.len(), 5);
        assert!(persisted.iter().all(|sample| sample.status == AuditSampleStatus::Pending));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn small_percent_still_samples_at_least_one() {
        let store = InMemoryStore::new();
        seed_annotated_result(&store, "only").await;

        let run_id = RunId::generate();
        let summary = draw_audit_sample(&store, &run_id, None, 1).await.expect("sample");
        assert_eq!(summary.sampled, 1);
    }
}
