// serptrace-core/src/model/annotation.rs
// ============================================================================
// Module: Annotation Entity
// ============================================================================

//! LLM-produced labels attached to a single search result, plus the
//! denormalized view joining an annotation back to its result for querying.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::AnnotationId;
use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;
use crate::identifiers::SearchResultId;

/// Coarse classification of the domain that published a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    /// A news outlet.
    News,
    /// A government or official institutional source.
    Government,
    /// An academic or research institution.
    Academic,
    /// A blog or independent commentary site.
    Blog,
    /// Anything not covered by the other categories.
    Other,
}

impl DomainType {
    /// Returns the snake_case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Government => "government",
            Self::Academic => "academic",
            Self::Blog => "blog",
            Self::Other => "other",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "news" => Some(Self::News),
            "government" => Some(Self::Government),
            "academic" => Some(Self::Academic),
            "blog" => Some(Self::Blog),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// The LLM's judgment of whether a result's claims align with a reference
/// set of facts for the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactualConsistency {
    /// The result's claims align with the reference facts.
    Aligned,
    /// The result's claims contradict the reference facts.
    Contradicted,
    /// The relationship to the reference facts could not be determined.
    Unclear,
    /// Factual consistency does not apply to this result.
    NotApplicable,
}

impl FactualConsistency {
    /// Returns the snake_case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aligned => "aligned",
            Self::Contradicted => "contradicted",
            Self::Unclear => "unclear",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "aligned" => Some(Self::Aligned),
            "contradicted" => Some(Self::Contradicted),
            "unclear" => Some(Self::Unclear),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }
}

/// A persisted annotation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Primary key.
    pub id: AnnotationId,
    /// The search result this annotation labels (unique per result).
    pub search_result_id: SearchResultId,
    /// Benchmark query the underlying result belongs to.
    pub query_id: QueryId,
    /// Engine the underlying result came from.
    pub engine: EngineId,
    /// Coarse domain classification.
    pub domain_type: DomainType,
    /// Factual-consistency judgment.
    pub factual_consistency: FactualConsistency,
    /// Model confidence in `[0, 1]`, when reported.
    pub confidence: Option<f64>,
    /// Identifier of the prompt template version used.
    pub prompt_version: String,
    /// Identifier of the model that produced this annotation.
    pub model_id: String,
    /// Additional model output not covered by the typed fields.
    pub extra: Option<Value>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::insert_annotation_records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationInput {
    /// Primary key.
    pub id: AnnotationId,
    /// The search result this annotation labels.
    pub search_result_id: SearchResultId,
    /// Benchmark query the underlying result belongs to.
    pub query_id: QueryId,
    /// Engine the underlying result came from.
    pub engine: EngineId,
    /// Coarse domain classification.
    pub domain_type: DomainType,
    /// Factual-consistency judgment.
    pub factual_consistency: FactualConsistency,
    /// Model confidence in `[0, 1]`, when reported.
    pub confidence: Option<f64>,
    /// Identifier of the prompt template version used.
    pub prompt_version: String,
    /// Identifier of the model that produced this annotation.
    pub model_id: String,
    /// Additional model output not covered by the typed fields.
    pub extra: Option<Value>,
}

/// Denormalized projection joining an annotation to its search result,
/// returned by the time/filter-bounded query operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedResultView {
    /// The owning pipeline run id, when the result was linked to a crawl run;
    /// otherwise a synthesized fallback (see
    /// [`crate::model::annotation::synthesize_run_id`]).
    pub run_id: String,
    /// The pipeline run's batch id, when known.
    pub batch_id: Option<RunId>,
    /// The annotation's primary key.
    pub annotation_id: AnnotationId,
    /// Benchmark query id.
    pub query_id: QueryId,
    /// Engine id.
    pub engine: EngineId,
    /// Normalized URL of the annotated result.
    pub normalized_url: String,
    /// Domain of the annotated result.
    pub domain: String,
    /// Rank of the annotated result.
    pub rank: u32,
    /// Factual-consistency judgment.
    pub factual_consistency: FactualConsistency,
    /// Coarse domain classification.
    pub domain_type: DomainType,
    /// Instant the underlying search result was collected.
    pub collected_at: DateTime<Utc>,
}

/// Synthesizes a fallback `run_id` for a view row whose underlying result has
/// no crawl run linkage: `"{query_id}|{timestamp as compact Y-m-d-H-M-S}"`.
#[must_use]
pub fn synthesize_run_id(query_id: &QueryId, timestamp: DateTime<Utc>) -> String {
    format!("{}|{}", query_id.as_str(), timestamp.format("%Y%m%d%H%M%S"))
}
