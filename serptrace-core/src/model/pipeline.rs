// serptrace-core/src/model/pipeline.rs
// ============================================================================
// Module: Pipeline Run & Stage Log Entities
// ============================================================================

//! Bookkeeping rows the pipeline runner writes to track its own execution:
//! one [`PipelineRun`] per trigger, and one [`PipelineStageLog`] per stage
//! within that run.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::RunId;
use crate::identifiers::StageLogId;

/// Lifecycle status shared by pipeline runs and stage logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Still executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecoverable error.
    Failed,
}

impl RunStatus {
    /// Returns the snake_case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The three stages driven by the pipeline runner, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Multi-engine web-search collection + ingestion.
    Collector,
    /// LLM-based annotation of collected results.
    Annotation,
    /// Bias-metrics computation and dataset export.
    Metrics,
}

impl PipelineStage {
    /// Returns the snake_case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Annotation => "annotation",
            Self::Metrics => "metrics",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "collector" => Some(Self::Collector),
            "annotation" => Some(Self::Annotation),
            "metrics" => Some(Self::Metrics),
            _ => None,
        }
    }
}

/// A persisted pipeline run row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Primary key.
    pub id: RunId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Instant the run started.
    pub started_at: DateTime<Utc>,
    /// Instant the run completed, when finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, when `status == Failed`.
    pub error: Option<String>,
    /// Aggregated per-stage metadata (`{collector, annotation, metrics}`).
    pub metadata: Value,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}

/// A persisted pipeline stage log row. There is exactly one row per
/// `(run_id, stage)`; retries update the same row rather than inserting new
/// ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageLog {
    /// Primary key.
    pub id: StageLogId,
    /// Owning pipeline run.
    pub run_id: RunId,
    /// Which stage this log tracks.
    pub stage: PipelineStage,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Number of attempts made so far (starts at 0 before the first attempt).
    pub attempts: u32,
    /// Instant the stage first started (stable across retries).
    pub started_at: DateTime<Utc>,
    /// Instant the stage completed, when finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message from the most recent failed attempt.
    pub error: Option<String>,
    /// Stage-specific result metadata.
    pub metadata: Value,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}
