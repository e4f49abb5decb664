// serptrace-core/src/model/crawl_run.rs
// ============================================================================
// Module: Crawl Run Entity
// ============================================================================

//! One crawl run aggregates the results collected for a single
//! `(query_id, engine)` pair within a pipeline run.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::CrawlRunId;
use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;

/// Lifecycle status of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlRunStatus {
    /// Still collecting results.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl CrawlRunStatus {
    /// Returns the snake_case wire form, used directly as the SQLite column
    /// value.
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

/// A persisted crawl run row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRun {
    /// Primary key.
    pub id: CrawlRunId,
    /// Owning pipeline run id.
    pub batch_id: RunId,
    /// Benchmark query this run collected results for.
    pub query_id: QueryId,
    /// Engine this run collected results from.
    pub engine: EngineId,
    /// Current lifecycle status.
    pub status: CrawlRunStatus,
    /// Instant the run started.
    pub started_at: DateTime<Utc>,
    /// Instant the run completed, when finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, when `status == Failed`.
    pub error: Option<String>,
    /// Number of search results committed under this run.
    pub result_count: u32,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::record_crawl_runs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRunInput {
    /// Primary key.
    pub id: CrawlRunId,
    /// Owning pipeline run id.
    pub batch_id: RunId,
    /// Benchmark query this run collected results for.
    pub query_id: QueryId,
    /// Engine this run collected results from.
    pub engine: EngineId,
    /// Current lifecycle status.
    pub status: CrawlRunStatus,
    /// Instant the run started.
    pub started_at: DateTime<Utc>,
    /// Instant the run completed, when finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, when `status == Failed`.
    pub error: Option<String>,
    /// Number of search results committed under this run so far.
    pub result_count: u32,
}
