// serptrace-core/src/model/audit.rs
// ============================================================================
// Module: Audit Sample Entity
// ============================================================================

//! Manual-review rows drawn by the audit sampler from the annotated results
//! produced in a run.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::AnnotationId;
use crate::identifiers::AuditSampleId;
use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;

/// Review status of an audit sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSampleStatus {
    /// Awaiting manual review.
    Pending,
    /// Reviewed and approved.
    Approved,
    /// Reviewed and flagged for follow-up.
    Flagged,
}

impl AuditSampleStatus {
    /// Returns the snake_case wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Flagged => "flagged",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "flagged" => Some(Self::Flagged),
            _ => None,
        }
    }
}

/// A persisted audit sample row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSample {
    /// Primary key.
    pub id: AuditSampleId,
    /// Pipeline run that drew this sample.
    pub run_id: RunId,
    /// The annotation selected for review.
    pub annotation_id: AnnotationId,
    /// Benchmark query the annotation belongs to.
    pub query_id: QueryId,
    /// Engine the annotation belongs to.
    pub engine: EngineId,
    /// Reviewer identifier, once assigned.
    pub reviewer: Option<String>,
    /// Current review status.
    pub status: AuditSampleStatus,
    /// Free-form reviewer notes.
    pub notes: Option<String>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
    /// Row last-update instant.
    pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::record_audit_samples`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSampleInput {
    /// Primary key.
    pub id: AuditSampleId,
    /// Pipeline run that drew this sample.
    pub run_id: RunId,
    /// The annotation selected for review.
    pub annotation_id: AnnotationId,
    /// Benchmark query the annotation belongs to.
    pub query_id: QueryId,
    /// Engine the annotation belongs to.
    pub engine: EngineId,
    /// Reviewer identifier, when already known.
    pub reviewer: Option<String>,
    /// Current review status.
    pub status: AuditSampleStatus,
    /// Free-form reviewer notes.
    pub notes: Option<String>,
}
