// serptrace-core/src/model/viewpoint.rs
// ============================================================================
// Module: Viewpoint Entity
// ============================================================================

//! A denormalized tag linking one search result to an editorial "stance" on
//! its query, used to surface alternative viewpoints in
//! [`crate::storage::Storage::fetch_alternative_sources`].

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::AnnotationId;
use crate::identifiers::EngineId;
use crate::identifiers::QueryId;
use crate::identifiers::RunId;
use crate::identifiers::ViewpointId;

/// A persisted viewpoint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    /// Primary key.
    pub id: ViewpointId,
    /// Benchmark query this viewpoint is scoped to.
    pub query_id: QueryId,
    /// Pipeline run that produced this viewpoint, when known.
    pub run_id: Option<RunId>,
    /// Engine the tagged result came from.
    pub engine: EngineId,
    /// Domain of the tagged result.
    pub domain: String,
    /// Normalized URL of the tagged result.
    pub normalized_url: String,
    /// Free-form description of the editorial stance.
    pub stance: String,
    /// Annotation supporting this stance assignment, when present.
    pub supporting_annotation_id: Option<AnnotationId>,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}

/// Input to [`crate::storage::Storage::upsert_viewpoints`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewpointInput {
    /// Primary key.
    pub id: ViewpointId,
    /// Benchmark query this viewpoint is scoped to.
    pub query_id: QueryId,
    /// Pipeline run that produced this viewpoint, when known.
    pub run_id: Option<RunId>,
    /// Engine the tagged result came from.
    pub engine: EngineId,
    /// Domain of the tagged result.
    pub domain: String,
    /// Normalized URL of the tagged result.
    pub normalized_url: String,
    /// Free-form description of the editorial stance.
    pub stance: String,
    /// Annotation supporting this stance assignment, when present.
    pub supporting_annotation_id: Option<AnnotationId>,
}
