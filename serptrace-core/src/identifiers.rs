// serptrace-core/src/identifiers.rs
// ============================================================================
// Module: Serptrace Identifiers
// Description: Canonical opaque identifiers shared across the pipeline.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque newtypes over `String` that serialize transparently.
//! Validation beyond "is a non-empty string" is left to the component that
//! constructs the identifier (e.g. the ingestion pipeline validates query ids
//! pulled from collector JSON).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Declares a newtype identifier with the common constructor/accessor set.
macro_rules! newtype_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random identifier (UUID v4).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

newtype_id!(
    /// Identifier for a pipeline run (flows through as `batch_id`/`run_id` on
    /// downstream records).
    RunId
);
newtype_id!(
    /// Identifier for a benchmark search query.
    QueryId
);
newtype_id!(
    /// Identifier for a search engine (e.g. `"google"`, `"bing"`).
    EngineId
);
newtype_id!(
    /// Identifier for an individual search result row.
    SearchResultId
);
newtype_id!(
    /// Identifier for a crawl run (one per `(query_id, engine)` per pipeline run).
    CrawlRunId
);
newtype_id!(
    /// Identifier for an annotation row.
    AnnotationId
);
newtype_id!(
    /// Identifier for a metric record row.
    MetricRecordId
);
newtype_id!(
    /// Identifier for an annotation aggregate row.
    AggregateId
);
newtype_id!(
    /// Identifier for an audit sample row.
    AuditSampleId
);
newtype_id!(
    /// Identifier for a pipeline stage log row.
    StageLogId
);
newtype_id!(
    /// Identifier for a dataset version row.
    DatasetVersionId
);
newtype_id!(
    /// Identifier for a viewpoint row.
    ViewpointId
);

#[cfg(test)]
mod tests {
    use super::RunId;

    #[test]
    fn round_trips_through_serde_json() {
        let id = RunId::new("run-123");
        let json = serde_json::to_string(&id).expect("serialize identifier");
        assert_eq!(json, "\"run-123\"");
        let back: RunId = serde_json::from_str(&json).expect("deserialize identifier");
        assert_eq!(back, id);
    }

    #[test]
    fn generate_produces_distinct_ids() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
    }
}
