// serptrace-core/src/model/dataset.rs
// ============================================================================
// Module: Dataset Version Entity
// ============================================================================

//! Bookkeeping for versioned tabular exports produced by the dataset
//! exporter.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::DatasetVersionId;
use crate::identifiers::RunId;

/// Which logical dataset a [`DatasetVersion`] materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    /// Raw collected search results.
    SearchResults,
    /// Search results joined with their annotations.
    AnnotatedResults,
    /// Bias-metric records.
    Metrics,
}

impl DatasetType {
    /// Returns the snake_case wire form, also used as the export
    /// subdirectory name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchResults => "search_results",
            Self::AnnotatedResults => "annotated_results",
            Self::Metrics => "metrics",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "search_results" => Some(Self::SearchResults),
            "annotated_results" => Some(Self::AnnotatedResults),
            "metrics" => Some(Self::Metrics),
            _ => None,
        }
    }

    /// All dataset types, in the order the exporter materializes them.
    #[must_use]
    pub fn all() -> [Self; 3] {
        [Self::SearchResults, Self::AnnotatedResults, Self::Metrics]
    }
}

/// On-disk format of an exported dataset. Only Parquet is currently
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Apache Parquet.
    Parquet,
}

impl DatasetFormat {
    /// Returns the snake_case wire form and file extension.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
        }
    }

    /// Parses the snake_case wire form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// A persisted dataset version row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Primary key.
    pub id: DatasetVersionId,
    /// Which logical dataset this version materializes.
    pub dataset_type: DatasetType,
    /// On-disk format.
    pub format: DatasetFormat,
    /// Path to the written file.
    pub path: String,
    /// Pipeline run this export was triggered from, when applicable.
    pub run_id: Option<RunId>,
    /// Number of rows written.
    pub record_count: u64,
    /// `{filters, run_id, distinct_queries, distinct_engines, time_range,
    /// generated_at}`.
    pub metadata: Value,
    /// Row creation instant.
    pub created_at: DateTime<Utc>,
}
