// serptrace-analytics/src/error.rs
// ============================================================================
// Module: Analytics Errors
// ============================================================================

//! Error types for the dataset exporter and report generator.

use thiserror::Error;

/// Errors from a single dataset export attempt.
///
/// The exporter ([`crate::exporter::export_datasets`]) catches this per
/// dataset type; it never propagates to the caller.
#[derive(Debug, Error)]
pub enum DatasetExportError {
    /// The storage backend failed to materialize or register the dataset.
    #[error("dataset export failed: {0}")]
    Storage(#[from] serptrace_core::StoreError),
}

/// Errors from report generation.
///
/// [`crate::report::generate_transparency_report`] catches this internally
/// and never fails the pipeline; it is exposed so callers (and tests) can
/// inspect why a report was skipped.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Fetching metric records failed.
    #[error("report generation storage failure: {0}")]
    Storage(#[from] serptrace_core::StoreError),
    /// Writing the report file failed.
    #[error("report generation io failure: {0}")]
    Io(#[from] std::io::Error),
}
