// serptrace-analytics/src/lib.rs
// ============================================================================
// Crate: serptrace-analytics
// Description: Dataset Exporter and transparency Report Generator.
// ============================================================================

//! ## Overview
//! Two independent storage-driven stages that run after metrics
//! computation: [`exporter::export_datasets`] materializes versioned
//! Parquet snapshots of all three datasets, and
//! [`report::generate_transparency_report`] renders the latest bias
//! metrics into a human-readable Markdown report. Neither stage can fail
//! the pipeline as a whole; both log and degrade gracefully.

pub mod error;
pub mod exporter;
pub mod report;

pub use error::DatasetExportError;
pub use error::ReportError;
pub use exporter::ExportDatasetsOutcome;
pub use exporter::ExportDatasetsRequest;
pub use exporter::export_datasets;
pub use report::ReportRequest;
pub use report::generate_transparency_report;
