// serptrace-ingestion/src/error.rs
// ============================================================================
// Module: Ingestion Errors
// ============================================================================

//! Error type surfaced by [`crate::ingest::ingest_directory`].

use thiserror::Error;

/// Errors returned by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The configured directory could not be listed.
    #[error("failed to read collector directory {path}: {source}")]
    DirectoryRead {
        /// Directory that could not be read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A storage call failed while committing normalized records.
    #[error("storage failure during ingestion: {0}")]
    Storage(#[from] serptrace_core::StoreError),
}
