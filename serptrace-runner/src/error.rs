// serptrace-runner/src/error.rs
// ============================================================================
// Module: Runner Errors
// ============================================================================

//! Error types for the pipeline runner, its stage ports, and configuration.

use thiserror::Error;

/// Errors surfaced by [`crate::runner::Runner::run_once`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A pipeline stage failed after exhausting its retry budget.
    #[error("stage {stage} failed after {attempts} attempt(s): {source}")]
    StageFailed {
        /// Stage name (`collector`, `annotation`, `metrics`).
        stage: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Underlying failure.
        #[source]
        source: StageError,
    },
    /// A storage call outside of a retried stage failed.
    #[error("storage failure: {0}")]
    Storage(#[from] serptrace_core::StoreError),
}

/// Errors a stage closure may return; all are retried by
/// [`crate::runner::Runner::execute_stage`] up to the configured budget.
#[derive(Debug, Error)]
pub enum StageError {
    /// The external stage port returned an error.
    #[error("stage port failure: {0}")]
    Port(String),
    /// The stage's own bookkeeping (ingestion, storage) failed.
    #[error("storage failure: {0}")]
    Storage(#[from] serptrace_core::StoreError),
    /// Ingestion-specific failure.
    #[error("ingestion failure: {0}")]
    Ingestion(#[from] serptrace_ingestion::IngestionError),
}

/// Errors returned by [`crate::ports::CollectorPort::run_collection`].
#[derive(Debug, Error)]
pub enum CollectorPortError {
    /// The external collector command failed.
    #[error("collector port failure: {0}")]
    Failed(String),
}

/// Errors returned by [`crate::ports::AnnotationPort::run_annotation`].
#[derive(Debug, Error)]
pub enum AnnotationPortError {
    /// The external annotation command failed.
    #[error("annotation port failure: {0}")]
    Failed(String),
}

/// Errors returned by [`crate::ports::MetricsPort::run_metrics`].
#[derive(Debug, Error)]
pub enum MetricsPortError {
    /// The external metrics command failed.
    #[error("metrics port failure: {0}")]
    Failed(String),
}

/// Errors from [`crate::config::RunnerConfig::load`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading the configuration file.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// An environment variable override could not be parsed for its field type.
    #[error("invalid environment override for {field}: {value}")]
    InvalidEnvOverride {
        /// Name of the field the override applies to.
        field: &'static str,
        /// The raw environment variable value that failed to parse.
        value: String,
    },
    /// A field's value fell outside its validated range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
