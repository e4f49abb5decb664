// serptrace-audit/src/error.rs
// ============================================================================
// Module: Audit Sampler Errors
// ============================================================================

//! Error type surfaced by [`crate::sampler::draw_audit_sample`].

use thiserror::Error;

/// Errors returned by the audit sampler.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A storage call failed while fetching annotated results or persisting
    /// samples.
    #[error("storage failure during audit sampling: {0}")]
    Storage(#[from] serptrace_core::StoreError),
}
