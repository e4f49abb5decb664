// serptrace-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: Durable Storage backend for the search-transparency pipeline.
// Purpose: Provide a production-grade, single-writer SQLite implementation
//          of the capability surface defined in `serptrace_core::storage`.
// Dependencies: serptrace-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`Storage`] implementation that
//! persists every entity the pipeline runner reads and writes: collected
//! search results, crawl runs, annotations, bias-metric records, audit
//! samples, pipeline bookkeeping, and dataset version history. One
//! connection is held behind a mutex and every call is routed through a
//! blocking-task pool so the async runtime is never blocked on SQLite I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod schema;
pub mod store;
mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::SqliteJournalMode;
pub use config::SqliteStoreConfig;
pub use config::SqliteSyncMode;
pub use error::SqliteStoreError;
pub use schema::SCHEMA_VERSION;
pub use store::SqliteStore;
