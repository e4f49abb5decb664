// serptrace-core/src/store/mod.rs
// ============================================================================
// Module: Storage Backends
// ============================================================================

//! In-process [`Storage`](crate::storage::Storage) implementations. The
//! production SQLite-backed implementation lives in `serptrace-store-sqlite`
//! to keep this crate free of a `rusqlite` dependency.

pub mod memory;
pub mod shared;

pub use memory::InMemoryStore;
pub use shared::SharedStorage;
