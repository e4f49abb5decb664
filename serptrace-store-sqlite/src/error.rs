// serptrace-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// ============================================================================

//! Errors specific to the SQLite backend, convertible into the backend-
//! agnostic [`serptrace_core::StoreError`].

use serptrace_core::StoreError;
use thiserror::Error;

/// Errors raised while opening or operating a [`crate::store::SqliteStore`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Failed to create the parent directory or open the database file.
    #[error("sqlite io failure: {0}")]
    Io(String),
    /// A query or statement failed against an open connection.
    #[error("sqlite failure: {0}")]
    Db(String),
    /// A stored row could not be decoded into its domain type.
    #[error("sqlite row is corrupt: {0}")]
    Corrupt(String),
    /// The on-disk schema version predates or postdates what this binary
    /// supports.
    #[error("sqlite schema version mismatch: {0}")]
    VersionMismatch(String),
    /// The caller supplied an invalid configuration or request.
    #[error("invalid sqlite store configuration: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for SqliteStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Io(msg) => Self::Io(msg),
            SqliteStoreError::Db(msg) => Self::Backend(msg),
            SqliteStoreError::Corrupt(msg) => Self::Corrupt(msg),
            SqliteStoreError::VersionMismatch(msg) => Self::VersionMismatch(msg),
            SqliteStoreError::Invalid(msg) => Self::Invalid(msg),
        }
    }
}
