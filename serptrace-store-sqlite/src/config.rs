// serptrace-store-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Store Configuration
// ============================================================================

//! Connection and durability knobs for [`crate::store::SqliteStore`].

use serde::Deserialize;
use serde::Serialize;

/// Default SQLite busy-timeout, in milliseconds.
fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_journal_mode() -> SqliteJournalMode {
    SqliteJournalMode::Wal
}

fn default_sync_mode() -> SqliteSyncMode {
    SqliteSyncMode::Normal
}

/// SQLite `journal_mode` pragma setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// Write-ahead log; the default for concurrent read access.
    Wal,
    /// Classic rollback journal.
    Delete,
    /// Rollback journal truncated rather than deleted after each transaction.
    Truncate,
    /// In-memory journal; durability is not guaranteed across a crash.
    Memory,
}

impl SqliteJournalMode {
    /// Returns the pragma value SQLite expects.
    #[must_use]
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
        }
    }
}

/// SQLite `synchronous` pragma setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// No `fsync` calls; fastest, least durable.
    Off,
    /// `fsync` at critical moments; safe under WAL.
    Normal,
    /// `fsync` on every write; slowest, most durable.
    Full,
}

impl SqliteSyncMode {
    /// Returns the pragma value SQLite expects.
    #[must_use]
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

/// Configuration for opening a [`crate::store::SqliteStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Filesystem path to the database file. Parent directories are created
    /// if missing.
    pub path: String,
    /// How long a connection waits on a lock before returning `SQLITE_BUSY`.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode applied on open.
    #[serde(default = "default_journal_mode")]
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode applied on open.
    #[serde(default = "default_sync_mode")]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a config pointed at `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: default_journal_mode(),
            sync_mode: default_sync_mode(),
        }
    }
}
