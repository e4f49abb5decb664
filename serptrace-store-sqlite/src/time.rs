// serptrace-store-sqlite/src/time.rs
// ============================================================================
// Module: SQLite Timestamp Conversion
// ============================================================================

//! `DateTime<Utc>` is stored as milliseconds since the epoch; SQLite has no
//! native timestamp type and millisecond integers sort and range-filter
//! correctly without a collation helper.

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;

use crate::error::SqliteStoreError;

/// Converts an instant to epoch milliseconds for storage.
#[must_use]
pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Converts epoch milliseconds back into an instant.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Corrupt`] if `millis` is out of the range
/// `chrono` can represent.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>, SqliteStoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid timestamp millis: {millis}")))
}

/// Converts an optional instant to optional epoch milliseconds.
#[must_use]
pub fn to_millis_opt(instant: Option<DateTime<Utc>>) -> Option<i64> {
    instant.map(to_millis)
}

/// Converts optional epoch milliseconds back into an optional instant.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Corrupt`] if the value is out of range.
pub fn from_millis_opt(millis: Option<i64>) -> Result<Option<DateTime<Utc>>, SqliteStoreError> {
    millis.map(from_millis).transpose()
}
