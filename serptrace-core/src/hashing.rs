// serptrace-core/src/hashing.rs
// ============================================================================
// Module: Serptrace Content Hashing
// Description: SHA-256 content hashing for search result deduplication.
// Purpose: Derive a stable digest for a result when the collector omits one.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Search results carry a `hash` field used to detect near-duplicate content
//! across engines and crawl runs. When a collector-supplied hash is absent or
//! malformed, it is derived from `url|title|snippet|timestamp` joined with the
//! pipe character, matching the canonical ordering the ingestion pipeline
//! expects.

use sha2::Digest;
use sha2::Sha256;

/// Length in hex characters of a SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Computes the canonical content hash for a search result.
///
/// The inputs are joined with `|` in the order `url, title, snippet,
/// timestamp` before hashing, where `timestamp` is an RFC 3339 instant.
#[must_use]
pub fn content_hash(url: &str, title: &str, snippet: &str, timestamp_iso_instant: &str) -> String {
    let joined = format!("{url}|{title}|{snippet}|{timestamp_iso_instant}");
    hex_encode(&Sha256::digest(joined.as_bytes()))
}

/// Returns `true` when `candidate` looks like a well-formed 64-character hex
/// SHA-256 digest.
#[must_use]
pub fn is_valid_sha256_hex(candidate: &str) -> bool {
    candidate.len() == SHA256_HEX_LEN && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::content_hash;
    use super::is_valid_sha256_hex;

    #[test]
    fn content_hash_is_deterministic_and_well_formed() {
        let a = content_hash("https://example.com", "Title", "snippet", "2026-01-01T00:00:00Z");
        let b = content_hash("https://example.com", "Title", "snippet", "2026-01-01T00:00:00Z");
        assert_eq!(a, b);
        assert!(is_valid_sha256_hex(&a));
    }

    #[test]
    fn differing_inputs_produce_differing_hashes() {
        let a = content_hash("https://example.com/a", "Title", "snippet", "2026-01-01T00:00:00Z");
        let b = content_hash("https://example.com/b", "Title", "snippet", "2026-01-01T00:00:00Z");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!is_valid_sha256_hex("not-a-hash"));
        assert!(!is_valid_sha256_hex(""));
    }
}
