//! Surrogate-key generator
//!
//! Dimension rows are keyed by a content-addressed 64-bit id computed from
//! their business-key columns. Fact pipelines recompute the same id inline
//! from the business codes they carry, so loading a fact table never needs a
//! dimension lookup.
//!
//! CRITICAL: this function must be stable across processes, machines and
//! releases. It hashes with SHA-256 (fully specified, no per-process seed)
//! and takes the low 63 bits of the digest as a non-negative i64.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Separator between hash-column values in the canonical input string.
const SEPARATOR: &str = "|";

/// Strip surrounding whitespace and single quotes from a raw cell value.
///
/// FAO exports frequently quote numeric codes with a leading apostrophe
/// ("'012"). The same normalization runs in the cleaner, so dimension and
/// fact sides hash identical canonical strings.
pub fn normalize(value: &str) -> &str {
    value.trim().trim_matches('\'').trim()
}

/// Compute the surrogate key for `row` over `hash_columns`.
///
/// Returns None when any hash column is missing, null, or empty after
/// normalization: a fact row with a blank business code carries a null
/// foreign key instead of a bogus referent.
pub fn fingerprint(
    row: &HashMap<String, Option<String>>,
    hash_columns: &[&str],
) -> Option<i64> {
    let mut canonical = String::new();
    for (i, col) in hash_columns.iter().enumerate() {
        let value = row.get(*col)?.as_deref()?;
        let value = normalize(value);
        if value.is_empty() {
            return None;
        }
        if i > 0 {
            canonical.push_str(SEPARATOR);
        }
        canonical.push_str(value);
    }
    Some(digest_i63(&canonical))
}

/// Low 63 bits of SHA-256(input), as a non-negative i64.
fn digest_i63(input: &str) -> i64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut first8 = [0u8; 8];
    first8.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(first8) & 0x7fff_ffff_ffff_ffff) as i64
}

// =============================================================================
// TESTS - the fingerprint contract is the referential-integrity contract
// =============================================================================
