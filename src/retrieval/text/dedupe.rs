//! Content fingerprints for candidates that lack a structural identity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Number of leading characters that identify an unstructured candidate.
pub const FINGERPRINT_PREFIX_CHARS: usize = 100;

/// Collapse whitespace runs to one space, trim, and lowercase.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .flat_map(|word| std::iter::once(' ').chain(word.chars().flat_map(char::to_lowercase)))
        .skip(1)
        .collect()
}

/// Stable 64-bit hex digest of already-normalized text.
#[must_use]
pub fn compute_hash(normalized: &str) -> String {
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Fingerprint of the first [`FINGERPRINT_PREFIX_CHARS`] characters of `content`.
///
/// Two passages sharing an identical opening collapse to the same fingerprint.
#[must_use]
pub fn content_fingerprint(content: &str) -> String {
    let prefix: String = content.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
    compute_hash(&normalize_text(&prefix))
}
