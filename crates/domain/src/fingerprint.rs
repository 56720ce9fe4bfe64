//! Content fingerprinting (`spec.md` §4.3).
//!
//! The fingerprint is a deterministic digest over the canonical tuple
//! `(normalized_topic, sorted_requested_types, model_id,
//! moderation_version, cache_schema_version)`. Two requests that would
//! produce the same pipeline output must hash identically; two requests
//! that differ in any of these fields must not.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::model::ContentType;

/// Schema version for the fingerprint tuple itself. Bump this if the
/// tuple shape changes, to avoid silently colliding with pre-bump cache
/// entries on a rolling deploy.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Normalize a topic string per `spec.md` §4.3: Unicode NFKC, collapse
/// internal whitespace, lowercase, trim.
pub fn normalize_topic(raw: &str) -> String {
    let nfkc: String = raw.nfkc().collect();
    let collapsed = nfkc.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim().to_lowercase()
}

/// Compute the fingerprint for a (topic, types, model, moderation version)
/// tuple. Rendered as a lowercase hex string of a SHA-256 digest.
pub fn fingerprint(
    normalized_topic: &str,
    requested_types: &[ContentType],
    model_id: &str,
    moderation_version: u32,
) -> String {
    let mut sorted_types: Vec<&str> = requested_types.iter().map(|t| t.as_str()).collect();
    sorted_types.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(normalized_topic.as_bytes());
    hasher.update(b"\0");
    hasher.update(sorted_types.join(",").as_bytes());
    hasher.update(b"\0");
    hasher.update(model_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(moderation_version.to_le_bytes());
    hasher.update(b"\0");
    hasher.update(CACHE_SCHEMA_VERSION.to_le_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_topic("  AI   in   Healthcare  "), "ai in healthcare");
    }

    #[test]
    fn normalize_folds_fullwidth_forms_via_nfkc() {
        assert_eq!(normalize_topic("\u{FF21}\u{FF29}"), normalize_topic("AI"));
    }

    #[test]
    fn fingerprint_is_order_independent_over_types() {
        let a = fingerprint(
            "ai in healthcare",
            &[ContentType::Blog, ContentType::Audio],
            "gpt-tier-basic",
            1,
        );
        let b = fingerprint(
            "ai in healthcare",
            &[ContentType::Audio, ContentType::Blog],
            "gpt-tier-basic",
            1,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_moderation_version() {
        let a = fingerprint("topic", &[ContentType::Blog], "m1", 1);
        let b = fingerprint("topic", &[ContentType::Blog], "m1", 2);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_model() {
        let a = fingerprint("topic", &[ContentType::Blog], "m1", 1);
        let b = fingerprint("topic", &[ContentType::Blog], "m2", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("topic", &[ContentType::Blog], "m1", 1);
        let b = fingerprint("topic", &[ContentType::Blog], "m1", 1);
        assert_eq!(a, b);
    }
}
