use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content Cache (spec.md §4.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Soft LRU cap bounding memory regardless of TTL.
    #[serde(default = "d_max_entries")]
    pub max_entries: u64,
    /// Moderation version starts at this value; bumped via
    /// `/api/admin/moderation/bump-version`.
    #[serde(default)]
    pub initial_moderation_version: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: d_max_entries(),
            initial_moderation_version: 0,
        }
    }
}

fn d_max_entries() -> u64 {
    10_000
}
