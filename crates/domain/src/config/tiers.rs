use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{ContentType, Tier, TierDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier catalog — loaded from TIER_CONFIG_PATH (spec.md §6.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The full tier catalog, one `TierDefinition` per commercial tier.
/// Deserialized from a TOML file named by `TIER_CONFIG_PATH`; falls back
/// to [`TierCatalog::builtin_default`] when the file is absent, matching
/// the teacher gateway's "config file optional, built-in defaults always
/// available" convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCatalog {
    pub tiers: HashMap<Tier, TierDefinition>,
}

impl TierCatalog {
    /// The built-in catalog used when no `TIER_CONFIG_PATH` is configured
    /// or the file cannot be read. Tier Policy (C2) falls back to `free`
    /// for unknown users regardless (`spec.md` §4.2).
    pub fn builtin_default() -> Self {
        let mut tiers = HashMap::new();

        tiers.insert(
            Tier::Free,
            TierDefinition {
                tier: Tier::Free,
                allowed_content_types: vec![ContentType::Blog],
                monthly_quota: HashMap::from([(ContentType::Blog, 10)]),
                model_id: "gen-model-free".into(),
                max_parallel_stages: 1,
                cache_ttl_seconds: 3600,
                job_timeout_seconds: 600,
            },
        );
        tiers.insert(
            Tier::Basic,
            TierDefinition {
                tier: Tier::Basic,
                allowed_content_types: vec![ContentType::Blog, ContentType::Social],
                monthly_quota: HashMap::from([
                    (ContentType::Blog, 100),
                    (ContentType::Social, 200),
                ]),
                model_id: "gen-model-basic".into(),
                max_parallel_stages: 2,
                cache_ttl_seconds: 3600,
                job_timeout_seconds: 600,
            },
        );
        tiers.insert(
            Tier::Pro,
            TierDefinition {
                tier: Tier::Pro,
                allowed_content_types: vec![
                    ContentType::Blog,
                    ContentType::Social,
                    ContentType::Audio,
                ],
                monthly_quota: HashMap::from([
                    (ContentType::Blog, 1000),
                    (ContentType::Social, 2000),
                    (ContentType::Audio, 200),
                ]),
                model_id: "gen-model-pro".into(),
                max_parallel_stages: 4,
                cache_ttl_seconds: 1800,
                job_timeout_seconds: 600,
            },
        );
        tiers.insert(
            Tier::Enterprise,
            TierDefinition {
                tier: Tier::Enterprise,
                allowed_content_types: vec![
                    ContentType::Blog,
                    ContentType::Social,
                    ContentType::Audio,
                    ContentType::Video,
                ],
                monthly_quota: HashMap::new(),
                model_id: "gen-model-enterprise".into(),
                max_parallel_stages: 8,
                cache_ttl_seconds: 900,
                job_timeout_seconds: 1200,
            },
        );

        Self { tiers }
    }

    pub fn get(&self, tier: Tier) -> TierDefinition {
        self.tiers
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| Self::builtin_default().tiers[&Tier::Free].clone())
    }

    pub fn load_from_path(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: Self = toml::from_str(&raw)
            .map_err(|e| crate::error::Error::Config(format!("parsing {}: {e}", path.display())))?;
        Ok(catalog)
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::builtin_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_free_only_allows_blog() {
        let catalog = TierCatalog::builtin_default();
        let free = catalog.get(Tier::Free);
        assert_eq!(free.allowed_content_types, vec![ContentType::Blog]);
        assert_eq!(free.max_parallel_stages, 1);
    }

    #[test]
    fn builtin_enterprise_allows_all_types() {
        let catalog = TierCatalog::builtin_default();
        let ent = catalog.get(Tier::Enterprise);
        assert_eq!(ent.allowed_content_types.len(), 4);
        assert_eq!(ent.max_parallel_stages, 8);
    }

    #[test]
    fn get_unknown_falls_back_to_free_shape() {
        // Every variant of Tier has an entry in builtin_default, so this
        // path only triggers for a hand-built empty catalog.
        let empty = TierCatalog {
            tiers: HashMap::new(),
        };
        let resolved = empty.get(Tier::Pro);
        assert_eq!(resolved.tier, Tier::Free);
    }
}
