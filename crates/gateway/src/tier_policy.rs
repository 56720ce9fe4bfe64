//! Tier Policy (C2, `spec.md` §4.2) — resolves a user's [`TierDefinition`],
//! cache-backed with a consult-on-miss path into the Artifact Store, and
//! computes the admission-time fit between a request and that tier.
//!
//! Quota tracking is informational only (see `DESIGN.md` Open Questions):
//! counts accumulate in memory for the life of the process and are
//! surfaced on `/meta`, but a restart resets them and no hard 429/403 is
//! returned once a monthly quota is exceeded — `spec.md` leaves quota
//! enforcement mechanism unspecified and only requires *some* signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use cg_domain::config::TierCatalog;
use cg_domain::model::{ContentType, Tier, TierDefinition};
use cg_store::Connector;

struct CachedTier {
    tier: Tier,
    resolved_at: Instant,
}

pub struct TierPolicy {
    catalog: Arc<TierCatalog>,
    store: Arc<dyn Connector>,
    cache: DashMap<String, CachedTier>,
    cache_ttl: Duration,
    usage: DashMap<(String, ContentType), u32>,
}

impl TierPolicy {
    pub fn new(catalog: Arc<TierCatalog>, store: Arc<dyn Connector>, cache_ttl: Duration) -> Self {
        Self {
            catalog,
            store,
            cache: DashMap::new(),
            cache_ttl,
            usage: DashMap::new(),
        }
    }

    /// `resolve(user_id) -> TierDefinition` — cache-backed, falls back to
    /// `free` when the store has no record.
    pub async fn resolve(&self, user_id: &str) -> TierDefinition {
        if let Some(entry) = self.cache.get(user_id) {
            if entry.resolved_at.elapsed() < self.cache_ttl {
                return self.catalog.get(entry.tier);
            }
        }

        let tier = match self.store.get_user_tier(user_id).await {
            Ok(Some(tier)) => tier,
            Ok(None) => Tier::Free,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "tier lookup failed, defaulting to free");
                Tier::Free
            }
        };

        self.cache.insert(
            user_id.to_string(),
            CachedTier {
                tier,
                resolved_at: Instant::now(),
            },
        );
        self.catalog.get(tier)
    }

    /// Drop a cached resolution so the next `resolve` consults the store
    /// again. Called after an admin-initiated tier change.
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    /// Intersect the requested types with what the tier allows. An empty
    /// result means every requested type was rejected.
    pub fn effective_types(
        tier_def: &TierDefinition,
        requested: &[ContentType],
    ) -> (Vec<ContentType>, Vec<ContentType>) {
        let mut allowed = Vec::new();
        let mut rejected = Vec::new();
        for &ct in requested {
            if tier_def.allowed_content_types.contains(&ct) {
                allowed.push(ct);
            } else {
                rejected.push(ct);
            }
        }
        (allowed, rejected)
    }

    /// Record informational usage after a job completes successfully.
    pub fn record_usage(&self, user_id: &str, content_type: ContentType) {
        *self
            .usage
            .entry((user_id.to_string(), content_type))
            .or_insert(0) += 1;
    }

    pub fn usage_for(&self, user_id: &str, content_type: ContentType) -> u32 {
        self.usage
            .get(&(user_id.to_string(), content_type))
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use cg_domain::error::Result;
    use cg_domain::model::{Artifact, Job, JobStatus};
    use cg_store::HealthStatus;

    struct FakeStore {
        tier: Option<Tier>,
    }

    #[async_trait]
    impl Connector for FakeStore {
        async fn upsert_user(&self, _: &str, _: Tier, _: bool, _: bool) -> Result<()> {
            Ok(())
        }
        async fn get_user_tier(&self, _: &str) -> Result<Option<Tier>> {
            Ok(self.tier)
        }
        async fn create_job(&self, _: &Job) -> Result<()> {
            Ok(())
        }
        async fn get_job(&self, _: Uuid) -> Result<Option<Job>> {
            Ok(None)
        }
        async fn update_job_status(
            &self,
            _: Uuid,
            _: JobStatus,
            _: JobStatus,
            _: Option<DateTime<Utc>>,
        ) -> Result<bool> {
            Ok(true)
        }
        async fn persist_artifact(&self, _: &Artifact) -> Result<()> {
            Ok(())
        }
        async fn get_moderation_version(&self) -> Result<u32> {
            Ok(0)
        }
        async fn bump_moderation_version(&self) -> Result<u32> {
            Ok(1)
        }
        async fn health(&self) -> HealthStatus {
            HealthStatus {
                degraded: false,
                pool_size: 1,
                idle_connections: 1,
                last_error: None,
            }
        }
    }

    #[tokio::test]
    async fn resolves_free_when_store_has_no_record() {
        let policy = TierPolicy::new(
            Arc::new(TierCatalog::builtin_default()),
            Arc::new(FakeStore { tier: None }),
            Duration::from_secs(60),
        );
        let def = policy.resolve("nobody").await;
        assert_eq!(def.tier, Tier::Free);
    }

    #[tokio::test]
    async fn resolves_tier_from_store_on_cache_miss() {
        let policy = TierPolicy::new(
            Arc::new(TierCatalog::builtin_default()),
            Arc::new(FakeStore { tier: Some(Tier::Pro) }),
            Duration::from_secs(60),
        );
        let def = policy.resolve("u1").await;
        assert_eq!(def.tier, Tier::Pro);
        assert_eq!(policy.cached_entries(), 1);
    }

    #[test]
    fn effective_types_splits_allowed_and_rejected() {
        let catalog = TierCatalog::builtin_default();
        let free = catalog.get(Tier::Free);
        let (allowed, rejected) = TierPolicy::effective_types(
            &free,
            &[ContentType::Blog, ContentType::Audio],
        );
        assert_eq!(allowed, vec![ContentType::Blog]);
        assert_eq!(rejected, vec![ContentType::Audio]);
    }
}
