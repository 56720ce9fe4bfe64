//! Content Cache (C3) — fingerprint-keyed artifact bundle cache with
//! single-flight generation and tier-driven variable TTL (`spec.md` §4.3).
//!
//! Mirrors the teacher's in-process cache layering: a `moka` store for the
//! published bundles plus a `DashMap` of in-flight latches for the
//! single-flight contract. Followers never re-run the pipeline; they wait
//! on the leader's [`tokio::sync::Notify`] and read whatever the leader
//! left behind.

mod expiry;
mod inflight;

pub use expiry::CacheEntry;
pub use inflight::{BeginOutcome, Inflight, LeaderToken};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use moka::future::Cache;

use cg_domain::model::ArtifactBundle;

use expiry::FingerprintExpiry;
use inflight::Inflight;

/// Result of [`ContentCache::lookup`].
#[derive(Debug, Clone)]
pub enum LookupResult {
    Hit(ArtifactBundle),
    Miss,
    InFlight,
}

/// Leader-only outcome passed to [`ContentCache::publish`]/[`ContentCache::abort`].
#[derive(Debug, Clone)]
pub struct PublishError(pub String);

/// The fingerprint → artifact bundle cache plus its single-flight latch map.
///
/// Strictly a performance layer: every method here is infallible from the
/// caller's point of view except through the `abort`/error channel a
/// leader explicitly chooses to propagate. A bug here must never corrupt
/// job state (`spec.md` §4.3 Failure semantics) — callers that can't reach
/// the cache should treat it as a miss and proceed with generation.
pub struct ContentCache {
    store: Cache<String, CacheEntry>,
    inflight: DashMap<String, Arc<Inflight>>,
    /// user_id -> fingerprints that user has ever begun/published, for
    /// `invalidate(user_id)`. Fingerprints don't encode `user_id`
    /// themselves, so this is the only way to scope an invalidation to a
    /// single user without flushing the whole cache.
    by_user: DashMap<String, DashSet<String>>,
    generation: AtomicU64,
}

impl ContentCache {
    pub fn new(max_entries: u64) -> Self {
        let store = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(FingerprintExpiry)
            .build();
        Self {
            store,
            inflight: DashMap::new(),
            by_user: DashMap::new(),
            generation: AtomicU64::new(1),
        }
    }

    /// `lookup(fingerprint) -> Bundle | Miss | InFlight` (`spec.md` §4.3).
    pub async fn lookup(&self, fingerprint: &str) -> LookupResult {
        if let Some(entry) = self.store.get(fingerprint).await {
            return LookupResult::Hit(entry.bundle);
        }
        if self.inflight.contains_key(fingerprint) {
            return LookupResult::InFlight;
        }
        LookupResult::Miss
    }

    /// `begin(fingerprint) -> LeaderToken | Follower(token)`. Atomic: at
    /// most one caller per fingerprint becomes leader.
    pub async fn begin(&self, fingerprint: &str, user_id: &str) -> BeginOutcome {
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(fingerprint.to_string());

        // `DashMap::entry` holds the shard lock for the duration of the
        // closure, which is what gives us atomicity here: only one caller
        // can ever observe a vacant entry for a given fingerprint.
        let mut became_leader = false;
        let inflight = self
            .inflight
            .entry(fingerprint.to_string())
            .or_insert_with(|| {
                became_leader = true;
                Arc::new(Inflight::new(self.generation.fetch_add(1, Ordering::SeqCst)))
            })
            .clone();

        if became_leader {
            BeginOutcome::Leader(LeaderToken {
                fingerprint: fingerprint.to_string(),
                generation: inflight.generation,
            })
        } else {
            BeginOutcome::Follower(inflight)
        }
    }

    /// Leader-only: store the bundle, wake followers, clear the inflight
    /// entry. A stale token (from a superseded generation — e.g. after an
    /// `invalidate` raced a `begin`) is a silent no-op: the cache is a
    /// performance layer, not a correctness boundary.
    pub async fn publish(&self, token: LeaderToken, bundle: ArtifactBundle, ttl: Duration) {
        if !self.token_is_current(&token) {
            return;
        }
        self.store
            .insert(
                token.fingerprint.clone(),
                CacheEntry {
                    bundle: bundle.clone(),
                    ttl,
                },
            )
            .await;
        if let Some((_, inflight)) = self.inflight.remove(&token.fingerprint) {
            inflight.resolve(Ok(bundle));
        }
    }

    /// Leader-only: propagate one error to all followers, clear the
    /// inflight entry without storing anything.
    pub fn abort(&self, token: LeaderToken, error: PublishError) {
        if !self.token_is_current(&token) {
            return;
        }
        if let Some((_, inflight)) = self.inflight.remove(&token.fingerprint) {
            inflight.resolve(Err(error));
        }
    }

    fn token_is_current(&self, token: &LeaderToken) -> bool {
        self.inflight
            .get(&token.fingerprint)
            .map(|i| i.generation == token.generation)
            .unwrap_or(false)
    }

    /// `invalidate(fingerprint)` — admin plane. Removes any published
    /// bundle; an in-flight build (if any) is left alone, since it's not
    /// wrong, just possibly stale the instant it lands.
    pub async fn invalidate_fingerprint(&self, fingerprint: &str) {
        self.store.invalidate(fingerprint);
    }

    /// `invalidate(user_id)` — invalidates every fingerprint this user has
    /// ever begun or published against. Other users sharing the same
    /// fingerprint also miss on their next lookup; that's an accepted
    /// side effect of an admin-scoped operation.
    pub async fn invalidate_user(&self, user_id: &str) {
        if let Some((_, fingerprints)) = self.by_user.remove(user_id) {
            for fp in fingerprints.iter() {
                self.store.invalidate(fp.key());
            }
        }
    }

    /// `invalidate(all)` — full flush, e.g. paired with a moderation
    /// version bump in tests or an operator-triggered reset. In normal
    /// operation a moderation bump needs no cache-side call at all: it
    /// changes the fingerprint tuple itself, so old entries simply stop
    /// being addressed (`spec.md` §4.3 Eviction).
    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
        self.by_user.clear();
    }

    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::model::{Artifact, ContentType, QualityMetrics};
    use std::collections::HashMap;

    fn bundle() -> ArtifactBundle {
        let mut artifacts = HashMap::new();
        artifacts.insert(
            ContentType::Blog,
            Artifact {
                artifact_id: uuid::Uuid::new_v4(),
                job_id: uuid::Uuid::new_v4(),
                user_id: "u1".into(),
                artifact_type: ContentType::Blog,
                content: Some("hello".into()),
                asset_uri: None,
                fingerprint: "fp1".into(),
                quality_metrics: QualityMetrics::default(),
                created_at: chrono::Utc::now(),
            },
        );
        ArtifactBundle { artifacts }
    }

    #[tokio::test]
    async fn lookup_miss_on_empty_cache() {
        let cache = ContentCache::new(100);
        assert!(matches!(cache.lookup("fp1").await, LookupResult::Miss));
    }

    #[tokio::test]
    async fn begin_first_caller_is_leader() {
        let cache = ContentCache::new(100);
        let outcome = cache.begin("fp1", "u1").await;
        assert!(matches!(outcome, BeginOutcome::Leader(_)));
    }

    #[tokio::test]
    async fn second_caller_is_follower_and_sees_inflight() {
        let cache = ContentCache::new(100);
        let _leader = cache.begin("fp1", "u1").await;
        assert!(matches!(cache.lookup("fp1").await, LookupResult::InFlight));
        let follower = cache.begin("fp1", "u2").await;
        assert!(matches!(follower, BeginOutcome::Follower(_)));
    }

    #[tokio::test]
    async fn publish_resolves_followers_and_stores_bundle() {
        let cache = ContentCache::new(100);
        let leader = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        let follower = match cache.begin("fp1", "u2").await {
            BeginOutcome::Follower(inflight) => inflight,
            _ => unreachable!(),
        };

        let b = bundle();
        cache
            .publish(leader, b.clone(), Duration::from_secs(60))
            .await;

        let resolved = follower.wait().await.expect("leader published a bundle");
        assert_eq!(resolved.artifacts.len(), b.artifacts.len());

        match cache.lookup("fp1").await {
            LookupResult::Hit(got) => assert_eq!(got.artifacts.len(), 1),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_propagates_error_to_followers() {
        let cache = ContentCache::new(100);
        let leader = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        let follower = match cache.begin("fp1", "u2").await {
            BeginOutcome::Follower(inflight) => inflight,
            _ => unreachable!(),
        };

        cache.abort(leader, PublishError("pipeline exploded".into()));

        let result = follower.wait().await;
        assert!(result.is_err());
        assert!(matches!(cache.lookup("fp1").await, LookupResult::Miss));
    }

    #[tokio::test]
    async fn invalidate_fingerprint_clears_entry() {
        let cache = ContentCache::new(100);
        let leader = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        cache
            .publish(leader, bundle(), Duration::from_secs(60))
            .await;
        cache.invalidate_fingerprint("fp1").await;
        assert!(matches!(cache.lookup("fp1").await, LookupResult::Miss));
    }

    #[tokio::test]
    async fn invalidate_user_clears_only_that_users_fingerprints() {
        let cache = ContentCache::new(100);
        let leader1 = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        cache
            .publish(leader1, bundle(), Duration::from_secs(60))
            .await;
        let leader2 = match cache.begin("fp2", "u2").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        cache
            .publish(leader2, bundle(), Duration::from_secs(60))
            .await;

        cache.invalidate_user("u1").await;

        assert!(matches!(cache.lookup("fp1").await, LookupResult::Miss));
        assert!(matches!(cache.lookup("fp2").await, LookupResult::Hit(_)));
    }

    #[tokio::test]
    async fn invalidate_all_flushes_everything() {
        let cache = ContentCache::new(100);
        let leader = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        cache
            .publish(leader, bundle(), Duration::from_secs(60))
            .await;
        cache.invalidate_all();
        assert!(matches!(cache.lookup("fp1").await, LookupResult::Miss));
    }

    #[tokio::test]
    async fn stale_token_publish_is_noop_after_abort_and_retry() {
        // Leader aborts, a new leader begins under the same fingerprint
        // (new generation). The old token must not be able to publish
        // over the new generation's inflight slot.
        let cache = ContentCache::new(100);
        let leader1 = match cache.begin("fp1", "u1").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };
        cache.abort(leader1.clone(), PublishError("boom".into()));

        let leader2 = match cache.begin("fp1", "u2").await {
            BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };

        // Stale token from the first generation must not resolve the new one.
        cache
            .publish(leader1, bundle(), Duration::from_secs(60))
            .await;
        assert!(matches!(cache.lookup("fp1").await, LookupResult::InFlight));

        cache
            .publish(leader2, bundle(), Duration::from_secs(60))
            .await;
        assert!(matches!(cache.lookup("fp1").await, LookupResult::Hit(_)));
    }
}
