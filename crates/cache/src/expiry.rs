use std::time::{Duration, Instant};

use moka::Expiry;

use cg_domain::model::ArtifactBundle;

/// Stored value plus its tier-derived TTL. `moka`'s built-in
/// `time_to_live` is a single fixed duration for the whole cache; TTL
/// here varies per entry by tier (`spec.md` §4.3 "TTL comes from the
/// tier"), so the duration travels with the value and a custom
/// [`Expiry`] reads it back out.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bundle: ArtifactBundle,
    pub ttl: Duration,
}

pub struct FingerprintExpiry;

impl Expiry<String, CacheEntry> for FingerprintExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}
