use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact Store connection pool (spec.md §4.7)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deliberately conservative pool sizing — `spec.md` §4.7 specifies
/// these exact defaults so that pool exhaustion (and the no-pool
/// fallback path) is exercised under realistic load rather than hidden
/// behind a huge pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "d_pool_size")]
    pub pool_size: u32,
    #[serde(default = "d_overflow")]
    pub overflow: u32,
    #[serde(default = "d_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "d_recycle_secs")]
    pub recycle_secs: u64,
    /// TCP keepalive idle time before the first probe.
    #[serde(default = "d_keepalive_idle_secs")]
    pub keepalive_idle_secs: u64,
    #[serde(default = "d_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "d_keepalive_count")]
    pub keepalive_count: u32,
    /// Number of acquire retries with 100/200/400ms exponential backoff
    /// before falling through to no-pool mode.
    #[serde(default = "d_acquire_retries")]
    pub acquire_retries: u32,
    /// How long the pool must stay unreachable before `/health` reports
    /// `degraded`.
    #[serde(default = "d_degraded_after_secs")]
    pub degraded_after_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://contentgen.db".into(),
            pool_size: d_pool_size(),
            overflow: d_overflow(),
            acquire_timeout_secs: d_acquire_timeout_secs(),
            recycle_secs: d_recycle_secs(),
            keepalive_idle_secs: d_keepalive_idle_secs(),
            keepalive_interval_secs: d_keepalive_interval_secs(),
            keepalive_count: d_keepalive_count(),
            acquire_retries: d_acquire_retries(),
            degraded_after_secs: d_degraded_after_secs(),
        }
    }
}

fn d_pool_size() -> u32 {
    2
}
fn d_overflow() -> u32 {
    3
}
fn d_acquire_timeout_secs() -> u64 {
    10
}
fn d_recycle_secs() -> u64 {
    15 * 60
}
fn d_keepalive_idle_secs() -> u64 {
    30
}
fn d_keepalive_interval_secs() -> u64 {
    10
}
fn d_keepalive_count() -> u32 {
    3
}
fn d_acquire_retries() -> u32 {
    3
}
fn d_degraded_after_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.overflow, 3);
        assert_eq!(cfg.acquire_timeout_secs, 10);
        assert_eq!(cfg.recycle_secs, 900);
        assert_eq!(cfg.acquire_retries, 3);
    }
}
