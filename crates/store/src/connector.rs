use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use cg_domain::error::{Error, Result};
use cg_domain::model::{Artifact, Job, JobStatus, Tier};

/// Capability set the Scheduler and Pipeline Adapter depend on (`spec.md`
/// §9 "express the pool as one variant of a `Connector` capability set").
/// The worker holds `Arc<dyn Connector>`, never a `SqlitePool` — whether a
/// given call lands on the pooled path or the one-shot no-pool fallback is
/// `ArtifactStore`'s own business.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn upsert_user(&self, user_id: &str, tier: Tier, is_verified: bool, is_admin: bool) -> Result<()>;

    /// Authoritative tier lookup backing C2's `resolve(user_id)` cache
    /// miss path (`spec.md` §4.2). `None` means the user has never been
    /// upserted — callers fall back to `free`.
    async fn get_user_tier(&self, user_id: &str) -> Result<Option<Tier>>;

    /// Standalone transaction (`spec.md` §4.7 Transactional boundaries).
    async fn create_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Conditional `UPDATE ... WHERE status = from`. Returns `true` if the
    /// row was updated, `false` if a concurrent transition already moved
    /// it past `from` (idempotent no-op, not an error).
    async fn update_job_status(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Standalone transaction. Callers must commit this *before*
    /// publishing the corresponding `artifact_ready` event (`spec.md`
    /// §4.7, §4.6 step 3 — write order: persist then publish).
    async fn persist_artifact(&self, artifact: &Artifact) -> Result<()>;

    async fn get_moderation_version(&self) -> Result<u32>;

    async fn bump_moderation_version(&self) -> Result<u32>;

    async fn health(&self) -> HealthStatus;
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub degraded: bool,
    pub pool_size: u32,
    pub idle_connections: usize,
    pub last_error: Option<String>,
}

/// Maps a propagated store error onto the stable `error_type` surfaced to
/// clients when every recovery path has been exhausted.
pub fn pool_unavailable(detail: impl Into<String>) -> Error {
    Error::PoolUnavailable(detail.into())
}
