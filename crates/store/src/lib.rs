//! Artifact Store (C7) — a relational store behind a bounded connection
//! pool, grounded on the teacher pack's `ConnectionPool` (harborgrid's
//! `database::connection_pool`): sqlx pool + health-check task + pool
//! stats, generalized here to the deliberately conservative sizing and
//! acquire-retry/no-pool-fallback contract of `spec.md` §4.7.

mod connector;
mod schema;

pub use connector::{Connector, HealthStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use cg_domain::config::PoolConfig;
use cg_domain::error::{Error, Result};
use cg_domain::model::{Artifact, ContentType, Job, JobStatus, QualityMetrics, Tier};

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_queries: u64,
    pub total_errors: u64,
    pub no_pool_fallbacks: u64,
}

pub struct ArtifactStore {
    pool: SqlitePool,
    config: PoolConfig,
    stats: Arc<RwLock<PoolStats>>,
    /// Set when the pool has been unreachable since this instant;
    /// cleared the moment a pooled acquisition succeeds again.
    degraded_since: Arc<RwLock<Option<Instant>>>,
    closed: AtomicBool,
}

impl ArtifactStore {
    pub async fn connect(config: PoolConfig) -> Result<Self> {
        let connect_options: SqliteConnectOptions = config
            .database_url
            .parse()
            .map_err(|e: sqlx::Error| Error::Config(format!("database_url: {e}")))?;
        let connect_options = connect_options
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(config.pool_size + config.overflow)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .max_lifetime(Some(Duration::from_secs(config.recycle_secs)))
            // `test_before_acquire` is sqlx's native pre-ping: every
            // checkout runs a liveness probe before being handed out.
            .test_before_acquire(true)
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::PoolUnavailable(e.to_string()))?;

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::Config(format!("schema init: {e}")))?;

        Ok(Self {
            pool,
            config,
            stats: Arc::new(RwLock::new(PoolStats::default())),
            degraded_since: Arc::new(RwLock::new(None)),
            closed: AtomicBool::new(false),
        })
    }

    /// Acquire a pooled connection with 100/200/400ms exponential
    /// backoff, up to `config.acquire_retries` attempts (`spec.md` §4.7).
    async fn acquire(&self) -> std::result::Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, ()> {
        let mut delay = Duration::from_millis(100);
        for attempt in 0..self.config.acquire_retries.max(1) {
            match self.pool.acquire().await {
                Ok(conn) => {
                    *self.degraded_since.write() = None;
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "pool acquire failed");
                    if attempt + 1 == self.config.acquire_retries.max(1) {
                        self.degraded_since.write().get_or_insert_with(Instant::now);
                        return Err(());
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(())
    }

    /// One-shot fallback connection, opened and dropped per call, used
    /// while the pool is unreachable (`spec.md` §4.7 no-pool mode).
    async fn no_pool_connection(&self) -> Result<SqliteConnection> {
        use sqlx::ConnectOptions;
        self.stats.write().no_pool_fallbacks += 1;
        let connect_options: SqliteConnectOptions = self
            .config
            .database_url
            .parse()
            .map_err(|e: sqlx::Error| Error::PoolUnavailable(e.to_string()))?;
        connect_options
            .connect()
            .await
            .map_err(|e| Error::PoolUnavailable(e.to_string()))
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_since
            .read()
            .map(|since| since.elapsed() >= Duration::from_secs(self.config.degraded_after_secs))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.read().clone()
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.close().await;
    }

    fn record_query(&self) {
        self.stats.write().total_queries += 1;
    }

    fn record_error(&self) {
        self.stats.write().total_errors += 1;
    }
}

#[async_trait]
impl Connector for ArtifactStore {
    async fn upsert_user(&self, user_id: &str, tier: Tier, is_verified: bool, is_admin: bool) -> Result<()> {
        let sql = "INSERT INTO users (id, tier, is_verified, is_admin, created_at) VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(id) DO UPDATE SET tier = excluded.tier, is_verified = excluded.is_verified, is_admin = excluded.is_admin";
        let now = Utc::now().to_rfc3339();

        let result = match self.acquire().await {
            Ok(mut conn) => {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(tier.to_string())
                    .bind(is_verified)
                    .bind(is_admin)
                    .bind(now)
                    .execute(&mut *conn)
                    .await
            }
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(tier.to_string())
                    .bind(is_verified)
                    .bind(is_admin)
                    .bind(now)
                    .execute(&mut conn)
                    .await
            }
        };

        match result {
            Ok(_) => {
                self.record_query();
                Ok(())
            }
            Err(e) => {
                self.record_error();
                Err(Error::PoolUnavailable(e.to_string()))
            }
        }
    }

    async fn get_user_tier(&self, user_id: &str) -> Result<Option<Tier>> {
        let sql = "SELECT tier FROM users WHERE id = ?";

        let row = match self.acquire().await {
            Ok(mut conn) => sqlx::query(sql).bind(user_id).fetch_optional(&mut *conn).await,
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql).bind(user_id).fetch_optional(&mut conn).await
            }
        }
        .map_err(|e| {
            self.record_error();
            Error::PoolUnavailable(e.to_string())
        })?;
        self.record_query();

        let Some(row) = row else { return Ok(None) };
        let tier: String = row.try_get("tier").map_err(|e| Error::Other(e.to_string()))?;
        Ok(tier.parse::<Tier>().ok())
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        let sql = "INSERT INTO jobs (id, user_id, status, topic, requested_types, fingerprint, created_at, started_at, finished_at, cancel_flag, last_event_seq)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)";
        let requested_types = serde_json::to_string(&job.requested_types)?;

        let bind = |q: sqlx::query::Query<'_, sqlx::Sqlite>| {
            q.bind(job.job_id.to_string())
                .bind(&job.user_id)
                .bind(job.status.as_str())
                .bind(&job.topic_display)
                .bind(requested_types.clone())
                .bind(&job.fingerprint)
                .bind(job.created_at.to_rfc3339())
                .bind(job.started_at.map(|t| t.to_rfc3339()))
                .bind(job.finished_at.map(|t| t.to_rfc3339()))
                .bind(job.last_event_seq as i64)
        };

        let result = match self.acquire().await {
            Ok(mut conn) => {
                let mut tx = conn.begin().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                let r = bind(sqlx::query(sql)).execute(&mut *tx).await;
                if r.is_ok() {
                    tx.commit().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                }
                r
            }
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                let mut tx = conn.begin().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                let r = bind(sqlx::query(sql)).execute(&mut *tx).await;
                if r.is_ok() {
                    tx.commit().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                }
                r
            }
        };

        match result {
            Ok(_) => {
                self.record_query();
                Ok(())
            }
            Err(e) => {
                self.record_error();
                Err(Error::PoolUnavailable(e.to_string()))
            }
        }
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let sql = "SELECT id, user_id, status, topic, requested_types, fingerprint, created_at, started_at, finished_at, last_event_seq FROM jobs WHERE id = ?";

        let row = match self.acquire().await {
            Ok(mut conn) => sqlx::query(sql).bind(job_id.to_string()).fetch_optional(&mut *conn).await,
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql).bind(job_id.to_string()).fetch_optional(&mut conn).await
            }
        }
        .map_err(|e| {
            self.record_error();
            Error::PoolUnavailable(e.to_string())
        })?;
        self.record_query();

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_job(&row)?))
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let sql = "UPDATE jobs SET status = ?, finished_at = COALESCE(?, finished_at) WHERE id = ? AND status = ?";

        let result = match self.acquire().await {
            Ok(mut conn) => {
                sqlx::query(sql)
                    .bind(to.as_str())
                    .bind(finished_at.map(|t| t.to_rfc3339()))
                    .bind(job_id.to_string())
                    .bind(from.as_str())
                    .execute(&mut *conn)
                    .await
            }
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql)
                    .bind(to.as_str())
                    .bind(finished_at.map(|t| t.to_rfc3339()))
                    .bind(job_id.to_string())
                    .bind(from.as_str())
                    .execute(&mut conn)
                    .await
            }
        };

        match result {
            Ok(r) => {
                self.record_query();
                // rows_affected == 0 means a concurrent writer already
                // moved the job past `from` — an idempotent no-op, not
                // an error (`spec.md` §4.7 Idempotency).
                Ok(r.rows_affected() > 0)
            }
            Err(e) => {
                self.record_error();
                Err(Error::PoolUnavailable(e.to_string()))
            }
        }
    }

    async fn persist_artifact(&self, artifact: &Artifact) -> Result<()> {
        let sql = "INSERT INTO artifacts (id, job_id, user_id, type, content, asset_uri, fingerprint, metrics, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let metrics = serde_json::to_string(&artifact.quality_metrics)?;

        let bind = |q: sqlx::query::Query<'_, sqlx::Sqlite>| {
            q.bind(artifact.artifact_id.to_string())
                .bind(artifact.job_id.to_string())
                .bind(&artifact.user_id)
                .bind(artifact.artifact_type.as_str())
                .bind(&artifact.content)
                .bind(&artifact.asset_uri)
                .bind(&artifact.fingerprint)
                .bind(metrics.clone())
                .bind(artifact.created_at.to_rfc3339())
        };

        let result = match self.acquire().await {
            Ok(mut conn) => {
                let mut tx = conn.begin().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                let r = bind(sqlx::query(sql)).execute(&mut *tx).await;
                if r.is_ok() {
                    tx.commit().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                }
                r
            }
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                let mut tx = conn.begin().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                let r = bind(sqlx::query(sql)).execute(&mut *tx).await;
                if r.is_ok() {
                    tx.commit().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
                }
                r
            }
        };

        match result {
            Ok(_) => {
                self.record_query();
                Ok(())
            }
            Err(e) => {
                self.record_error();
                Err(Error::PoolUnavailable(e.to_string()))
            }
        }
    }

    async fn get_moderation_version(&self) -> Result<u32> {
        let sql = "SELECT moderation_version FROM settings WHERE id = 1";
        let row = match self.acquire().await {
            Ok(mut conn) => sqlx::query(sql).fetch_one(&mut *conn).await,
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql).fetch_one(&mut conn).await
            }
        }
        .map_err(|e| Error::PoolUnavailable(e.to_string()))?;
        self.record_query();
        let v: i64 = row.try_get("moderation_version").map_err(|e| Error::PoolUnavailable(e.to_string()))?;
        Ok(v as u32)
    }

    async fn bump_moderation_version(&self) -> Result<u32> {
        let sql = "UPDATE settings SET moderation_version = moderation_version + 1 WHERE id = 1";
        match self.acquire().await {
            Ok(mut conn) => sqlx::query(sql).execute(&mut *conn).await,
            Err(()) => {
                let mut conn = self.no_pool_connection().await?;
                sqlx::query(sql).execute(&mut conn).await
            }
        }
        .map_err(|e| Error::PoolUnavailable(e.to_string()))?;
        self.record_query();
        self.get_moderation_version().await
    }

    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        let ok = sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok();
        let _ = start.elapsed();
        HealthStatus {
            degraded: !ok || self.is_degraded(),
            pool_size: self.pool.size(),
            idle_connections: self.pool.num_idle(),
            last_error: if ok { None } else { Some("SELECT 1 failed".into()) },
        }
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let id: String = row.try_get("id").map_err(|e| Error::Other(e.to_string()))?;
    let user_id: String = row.try_get("user_id").map_err(|e| Error::Other(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| Error::Other(e.to_string()))?;
    let topic: String = row.try_get("topic").map_err(|e| Error::Other(e.to_string()))?;
    let requested_types: String = row.try_get("requested_types").map_err(|e| Error::Other(e.to_string()))?;
    let fingerprint: String = row.try_get("fingerprint").map_err(|e| Error::Other(e.to_string()))?;
    let created_at: String = row.try_get("created_at").map_err(|e| Error::Other(e.to_string()))?;
    let started_at: Option<String> = row.try_get("started_at").map_err(|e| Error::Other(e.to_string()))?;
    let finished_at: Option<String> = row.try_get("finished_at").map_err(|e| Error::Other(e.to_string()))?;
    let last_event_seq: i64 = row.try_get("last_event_seq").map_err(|e| Error::Other(e.to_string()))?;

    Ok(Job {
        job_id: Uuid::parse_str(&id).map_err(|e| Error::Other(e.to_string()))?,
        user_id,
        topic_normalized: cg_domain::fingerprint::normalize_topic(&topic),
        topic_display: topic,
        requested_types: serde_json::from_str::<Vec<ContentType>>(&requested_types)?,
        status: parse_job_status(&status)?,
        created_at: parse_rfc3339(&created_at)?,
        started_at: started_at.map(|s| parse_rfc3339(&s)).transpose()?,
        finished_at: finished_at.map(|s| parse_rfc3339(&s)).transpose()?,
        last_event_seq: last_event_seq as u64,
        fingerprint,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(e.to_string()))
}

fn parse_job_status(s: &str) -> Result<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(Error::Other(format!("unknown job status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> ArtifactStore {
        // A single connection: separate connections to `sqlite::memory:`
        // are independent, unshared databases, so the pool must never
        // grow past one for these tests to see a consistent schema.
        ArtifactStore::connect(PoolConfig {
            database_url: "sqlite::memory:".into(),
            pool_size: 1,
            overflow: 0,
            acquire_retries: 2,
            ..PoolConfig::default()
        })
        .await
        .expect("in-memory store should connect")
    }

    fn sample_job(fingerprint: &str) -> Job {
        Job {
            job_id: Uuid::new_v4(),
            user_id: "u1".into(),
            topic_normalized: "ai in healthcare".into(),
            topic_display: "AI in Healthcare".into(),
            requested_types: vec![ContentType::Blog],
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_event_seq: 0,
            fingerprint: fingerprint.into(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_job_roundtrips() {
        let store = memory_store().await;
        let job = sample_job("fp1");
        store.create_job(&job).await.unwrap();

        let fetched = store.get_job(job.job_id).await.unwrap().expect("job exists");
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.requested_types, vec![ContentType::Blog]);
    }

    #[tokio::test]
    async fn update_job_status_is_conditional_and_idempotent() {
        let store = memory_store().await;
        let job = sample_job("fp2");
        store.create_job(&job).await.unwrap();

        let updated = store
            .update_job_status(job.job_id, JobStatus::Pending, JobStatus::Running, None)
            .await
            .unwrap();
        assert!(updated);

        // A second attempt from the now-stale `from` state is a no-op,
        // not an error — simulates a losing concurrent writer.
        let stale = store
            .update_job_status(job.job_id, JobStatus::Pending, JobStatus::Running, None)
            .await
            .unwrap();
        assert!(!stale);

        let fetched = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn persist_artifact_then_fetch_job_unaffected() {
        let store = memory_store().await;
        let job = sample_job("fp3");
        store.create_job(&job).await.unwrap();

        let artifact = Artifact {
            artifact_id: Uuid::new_v4(),
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            artifact_type: ContentType::Blog,
            content: Some("hello world".into()),
            asset_uri: None,
            fingerprint: job.fingerprint.clone(),
            quality_metrics: QualityMetrics {
                word_count: Some(2),
                char_count: Some(11),
                estimated_read_minutes: Some(0.1),
            },
            created_at: Utc::now(),
        };
        store.persist_artifact(&artifact).await.unwrap();
    }

    #[tokio::test]
    async fn moderation_version_starts_at_zero_and_bumps() {
        let store = memory_store().await;
        assert_eq!(store.get_moderation_version().await.unwrap(), 0);
        assert_eq!(store.bump_moderation_version().await.unwrap(), 1);
        assert_eq!(store.bump_moderation_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent() {
        let store = memory_store().await;
        store.upsert_user("u1", Tier::Free, false, false).await.unwrap();
        store.upsert_user("u1", Tier::Pro, true, false).await.unwrap();
    }

    #[tokio::test]
    async fn get_user_tier_reflects_latest_upsert() {
        let store = memory_store().await;
        assert!(store.get_user_tier("nobody").await.unwrap().is_none());
        store.upsert_user("u1", Tier::Basic, true, false).await.unwrap();
        assert_eq!(store.get_user_tier("u1").await.unwrap(), Some(Tier::Basic));
        store.upsert_user("u1", Tier::Pro, true, false).await.unwrap();
        assert_eq!(store.get_user_tier("u1").await.unwrap(), Some(Tier::Pro));
    }

    #[tokio::test]
    async fn health_reports_not_degraded_when_reachable() {
        let store = memory_store().await;
        let status = store.health().await;
        assert!(!status.degraded);
    }
}
