//! Job Scheduler (C5, `spec.md` §4.5) — the admission sequence and the
//! global worker slot pool that turns an admitted request into a running
//! [`cg_pipeline::PipelineAdapter::run_job`] task.
//!
//! Mirrors the teacher's `runtime::runs`/`runtime::tasks` split between
//! "accept and record" and "actually execute on a bounded worker pool",
//! generalized from the teacher's per-session task runner to a single
//! global `Semaphore`-backed slot pool (`spec.md` §5 "no per-tier
//! reservation, FIFO, no preemption").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::DashSet;
use tokio::sync::Semaphore;
use uuid::Uuid;

use cg_bus::EventBus;
use cg_cache::{BeginOutcome, ContentCache, LookupResult};
use cg_domain::config::JobConfig;
use cg_domain::error::{Error, Result};
use cg_domain::fingerprint::{fingerprint, normalize_topic};
use cg_domain::model::{ContentType, EventKind, Job, JobStatus, Principal};
use cg_pipeline::{CancelRegistry, PipelineAdapter, RunParams};
use cg_store::Connector;

use crate::tier_policy::TierPolicy;

/// A successfully admitted request, handed back to the HTTP layer so it
/// can redirect the caller to `/api/jobs/{id}/stream`.
pub struct Admission {
    pub job_id: Uuid,
}

pub struct Scheduler {
    store: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    cache: Arc<ContentCache>,
    tier_policy: Arc<TierPolicy>,
    pipeline: Arc<PipelineAdapter>,
    cancel_registry: Arc<CancelRegistry>,
    worker_slots: Arc<Semaphore>,
    active_jobs: Arc<DashMap<String, DashSet<Uuid>>>,
    job_config: JobConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Connector>,
        bus: Arc<EventBus>,
        cache: Arc<ContentCache>,
        tier_policy: Arc<TierPolicy>,
        pipeline: Arc<PipelineAdapter>,
        cancel_registry: Arc<CancelRegistry>,
        job_config: JobConfig,
    ) -> Self {
        Self {
            store,
            bus,
            cache,
            tier_policy,
            pipeline,
            cancel_registry,
            worker_slots: Arc::new(Semaphore::new(job_config.max_global_workers)),
            active_jobs: Arc::new(DashMap::new()),
            job_config,
        }
    }

    /// Admission sequence, `spec.md` §4.5:
    /// 1. resolve tier (caller already did this via the Principal),
    /// 2. compute effective types, reject if empty,
    /// 3. probe the cache — hit or in-flight short-circuits execution,
    /// 4. per-user concurrency check,
    /// 5. create the `Job` row and hand off to a worker slot.
    pub async fn submit(&self, principal: &Principal, topic_raw: &str, requested_types: &[ContentType]) -> Result<Admission> {
        let topic_normalized = normalize_topic(topic_raw);
        if topic_normalized.is_empty() {
            return Err(Error::EmptyTopic);
        }
        if requested_types.is_empty() {
            return Err(Error::EmptyTypes);
        }

        let tier_def = self.tier_policy.resolve(&principal.user_id).await;
        let (effective_types, rejected) = TierPolicy::effective_types(&tier_def, requested_types);
        if effective_types.is_empty() {
            let rejected_str = rejected
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::TypeNotAllowedForTier(rejected_str, tier_def.tier.to_string()));
        }

        let moderation_version = self.store.get_moderation_version().await.unwrap_or(0);
        let fp = fingerprint(&topic_normalized, &effective_types, &tier_def.model_id, moderation_version);

        match self.cache.lookup(&fp).await {
            LookupResult::Hit(bundle) => {
                let job_id = Uuid::new_v4();
                let now = Utc::now();
                let job = Job {
                    job_id,
                    user_id: principal.user_id.clone(),
                    topic_normalized: topic_normalized.clone(),
                    topic_display: topic_raw.to_string(),
                    requested_types: effective_types.clone(),
                    status: JobStatus::Completed,
                    created_at: now,
                    started_at: Some(now),
                    finished_at: Some(now),
                    last_event_seq: 0,
                    fingerprint: fp,
                };
                self.store.create_job(&job).await?;
                self.bus.register(job_id, false);
                self.bus.terminate(
                    job_id,
                    EventKind::Complete,
                    serde_json::json!({ "bundle": &bundle, "cache_hit": true }),
                );
                return Ok(Admission { job_id });
            }
            LookupResult::Miss | LookupResult::InFlight => {}
        }

        let job_id = Uuid::new_v4();
        if !self.try_reserve_slot(&principal.user_id, job_id, tier_def.max_parallel_stages as usize) {
            return Err(Error::TooManyInFlight(principal.user_id.clone()));
        }

        let now = Utc::now();
        let job = Job {
            job_id,
            user_id: principal.user_id.clone(),
            topic_normalized,
            topic_display: topic_raw.to_string(),
            requested_types: effective_types.clone(),
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
            last_event_seq: 0,
            fingerprint: fp.clone(),
        };
        if let Err(e) = self.store.create_job(&job).await {
            self.release_slot(&principal.user_id, job_id);
            return Err(e);
        }

        let fast_lane = effective_types
            .iter()
            .any(|t| matches!(t, ContentType::Audio | ContentType::Video));
        self.bus.register(job_id, fast_lane);

        let begin_outcome = self.cache.begin(&fp, &principal.user_id).await;
        let cache_ttl = Duration::from_secs(tier_def.cache_ttl_seconds);
        let job_timeout = Duration::from_secs(tier_def.job_timeout_seconds.max(self.job_config.job_timeout_secs));

        match begin_outcome {
            BeginOutcome::Leader(token) => {
                self.spawn_worker(job, RunParams { max_parallel_stages: tier_def.max_parallel_stages, cache_ttl, cache_leader: Some(token) }, job_timeout);
            }
            BeginOutcome::Follower(inflight) => {
                self.spawn_follower(job, inflight);
            }
        }

        Ok(Admission { job_id })
    }

    fn spawn_worker(&self, job: Job, params: RunParams, job_timeout: Duration) {
        let pipeline = self.pipeline.clone();
        let slots = self.worker_slots.clone();
        let cancel_registry = self.cancel_registry.clone();
        let active_jobs = self.self_active_jobs_handle();
        let bus = self.bus.clone();
        let store = self.store.clone();
        let stage_timeout = Duration::from_secs(self.job_config.stage_timeout_secs);
        let user_id = job.user_id.clone();
        let job_id = job.job_id;

        tokio::spawn(async move {
            let _permit = slots.acquire_owned().await.expect("semaphore never closed");
            let cancel = cancel_registry.register(job_id);

            // A watchdog that flips the cooperative cancel flag past
            // `job_timeout` without aborting `run_job` outright — the
            // adapter still owns writing the terminal store/bus state,
            // it just sees `cancel.is_cancelled()` at the next stage
            // boundary (`spec.md` §4.5 Cancellation is cooperative, not
            // preemptive).
            let watchdog_cancel = cancel.clone();
            let watchdog = tokio::spawn(async move {
                tokio::time::sleep(job_timeout).await;
                tracing::warn!(job_id = %job_id, "job exceeded job_timeout_seconds, requesting cancellation");
                watchdog_cancel.cancel();
            });

            // A second watchdog for a stalled-but-not-overrun job
            // (`spec.md` §4.5 Timeouts: "a job missing stage-progress for
            // `stage_timeout` is considered hung"). Unlike `job_timeout`
            // above, the scheduler — not C6 — is the one that marks the
            // job `failed` with `StageTimeout`; it then asks C6 to
            // abandon via the same cooperative cancel flag. The
            // conditional `update_job_status`/already-closed bus log make
            // this safe to race against C6 reaching its own terminal
            // state at the same moment.
            let stage_cancel = cancel.clone();
            let stage_bus = bus.clone();
            let stage_store = store.clone();
            let stage_watchdog = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(stage_timeout.checked_div(4).unwrap_or(stage_timeout).max(Duration::from_millis(50)));
                ticker.tick().await; // first tick fires immediately, skip it
                loop {
                    ticker.tick().await;
                    match stage_bus.stage_progress_age(job_id) {
                        Some(age) if age >= stage_timeout => {
                            tracing::warn!(
                                job_id = %job_id,
                                stage_timeout_secs = stage_timeout.as_secs(),
                                "no stage progress within stage_timeout, marking job failed"
                            );
                            stage_store
                                .update_job_status(job_id, JobStatus::Running, JobStatus::Failed, Some(Utc::now()))
                                .await
                                .ok();
                            stage_bus.terminate(
                                job_id,
                                EventKind::Error,
                                serde_json::json!({
                                    "error_type": "StageTimeout",
                                    "message": format!("no stage progress for {}s", stage_timeout.as_secs()),
                                }),
                            );
                            stage_cancel.cancel();
                            return;
                        }
                        Some(_) => continue,
                        None => return,
                    }
                }
            });

            if let Err(e) = pipeline.run_job(&job, params, cancel).await {
                tracing::error!(job_id = %job_id, error = %e, "pipeline adapter could not reach a terminal state");
            }
            watchdog.abort();
            stage_watchdog.abort();

            cancel_registry.remove(job_id);
            if let Some(set) = active_jobs.get(&user_id) {
                set.remove(&job_id);
            }
        });
    }

    fn spawn_follower(&self, job: Job, inflight: Arc<cg_cache::Inflight>) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        let active_jobs = self.self_active_jobs_handle();
        let user_id = job.user_id.clone();
        let job_id = job.job_id;

        tokio::spawn(async move {
            store
                .update_job_status(job_id, JobStatus::Pending, JobStatus::Running, None)
                .await
                .ok();
            match inflight.wait().await {
                Ok(bundle) => {
                    store
                        .update_job_status(job_id, JobStatus::Running, JobStatus::Completed, Some(Utc::now()))
                        .await
                        .ok();
                    bus.terminate(
                        job_id,
                        EventKind::Complete,
                        serde_json::json!({ "bundle": &bundle, "cache_hit": true }),
                    );
                }
                Err(err) => {
                    store
                        .update_job_status(job_id, JobStatus::Running, JobStatus::Failed, Some(Utc::now()))
                        .await
                        .ok();
                    bus.terminate(
                        job_id,
                        EventKind::Error,
                        serde_json::json!({ "error_type": "PipelineError", "message": err.0 }),
                    );
                }
            }
            if let Some(set) = active_jobs.get(&user_id) {
                set.remove(&job_id);
            }
        });
    }

    /// Authorization for `/api/jobs/{id}/cancel`: job owner or admin.
    /// `spec.md` §5 Cancellation authorization.
    pub async fn cancel(&self, principal: &Principal, job_id: Uuid) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

        if job.user_id != principal.user_id && !principal.is_admin {
            return Err(Error::Forbidden(format!("job {job_id} is not owned by {}", principal.user_id)));
        }
        if job.status.is_terminal() {
            return Err(Error::JobTerminal(job_id.to_string()));
        }

        self.cancel_registry.cancel(job_id);
        Ok(())
    }

    /// Atomically check-and-reserve a concurrency slot for `user_id`
    /// (invariant 3, `spec.md` line 292: "the count of concurrently
    /// `running` jobs never exceeds `tier.max_parallel_stages`"). Holds
    /// the `DashMap` shard's write lock across the length check and the
    /// insert so two concurrent `submit()` calls for the same user can't
    /// both observe room for one more slot.
    fn try_reserve_slot(&self, user_id: &str, job_id: Uuid, max: usize) -> bool {
        let mut set = self.active_jobs.entry(user_id.to_string()).or_default();
        if set.len() >= max {
            false
        } else {
            set.insert(job_id);
            true
        }
    }

    fn release_slot(&self, user_id: &str, job_id: Uuid) {
        if let Some(set) = self.active_jobs.get(user_id) {
            set.remove(&job_id);
        }
    }

    fn self_active_jobs_handle(&self) -> Arc<DashMap<String, DashSet<Uuid>>> {
        self.active_jobs.clone()
    }
}
