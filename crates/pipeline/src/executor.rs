//! The Pipeline Adapter (C6) proper: runs a job's stage graph against an
//! `Arc<dyn Pipeline>`, emitting the exact event sequence `spec.md` §4.6
//! requires, persisting artifacts through a `Connector`, and driving the
//! cache single-flight handoff at the end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use cg_bus::EventBus;
use cg_cache::{ContentCache, LeaderToken, PublishError};
use cg_domain::error::{Error, Result};
use cg_domain::model::{Artifact, ArtifactBundle, ContentType, EventKind, Job, JobStatus};
use cg_store::Connector;

use crate::cancel::CancelToken;
use crate::chunk::chunk_content;
use crate::stage::{StageGraph, StageKind};
use crate::traits::{Pipeline, StageContext};
use crate::validate::{is_repairable, validate_output, ValidationOutcome};

const PREVIEW_CHARS: usize = 500;

pub struct PipelineAdapter {
    pipeline: Arc<dyn Pipeline>,
    bus: Arc<EventBus>,
    store: Arc<dyn Connector>,
    cache: Arc<ContentCache>,
}

/// Everything the adapter needs about the job beyond the `Job` row
/// itself: its resolved stage graph inputs and the cache coordination
/// state the Scheduler already worked out during admission.
pub struct RunParams {
    pub max_parallel_stages: u8,
    pub cache_ttl: Duration,
    /// `Some` when this worker is the cache leader for the job's
    /// fingerprint (`spec.md` §4.6 step 6); `None` when the job bypasses
    /// caching entirely (e.g. the fingerprint was already a hit and this
    /// run exists only for audit — the Scheduler wouldn't call
    /// `run_job` in that case, but a defensive `None` is still handled).
    pub cache_leader: Option<LeaderToken>,
}

impl PipelineAdapter {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        bus: Arc<EventBus>,
        store: Arc<dyn Connector>,
        cache: Arc<ContentCache>,
    ) -> Self {
        Self { pipeline, bus, store, cache }
    }

    /// Runs a job to completion (success, failure, or cancellation),
    /// handling every termination path's bus/store/cache bookkeeping
    /// itself. Returns `Err` only when the adapter could not even reach
    /// a recorded terminal state (the caller should still treat the job
    /// as gone and log loudly — this should not happen in practice).
    pub async fn run_job(&self, job: &Job, params: RunParams, cancel: CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            // Still pending, no worker started yet: transition straight to
            // `cancelled` rather than via `running` (`spec.md` §4.5
            // Cancellation).
            self.store
                .update_job_status(job.job_id, JobStatus::Pending, JobStatus::Cancelled, Some(Utc::now()))
                .await?;
            self.bus.terminate(
                job.job_id,
                EventKind::Cancelled,
                serde_json::json!({ "job_id": job.job_id, "message": "job cancelled before it started" }),
            );
            if let Some(token) = params.cache_leader.clone() {
                self.cache.abort(token, PublishError("job cancelled".into()));
            }
            return Ok(());
        }

        if !self
            .store
            .update_job_status(job.job_id, JobStatus::Pending, JobStatus::Running, None)
            .await?
        {
            // Lost the race to another writer (or already cancelled while
            // pending) — nothing left for this worker to do.
            return Ok(());
        }
        let content_type_display = job
            .requested_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.bus.publish(
            job.job_id,
            EventKind::JobStarted,
            serde_json::json!({ "job_id": job.job_id, "content_type_display": content_type_display }),
        );

        let graph = StageGraph::build(&job.requested_types, params.max_parallel_stages);
        let mut artifacts: HashMap<ContentType, Artifact> = HashMap::new();
        let mut core_draft: Option<String> = None;
        let mut blog_draft: Option<String> = None;

        for wave in &graph.waves {
            if cancel.is_cancelled() {
                return self.cancel_job(job, &params).await;
            }

            let futures = wave.iter().map(|stage| {
                self.run_stage(job, *stage, core_draft.clone(), blog_draft.clone(), &cancel)
            });
            let outcomes = futures_util::future::join_all(futures).await;

            for (stage, outcome) in wave.iter().zip(outcomes) {
                match outcome {
                    StageRunOutcome::Cancelled => return self.cancel_job(job, &params).await,
                    StageRunOutcome::Failed(e) => {
                        let core = stage.produces().map(|t| t.is_core()).unwrap_or(true);
                        if core {
                            return self.fail_job(job, &params, &e).await;
                        }
                        tracing::warn!(job_id = %job.job_id, stage = stage.as_str(), error = %e, "optional stage failed, job continues");
                    }
                    StageRunOutcome::Produced { content_type, artifact, draft } => {
                        if matches!(stage, StageKind::Research | StageKind::Write | StageKind::Edit) {
                            core_draft = draft.clone();
                        }
                        if matches!(stage, StageKind::Edit) {
                            blog_draft = draft;
                        }
                        artifacts.insert(content_type, artifact);
                    }
                    StageRunOutcome::NoDeliverable { draft } => {
                        if matches!(stage, StageKind::Research | StageKind::Write | StageKind::Edit) {
                            core_draft = draft.clone();
                        }
                        if matches!(stage, StageKind::Edit) {
                            blog_draft = draft;
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return self.cancel_job(job, &params).await;
        }

        self.complete_job(job, &params, artifacts).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        job: &Job,
        stage: StageKind,
        core_draft: Option<String>,
        blog_draft: Option<String>,
        cancel: &CancelToken,
    ) -> StageRunOutcome {
        if cancel.is_cancelled() {
            return StageRunOutcome::Cancelled;
        }

        self.bus.publish(
            job.job_id,
            EventKind::Status,
            serde_json::json!({ "message": format!("running {}", stage.as_str()), "stage": stage.as_str() }),
        );
        let (lo, _hi) = stage.progress_bounds();
        self.bus.publish(
            job.job_id,
            EventKind::StageProgress,
            serde_json::json!({ "stage": stage.as_str(), "percent": lo }),
        );

        let draft = match stage {
            StageKind::Write | StageKind::Edit => core_draft,
            StageKind::Social | StageKind::Audio | StageKind::Video => blog_draft,
            StageKind::Research => None,
        };

        let ctx = StageContext {
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            topic: job.topic_display.clone(),
            stage,
            draft,
            is_repair_attempt: false,
        };

        let mut output = match self.pipeline.execute_stage(&ctx).await {
            Ok(o) => o,
            Err(e) => return StageRunOutcome::Failed(e),
        };

        let (_lo, hi) = stage.progress_bounds();
        self.bus.publish(
            job.job_id,
            EventKind::StageProgress,
            serde_json::json!({ "stage": stage.as_str(), "percent": hi }),
        );

        let Some(content_type) = stage.produces() else {
            return StageRunOutcome::NoDeliverable { draft: output.content };
        };

        // `edit` always runs (its draft feeds every optional stage) but
        // only counts as producing the `blog` deliverable when the
        // caller actually requested it.
        if !job.requested_types.contains(&content_type) {
            return StageRunOutcome::NoDeliverable { draft: output.content };
        }

        if let Some(content) = &output.content {
            let preview: String = content.chars().take(PREVIEW_CHARS).collect();
            self.bus.publish(
                job.job_id,
                EventKind::ContentPreview,
                serde_json::json!({
                    "artifact_type": content_type.as_str(),
                    "preview": preview,
                    "total_length": content.chars().count(),
                }),
            );
        }

        let mut outcome = validate_output(content_type, output.content.as_deref(), output.asset_uri.as_deref());
        if matches!(outcome, ValidationOutcome::Invalid(_)) && is_repairable(content_type) {
            if cancel.is_cancelled() {
                return StageRunOutcome::Cancelled;
            }
            let repair_ctx = StageContext { is_repair_attempt: true, ..ctx };
            output = match self.pipeline.execute_stage(&repair_ctx).await {
                Ok(o) => o,
                Err(e) => return StageRunOutcome::Failed(e),
            };
            outcome = validate_output(content_type, output.content.as_deref(), output.asset_uri.as_deref());
        }

        if let ValidationOutcome::Invalid(reason) = outcome {
            return StageRunOutcome::Failed(Error::ValidationFailed(content_type.as_str().into(), reason));
        }

        if cancel.is_cancelled() {
            return StageRunOutcome::Cancelled;
        }

        let artifact = Artifact {
            artifact_id: Uuid::new_v4(),
            job_id: job.job_id,
            user_id: job.user_id.clone(),
            artifact_type: content_type,
            content: output.content.clone(),
            asset_uri: output.asset_uri.clone(),
            fingerprint: job.fingerprint.clone(),
            quality_metrics: output.quality_metrics.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.persist_artifact(&artifact).await {
            return StageRunOutcome::Failed(e);
        }
        self.bus.publish(
            job.job_id,
            EventKind::ArtifactReady,
            serde_json::json!({
                "artifact_type": content_type.as_str(),
                "artifact_id": artifact.artifact_id,
                "quality_metrics": artifact.quality_metrics,
            }),
        );

        if let Some(content) = &output.content {
            let chunks = chunk_content(content);
            let total = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                self.bus.publish(
                    job.job_id,
                    EventKind::ContentChunk,
                    serde_json::json!({
                        "artifact_type": content_type.as_str(),
                        "chunk": chunk,
                        "progress": (i + 1) as f64 / total as f64,
                    }),
                );
            }
        }

        StageRunOutcome::Produced {
            content_type,
            artifact,
            draft: output.content,
        }
    }

    async fn complete_job(
        &self,
        job: &Job,
        params: &RunParams,
        artifacts: HashMap<ContentType, Artifact>,
    ) -> Result<()> {
        self.store
            .update_job_status(job.job_id, JobStatus::Running, JobStatus::Completed, Some(Utc::now()))
            .await?;

        let bundle = ArtifactBundle { artifacts };
        self.bus.terminate(
            job.job_id,
            EventKind::Complete,
            serde_json::json!({ "bundle": &bundle }),
        );

        if let Some(token) = params.cache_leader.clone() {
            self.cache.publish(token, bundle, params.cache_ttl).await;
        }
        Ok(())
    }

    async fn fail_job(&self, job: &Job, params: &RunParams, error: &Error) -> Result<()> {
        self.store
            .update_job_status(job.job_id, JobStatus::Running, JobStatus::Failed, Some(Utc::now()))
            .await?;
        self.bus.terminate(
            job.job_id,
            EventKind::Error,
            serde_json::json!({ "error_type": error.error_type(), "message": error.to_string() }),
        );
        if let Some(token) = params.cache_leader.clone() {
            self.cache.abort(token, PublishError(error.to_string()));
        }
        Ok(())
    }

    async fn cancel_job(&self, job: &Job, params: &RunParams) -> Result<()> {
        self.store
            .update_job_status(job.job_id, JobStatus::Running, JobStatus::Cancelled, Some(Utc::now()))
            .await?;
        self.bus.terminate(
            job.job_id,
            EventKind::Cancelled,
            serde_json::json!({ "job_id": job.job_id, "message": "job cancelled" }),
        );
        if let Some(token) = params.cache_leader.clone() {
            self.cache.abort(token, PublishError("job cancelled".into()));
        }
        Ok(())
    }
}

enum StageRunOutcome {
    Produced {
        content_type: ContentType,
        artifact: Artifact,
        draft: Option<String>,
    },
    NoDeliverable {
        draft: Option<String>,
    },
    Failed(Error),
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::config::PoolConfig;
    use cg_store::ArtifactStore;
    use futures_util::StreamExt;

    async fn memory_store() -> Arc<ArtifactStore> {
        Arc::new(
            ArtifactStore::connect(PoolConfig {
                database_url: "sqlite::memory:".into(),
                pool_size: 1,
                overflow: 0,
                acquire_retries: 2,
                ..PoolConfig::default()
            })
            .await
            .expect("in-memory store should connect"),
        )
    }

    fn sample_job(requested_types: Vec<ContentType>) -> Job {
        Job {
            job_id: Uuid::new_v4(),
            user_id: "u1".into(),
            topic_normalized: "rust async runtimes".into(),
            topic_display: "Rust Async Runtimes".into(),
            requested_types,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_event_seq: 0,
            fingerprint: "fp-test".into(),
        }
    }

    fn adapter(bus: Arc<EventBus>, store: Arc<ArtifactStore>, cache: Arc<ContentCache>) -> PipelineAdapter {
        PipelineAdapter::new(
            Arc::new(crate::reference::DeterministicPipeline::new()),
            bus,
            store,
            cache,
        )
    }

    #[tokio::test]
    async fn blog_only_job_completes_and_persists_one_artifact() {
        let bus = Arc::new(EventBus::new(Duration::from_secs(5), 256, 64 * 1024, Duration::from_secs(120)));
        let store = memory_store().await;
        let cache = Arc::new(ContentCache::new(100));
        let job = sample_job(vec![ContentType::Blog]);
        bus.register(job.job_id, false);
        store.create_job(&job).await.unwrap();

        let pa = adapter(bus.clone(), store.clone(), cache);
        let params = RunParams {
            max_parallel_stages: 1,
            cache_ttl: Duration::from_secs(60),
            cache_leader: None,
        };
        pa.run_job(&job, params, CancelToken::new()).await.unwrap();

        let stream = bus.subscribe(job.job_id, 0);
        tokio::pin!(stream);
        let events: Vec<_> = stream.collect().await;
        assert!(events.iter().any(|e| e.kind == EventKind::ArtifactReady));
        assert!(events.last().unwrap().kind.is_terminal());

        let stored = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn blog_plus_social_runs_optional_stage_concurrently_with_itself_alone() {
        let bus = Arc::new(EventBus::new(Duration::from_secs(5), 256, 64 * 1024, Duration::from_secs(120)));
        let store = memory_store().await;
        let cache = Arc::new(ContentCache::new(100));
        let job = sample_job(vec![ContentType::Blog, ContentType::Social]);
        bus.register(job.job_id, false);
        store.create_job(&job).await.unwrap();

        let pa = adapter(bus.clone(), store.clone(), cache);
        let params = RunParams {
            max_parallel_stages: 2,
            cache_ttl: Duration::from_secs(60),
            cache_leader: None,
        };
        pa.run_job(&job, params, CancelToken::new()).await.unwrap();

        let stream = bus.subscribe(job.job_id, 0);
        tokio::pin!(stream);
        let events: Vec<_> = stream.collect().await;
        let artifact_readies: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::ArtifactReady)
            .collect();
        assert_eq!(artifact_readies.len(), 2);
    }

    #[tokio::test]
    async fn cache_leader_is_published_to_on_success() {
        let bus = Arc::new(EventBus::new(Duration::from_secs(5), 256, 64 * 1024, Duration::from_secs(120)));
        let store = memory_store().await;
        let cache = Arc::new(ContentCache::new(100));
        let job = sample_job(vec![ContentType::Blog]);
        bus.register(job.job_id, false);
        store.create_job(&job).await.unwrap();

        let leader = match cache.begin(&job.fingerprint, &job.user_id).await {
            cg_cache::BeginOutcome::Leader(t) => t,
            _ => unreachable!(),
        };

        let pa = adapter(bus.clone(), store.clone(), cache.clone());
        let params = RunParams {
            max_parallel_stages: 1,
            cache_ttl: Duration::from_secs(60),
            cache_leader: Some(leader),
        };
        pa.run_job(&job, params, CancelToken::new()).await.unwrap();

        assert!(matches!(
            cache.lookup(&job.fingerprint).await,
            cg_cache::LookupResult::Hit(_)
        ));
    }

    #[tokio::test]
    async fn cancellation_before_start_short_circuits_to_cancelled() {
        let bus = Arc::new(EventBus::new(Duration::from_secs(5), 256, 64 * 1024, Duration::from_secs(120)));
        let store = memory_store().await;
        let cache = Arc::new(ContentCache::new(100));
        let job = sample_job(vec![ContentType::Blog]);
        bus.register(job.job_id, false);
        store.create_job(&job).await.unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let pa = adapter(bus.clone(), store.clone(), cache);
        let params = RunParams {
            max_parallel_stages: 1,
            cache_ttl: Duration::from_secs(60),
            cache_leader: None,
        };
        pa.run_job(&job, params, cancel).await.unwrap();

        let stored = store.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }
}
