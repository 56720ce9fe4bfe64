//! The boundary between the core and the external multi-agent
//! orchestrator (`spec.md` §1 "the actual generation is out of scope";
//! §4.6 "owns the interaction with the external orchestrator").
//!
//! `Pipeline` plays the role the teacher's `LlmProvider` trait plays for
//! its chat adapters: a small async surface that hides an entirely
//! external system behind stable request/response types, so the core
//! never depends on which orchestrator or model backs a deployment.

use cg_domain::error::Result;
use cg_domain::model::{ContentType, QualityMetrics};

use crate::stage::StageKind;

/// Everything a stage implementation needs to do its work. `draft` carries
/// the accumulated text from prior core stages (e.g. `edit` receives
/// `write`'s output; `social`/`audio`/`video` receive the finished blog
/// draft as source material).
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: uuid::Uuid,
    pub user_id: String,
    pub topic: String,
    pub stage: StageKind,
    pub draft: Option<String>,
    /// Set on the second attempt of a repairable stage (`spec.md` §4.6
    /// step 4); implementations may use this to ask the orchestrator for
    /// a stricter pass.
    pub is_repair_attempt: bool,
}

/// What a stage produced. `content` is populated for text-bearing stages
/// (`research`/`write`/`edit`/`social`); `asset_uri` for binary media
/// (`audio`/`video`) that the orchestrator stored out-of-band.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub content: Option<String>,
    pub asset_uri: Option<String>,
    pub quality_metrics: QualityMetrics,
}

impl StageOutput {
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count() as u32;
        let char_count = content.chars().count() as u32;
        Self {
            quality_metrics: QualityMetrics {
                word_count: Some(word_count),
                char_count: Some(char_count),
                estimated_read_minutes: Some(word_count as f32 / 200.0),
            },
            content: Some(content),
            asset_uri: None,
        }
    }

    pub fn asset(uri: impl Into<String>) -> Self {
        Self {
            content: None,
            asset_uri: Some(uri.into()),
            quality_metrics: QualityMetrics::default(),
        }
    }
}

/// External collaborator boundary. Implementations translate
/// `StageContext` into whatever the real orchestrator's wire protocol
/// requires; the core only ever calls through this trait.
#[async_trait::async_trait]
pub trait Pipeline: Send + Sync {
    async fn execute_stage(&self, ctx: &StageContext) -> Result<StageOutput>;
}

/// Maps a produced stage's output content type, for stages that yield a
/// deliverable artifact on their own (`edit` for `blog`, and each
/// optional terminal stage for its own type).
pub fn deliverable_type(stage: StageKind) -> Option<ContentType> {
    stage.produces()
}
