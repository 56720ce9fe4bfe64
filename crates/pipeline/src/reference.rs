//! A deterministic reference `Pipeline` — the default backend used in
//! tests and when no external orchestrator endpoint is configured. It
//! synthesizes plausible content from the topic rather than calling out
//! to a real model, grounded on the teacher's pattern of keeping a
//! provider-agnostic fake behind the same trait used in production
//! (`providers` test doubles).

use cg_domain::error::Result;

use crate::stage::StageKind;
use crate::traits::{Pipeline, StageContext, StageOutput};

pub struct DeterministicPipeline;

impl DeterministicPipeline {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeterministicPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Pipeline for DeterministicPipeline {
    async fn execute_stage(&self, ctx: &StageContext) -> Result<StageOutput> {
        let output = match ctx.stage {
            StageKind::Research => StageOutput::text(format!(
                "Research notes on {}: background, key angles, three supporting sources.",
                ctx.topic
            )),
            StageKind::Write => {
                let research = ctx.draft.as_deref().unwrap_or_default();
                StageOutput::text(format!(
                    "{}\n\n{}",
                    ctx.topic,
                    draft_body(&ctx.topic, research)
                ))
            }
            StageKind::Edit => {
                let draft = ctx.draft.as_deref().unwrap_or_default();
                StageOutput::text(polish(draft, ctx.is_repair_attempt))
            }
            StageKind::Social => {
                let source = ctx.draft.as_deref().unwrap_or(&ctx.topic);
                StageOutput::text(social_post(source, ctx.is_repair_attempt))
            }
            StageKind::Audio => StageOutput::asset(format!("asset://audio/{}.mp3", ctx.job_id)),
            StageKind::Video => StageOutput::asset(format!("asset://video/{}.mp4", ctx.job_id)),
        };
        Ok(output)
    }
}

fn draft_body(topic: &str, research: &str) -> String {
    let filler = "This section expands on the topic with illustrative detail, practical \
        examples, and a balanced perspective drawn from the preceding research notes. "
        .repeat(8);
    format!("{research}\n\nIntroduction to {topic}.\n\n{filler}")
}

fn polish(draft: &str, is_repair_attempt: bool) -> String {
    if is_repair_attempt {
        format!("{draft}\n\nConclusion. This closing paragraph ties the piece together.")
    } else {
        draft.to_string()
    }
}

fn social_post(source: &str, is_repair_attempt: bool) -> String {
    let base: String = source.chars().take(180).collect();
    if is_repair_attempt && base.trim().is_empty() {
        "A short, shareable take on the topic.".to_string()
    } else {
        format!("{base} #content")
    }
}
