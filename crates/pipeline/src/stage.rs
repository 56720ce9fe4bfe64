//! Stage graph construction (`spec.md` §4.6 step 1).

use cg_domain::model::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Research,
    Write,
    Edit,
    Social,
    Audio,
    Video,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Write => "write",
            StageKind::Edit => "edit",
            StageKind::Social => "social",
            StageKind::Audio => "audio",
            StageKind::Video => "video",
        }
    }

    /// The artifact this stage produces, for non-core stages. Core
    /// stages (`research`/`write`/`edit`) don't each produce a
    /// deliverable on their own — together they produce `blog`.
    pub fn produces(self) -> Option<ContentType> {
        match self {
            StageKind::Social => Some(ContentType::Social),
            StageKind::Audio => Some(ContentType::Audio),
            StageKind::Video => Some(ContentType::Video),
            StageKind::Edit => Some(ContentType::Blog),
            _ => None,
        }
    }

    /// `stage_progress` percent boundaries (`spec.md` §4.6 step 2):
    /// research 0-30, write 30-70, edit 70-95, media 95-99 pro-rata.
    pub fn progress_bounds(self) -> (u8, u8) {
        match self {
            StageKind::Research => (0, 30),
            StageKind::Write => (30, 70),
            StageKind::Edit => (70, 95),
            StageKind::Social | StageKind::Audio | StageKind::Video => (95, 99),
        }
    }
}

/// One wave of stages that may run concurrently with each other. Waves
/// execute strictly in order; stages within a wave may run as sibling
/// tasks.
pub type Wave = Vec<StageKind>;

#[derive(Debug, Clone)]
pub struct StageGraph {
    pub waves: Vec<Wave>,
}

impl StageGraph {
    /// Build the stage graph for a job's effective types and the
    /// caller's `max_parallel_stages` (`spec.md` §4.6 step 1).
    ///
    /// `blog` always contributes the core chain `research -> write ->
    /// edit`, each its own wave (they depend on one another). Optional
    /// terminal stages (`social`/`audio`/`video`) depend on the core
    /// chain having produced its edited draft, and — when
    /// `max_parallel_stages > 1` — run concurrently with each other in
    /// one trailing wave. With `max_parallel_stages == 1` and only core
    /// types requested, this degenerates to a strictly sequential
    /// three-wave graph with no optional wave at all.
    pub fn build(effective_types: &[ContentType], max_parallel_stages: u8) -> Self {
        let mut waves = vec![
            vec![StageKind::Research],
            vec![StageKind::Write],
            vec![StageKind::Edit],
        ];

        let mut optional = Vec::new();
        if effective_types.contains(&ContentType::Social) {
            optional.push(StageKind::Social);
        }
        if effective_types.contains(&ContentType::Audio) {
            optional.push(StageKind::Audio);
        }
        if effective_types.contains(&ContentType::Video) {
            optional.push(StageKind::Video);
        }

        if !optional.is_empty() {
            if max_parallel_stages > 1 {
                waves.push(optional);
            } else {
                // Sequential fallback: one wave per optional stage.
                for stage in optional {
                    waves.push(vec![stage]);
                }
            }
        }

        Self { waves }
    }

    pub fn total_stage_count(&self) -> usize {
        self.waves.iter().map(|w| w.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_only_produces_three_core_waves() {
        let graph = StageGraph::build(&[ContentType::Blog], 1);
        assert_eq!(graph.waves.len(), 3);
        assert_eq!(graph.total_stage_count(), 3);
    }

    #[test]
    fn social_and_video_run_concurrently_when_parallel_allowed() {
        let graph = StageGraph::build(&[ContentType::Blog, ContentType::Social, ContentType::Video], 3);
        assert_eq!(graph.waves.len(), 4);
        assert_eq!(graph.waves[3].len(), 2);
    }

    #[test]
    fn optional_stages_run_sequentially_when_max_parallel_is_one() {
        let graph = StageGraph::build(&[ContentType::Blog, ContentType::Social, ContentType::Audio], 1);
        // core x3 + social + audio, each its own wave.
        assert_eq!(graph.waves.len(), 5);
        assert!(graph.waves[3..].iter().all(|w| w.len() == 1));
    }

    #[test]
    fn progress_bounds_cover_0_to_99() {
        assert_eq!(StageKind::Research.progress_bounds(), (0, 30));
        assert_eq!(StageKind::Edit.progress_bounds(), (70, 95));
        assert_eq!(StageKind::Video.progress_bounds(), (95, 99));
    }
}
