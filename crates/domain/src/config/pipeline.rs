use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job Scheduler / Pipeline Adapter (spec.md §4.5, §4.6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Global worker slot pool — admitted jobs beyond this remain
    /// `pending` until a slot opens (`MAX_GLOBAL_WORKERS`).
    #[serde(default = "d_max_global_workers")]
    pub max_global_workers: usize,
    /// Hang detection: no stage-progress for this long marks the job
    /// `failed` with `StageTimeout` (`STAGE_TIMEOUT_SEC`).
    #[serde(default = "d_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Default overall job timeout, overridable per tier
    /// (`JOB_TIMEOUT_SEC`).
    #[serde(default = "d_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Base URL for the external pipeline (`MODEL_ENDPOINT`). The actual
    /// LLM call is out of scope (`spec.md` §1); this is passed through
    /// to the `Pipeline` implementation unopened by the core.
    #[serde(default)]
    pub model_endpoint: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_global_workers: d_max_global_workers(),
            stage_timeout_secs: d_stage_timeout_secs(),
            job_timeout_secs: d_job_timeout_secs(),
            model_endpoint: None,
        }
    }
}

fn d_max_global_workers() -> usize {
    32
}
fn d_stage_timeout_secs() -> u64 {
    180
}
fn d_job_timeout_secs() -> u64 {
    600
}
