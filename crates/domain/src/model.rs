//! Core data model shared by the scheduler, bus, cache, store, and pipeline
//! adapter. See `spec.md` §3 for the authoritative field-by-field spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier & content type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Blog,
    Social,
    Audio,
    Video,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Blog => "blog",
            ContentType::Social => "social",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
        }
    }

    /// Whether this type is one of the always-present core stages
    /// (`spec.md` §4.6 step 1) as opposed to an optional terminal stage.
    pub fn is_core(self) -> bool {
        matches!(self, ContentType::Blog)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(ContentType::Blog),
            "social" => Ok(ContentType::Social),
            "audio" => Ok(ContentType::Audio),
            "video" => Ok(ContentType::Video),
            _ => Err(()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Principal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A verified caller, produced by the Principal Resolver (C1). Immutable
/// within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub tier: Tier,
    pub email_verified: bool,
    pub is_admin: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier definition (config)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Commercial class assigning content types, model, parallelism, cache
/// TTL. Loaded once from `TIER_CONFIG_PATH`, versioned by the config file
/// itself (no hot reload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDefinition {
    pub tier: Tier,
    pub allowed_content_types: Vec<ContentType>,
    /// Informational monthly quota per type — enforcement is optional
    /// (`spec.md` §9 Open Question: kept informational here).
    #[serde(default)]
    pub monthly_quota: std::collections::HashMap<ContentType, u32>,
    pub model_id: String,
    pub max_parallel_stages: u8,
    pub cache_ttl_seconds: u64,
    #[serde(default = "d_job_timeout")]
    pub job_timeout_seconds: u64,
}

fn d_job_timeout() -> u64 {
    600
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Owned by the Scheduler (C5), referenced by Bus (C4) / Adapter (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: uuid::Uuid,
    pub user_id: String,
    /// Normalized topic (trimmed, lowercased) used for cache-key purposes.
    pub topic_normalized: String,
    /// Original topic as submitted, preserved for display.
    pub topic_display: String,
    pub requested_types: Vec<ContentType>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_event_seq: u64,
    pub fingerprint: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    JobStarted,
    StageProgress,
    ContentPreview,
    ContentChunk,
    ArtifactReady,
    Complete,
    Cancelled,
    Error,
    KeepAlive,
}

impl EventKind {
    /// Terminal kinds close the per-job stream (`spec.md` §3 Event
    /// invariants / GLOSSARY "Terminal event").
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::Complete | EventKind::Cancelled | EventKind::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Status => "status",
            EventKind::JobStarted => "job_started",
            EventKind::StageProgress => "stage_progress",
            EventKind::ContentPreview => "content_preview",
            EventKind::ContentChunk => "content_chunk",
            EventKind::ArtifactReady => "artifact_ready",
            EventKind::Complete => "complete",
            EventKind::Cancelled => "cancelled",
            EventKind::Error => "error",
            EventKind::KeepAlive => "keep_alive",
        }
    }
}

/// Unit of the push stream. `event_id` is strictly increasing per job,
/// except for synthetic `keep_alive` events which always carry `0` and
/// are never persisted to the job's log (`spec.md` §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub job_id: uuid::Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn keep_alive(job_id: uuid::Uuid) -> Self {
        Self {
            event_id: 0,
            job_id,
            kind: EventKind::KeepAlive,
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualityMetrics {
    pub word_count: Option<u32>,
    pub char_count: Option<u32>,
    pub estimated_read_minutes: Option<f32>,
}

/// Durable output bundle. Owned by its `job_id`; the Content Cache holds
/// only non-owning references by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: uuid::Uuid,
    pub job_id: uuid::Uuid,
    pub user_id: String,
    pub artifact_type: ContentType,
    pub content: Option<String>,
    pub asset_uri: Option<String>,
    pub fingerprint: String,
    pub quality_metrics: QualityMetrics,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache bundle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fingerprint's frozen artifact set, as stored in the Content Cache and
/// replayed verbatim on a cache hit (`spec.md` §4.3, S1/S5 scenarios).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub artifacts: std::collections::HashMap<ContentType, Artifact>,
}

impl ArtifactBundle {
    pub fn new() -> Self {
        Self {
            artifacts: std::collections::HashMap::new(),
        }
    }
}

impl Default for ArtifactBundle {
    fn default() -> Self {
        Self::new()
    }
}
