use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event Bus (spec.md §4.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "d_keep_alive_ms")]
    pub keep_alive_interval_ms: u64,
    /// Retention bound: `min(max_bytes_per_job, retention_after_terminal)`.
    #[serde(default = "d_max_bytes_per_job")]
    pub max_bytes_per_job: usize,
    #[serde(default = "d_retention_after_terminal_secs")]
    pub retention_after_terminal_secs: u64,
    /// Per-subscription backpressure buffer (spec.md §5 Backpressure).
    #[serde(default = "d_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default = "d_gc_interval_secs")]
    pub gc_interval_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: d_keep_alive_ms(),
            max_bytes_per_job: d_max_bytes_per_job(),
            retention_after_terminal_secs: d_retention_after_terminal_secs(),
            subscriber_buffer: d_subscriber_buffer(),
            gc_interval_secs: d_gc_interval_secs(),
        }
    }
}

fn d_keep_alive_ms() -> u64 {
    5_000
}
fn d_max_bytes_per_job() -> usize {
    64 * 1024
}
fn d_retention_after_terminal_secs() -> u64 {
    120
}
fn d_subscriber_buffer() -> usize {
    256
}
fn d_gc_interval_secs() -> u64 {
    30
}
