//! Shared application state, grouped by concern the way the teacher's
//! `state.rs` groups its own (sessions / providers / workspace / ...):
//! one struct, `Arc`-wrapped fields, cloned cheaply per request by axum's
//! `State` extractor.

use std::sync::Arc;

use cg_bus::EventBus;
use cg_cache::ContentCache;
use cg_domain::config::Config;
use cg_pipeline::{CancelRegistry, PipelineAdapter};
use cg_store::Connector;

use crate::scheduler::Scheduler;
use crate::tier_policy::TierPolicy;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Configuration** — the resolved `Config`
/// - **Security** — the HMAC signing key and admin token (startup-computed)
/// - **Core components** — C2 through C7, each owned by an `Arc` so
///   handlers and background tasks can hold it across `.await` points
#[derive(Clone)]
pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────
    pub config: Arc<Config>,

    // ── Security (startup-computed) ─────────────────────────────────
    /// HMAC signing key bytes backing the Principal Resolver (C1),
    /// read once from the `SECRET_KEY`-named env var at startup.
    pub secret_key: Arc<Vec<u8>>,
    /// Static admin bearer token. `None` disables every admin route —
    /// fail closed, the opposite of the teacher's dev-mode-allows-all
    /// convention for an unconfigured admin guard.
    pub admin_token: Arc<Option<String>>,

    // ── Core components (C2-C7) ─────────────────────────────────────
    pub store: Arc<dyn Connector>,
    pub bus: Arc<EventBus>,
    pub cache: Arc<ContentCache>,
    pub tier_policy: Arc<TierPolicy>,
    pub pipeline: Arc<PipelineAdapter>,
    pub cancel_registry: Arc<CancelRegistry>,
    pub scheduler: Arc<Scheduler>,
}
