pub mod admin_routes;
pub mod error;
pub mod generate;
pub mod health;
pub mod jobs;
pub mod render;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router (`spec.md` §6.1). Auth is per-handler via the
/// `Principal` / `AdminGuard` extractors (`crate::auth`), not a blanket
/// `route_layer` — every protected handler needs the resolved identity for
/// tier and ownership decisions, not just a pass/fail gate.
pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/meta", get(health::meta))
        .route("/api/generate", post(generate::generate))
        .route("/api/jobs/:id/cancel", post(jobs::cancel))
        .route("/api/jobs/:id/stream", get(jobs::stream))
        .route("/api/admin/cache/invalidate", post(admin_routes::invalidate_cache))
        .route(
            "/api/admin/moderation/bump-version",
            post(admin_routes::bump_moderation_version),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
