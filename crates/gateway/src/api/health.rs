//! `GET /health` and `GET /meta` (`spec.md` §6.1) — public, no auth.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.store.health().await;
    let status = if pool.degraded { "degraded" } else { "ok" };

    Json(serde_json::json!({
        "status": status,
        "pool": {
            "degraded": pool.degraded,
            "pool_size": pool.pool_size,
            "idle_connections": pool.idle_connections,
            "last_error": pool.last_error,
        },
        "cache_entries": state.cache.entry_count(),
        "active_streams": state.bus.log_count(),
    }))
}

pub async fn meta(State(state): State<AppState>) -> impl IntoResponse {
    let moderation_version = state.store.get_moderation_version().await.unwrap_or(0);
    Json(serde_json::json!({
        "service": state.config.observability.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "moderation_version": moderation_version,
    }))
}
