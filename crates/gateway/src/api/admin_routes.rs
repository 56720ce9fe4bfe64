//! `POST /api/admin/cache/invalidate` and `POST /api/admin/moderation/bump-version`
//! (`spec.md` §6.1) — gated by [`crate::auth::AdminGuard`], never by a
//! user's own `Principal.is_admin` claim.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use cg_store::Connector;

use crate::api::error::ApiError;
use crate::auth::AdminGuard;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub all: bool,
}

pub async fn invalidate_cache(
    State(state): State<AppState>,
    _admin: AdminGuard,
    Json(body): Json<InvalidateRequest>,
) -> impl IntoResponse {
    let scope = if body.all {
        state.cache.invalidate_all();
        "all"
    } else if let Some(user_id) = body.user_id.as_deref() {
        state.cache.invalidate_user(user_id).await;
        if let Some(user_id) = body.user_id.as_deref() {
            state.tier_policy.invalidate(user_id);
        }
        "user"
    } else if let Some(fingerprint) = body.fingerprint.as_deref() {
        state.cache.invalidate_fingerprint(fingerprint).await;
        "fingerprint"
    } else {
        "none"
    };

    Json(serde_json::json!({
        "invalidated": scope,
        "cache_entries": state.cache.entry_count(),
    }))
}

pub async fn bump_moderation_version(
    State(state): State<AppState>,
    _admin: AdminGuard,
) -> Result<impl IntoResponse, ApiError> {
    let version = state.store.bump_moderation_version().await.map_err(ApiError)?;
    Ok(Json(serde_json::json!({ "moderation_version": version })))
}
