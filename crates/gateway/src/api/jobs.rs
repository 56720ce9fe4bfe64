//! `/api/jobs/{id}/cancel` and `/api/jobs/{id}/stream` (`spec.md` §6.1).

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use cg_domain::error::Error;
use cg_domain::model::Principal;

use crate::api::error::ApiError;
use crate::api::render::render_payload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub since: Option<u64>,
}

pub async fn cancel(
    State(state): State<AppState>,
    principal: Principal,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.cancel(&principal, job_id).await.map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-attach to an existing job's stream. Disambiguates a job that never
/// existed (404) from one that existed, reached a terminal state, and
/// had its bus log garbage-collected past the retention window (410) —
/// the bus alone can't tell these apart (`cg_bus::EventBus::subscribe`
/// yields an empty stream in both cases).
pub async fn stream(
    State(state): State<AppState>,
    principal: Principal,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let job = state
        .store
        .get_job(job_id)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(Error::JobNotFound(job_id.to_string())))?;

    if job.user_id != principal.user_id && !principal.is_admin {
        return Err(ApiError(Error::Forbidden(format!("job {job_id} is not owned by {}", principal.user_id))));
    }

    if job.status.is_terminal() && state.bus.job_status(job_id).is_none() {
        return Err(ApiError(Error::JobLogExpired(job_id.to_string())));
    }

    Ok(stream_response(&state, job_id, query.since.unwrap_or(0)))
}

/// Build the SSE response for a job's event stream starting at
/// `since_event_id`. Shared by `/api/generate` (since = 0, the job was
/// just admitted) and the reattach handler above.
pub fn stream_response(
    state: &AppState,
    job_id: Uuid,
    since_event_id: u64,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = state.bus.subscribe(job_id, since_event_id).filter_map(|event| async move {
        match render_payload(&event) {
            Some(payload) => Some(Ok(SseEvent::default().data(payload.to_string()))),
            None => Some(Ok(SseEvent::default().comment("keep-alive"))),
        }
    });
    Sse::new(events)
}
