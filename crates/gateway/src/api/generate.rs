//! `POST /api/generate` (`spec.md` §6.1) — admits a job and returns its
//! push stream directly, starting at `event_id` 0. There is no separate
//! "create job" JSON response: the success case *is* the event stream.

use axum::extract::State;
use axum::response::sse::Sse;
use axum::Json;
use serde::Deserialize;

use cg_domain::model::{ContentType, Principal};

use crate::api::error::ApiError;
use crate::api::jobs::stream_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    #[serde(default)]
    pub content_types: Option<Vec<String>>,
}

pub async fn generate(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<GenerateRequest>,
) -> Result<Sse<impl futures_core::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>, ApiError> {
    let requested_types = match body.content_types {
        Some(raw) => raw
            .iter()
            .filter_map(|s| s.parse::<ContentType>().ok())
            .collect::<Vec<_>>(),
        None => vec![ContentType::Blog],
    };

    let admission = state
        .scheduler
        .submit(&principal, &body.topic, &requested_types)
        .await
        .map_err(ApiError)?;

    Ok(stream_response(&state, admission.job_id, 0))
}
