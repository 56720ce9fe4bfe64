//! Wire-schema rendering for the SSE stream (`spec.md` §6.2). Most event
//! kinds are already shaped correctly at publish time by
//! `cg_pipeline::executor`; the one exception is `complete`, whose
//! internal payload carries the full `ArtifactBundle` and needs
//! unpacking into the four optional content fields clients expect.

use cg_domain::model::{Event, EventKind};

/// The JSON payload for one bus event, already translated to the wire
/// schema — `None` for `keep_alive`, which has no payload.
pub fn render_payload(event: &Event) -> Option<serde_json::Value> {
    if event.kind == EventKind::KeepAlive {
        return None;
    }
    Some(if event.kind == EventKind::Complete {
        render_complete(event)
    } else {
        event.payload.clone()
    })
}

/// Render one bus event as a raw `data: {json}\n\n` line. Used directly
/// only in tests; the live HTTP path goes through `axum::response::sse`
/// instead (see `api::jobs::stream_response`), which applies the same
/// framing via `render_payload`.
pub fn render_event(event: &Event) -> Option<String> {
    render_payload(event).map(|payload| format!("data: {payload}\n\n"))
}

fn render_complete(event: &Event) -> serde_json::Value {
    let mut out = serde_json::json!({ "job_id": event.job_id });

    if let Some(cache_hit) = event.payload.get("cache_hit") {
        out["cache_hit"] = cache_hit.clone();
    }

    let Some(artifacts) = event
        .payload
        .get("bundle")
        .and_then(|b| b.get("artifacts"))
        .and_then(|a| a.as_object())
    else {
        return out;
    };

    for (content_type, artifact) in artifacts {
        let value = artifact
            .get("content")
            .filter(|v| !v.is_null())
            .or_else(|| artifact.get("asset_uri").filter(|v| !v.is_null()));
        let Some(value) = value else { continue };
        let field = match content_type.as_str() {
            "blog" => "content",
            "social" => "social_media_content",
            "audio" => "audio_content",
            "video" => "video_content",
            _ => continue,
        };
        out[field] = value.clone();
    }

    out
}
