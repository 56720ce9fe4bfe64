//! Maps `cg_domain::error::Error` onto HTTP responses (`spec.md` §6.1,
//! §7): status via `Error::status_code()`, body `{ "error_type", "message" }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cg_domain::error::Error;

/// Newtype so `Error` (defined in `cg_domain`, outside this crate) can
/// implement `IntoResponse` and be used directly as an extractor
/// rejection / handler error type.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error_type": self.0.error_type(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
