/// Shared error type used across all job server crates.
///
/// Variants map directly onto the error kinds surfaced to clients in
/// `spec.md` §7; internal call sites may wrap a finer cause in `Other`/`Io`
/// while still letting the worker boundary translate this into a stable
/// `error_type` string for the `error` SSE event.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("content type {0} not allowed for tier {1}")]
    TypeNotAllowedForTier(String, String),

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("requested_types must not be empty")]
    EmptyTypes,

    #[error("quota exceeded for {0}")]
    QuotaExceeded(String),

    #[error("too many jobs in flight for user {0}")]
    TooManyInFlight(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} is already terminal")]
    JobTerminal(String),

    #[error("job {0} reached a terminal state and its event log was garbage-collected")]
    JobLogExpired(String),

    #[error("stage timed out: {0}")]
    StageTimeout(String),

    #[error("pipeline error: {0}")]
    PipelineError(String),

    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("validation failed for {0}: {1}")]
    ValidationFailed(String, String),

    #[error("job cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The stable `error_type` string surfaced in `error` SSE events and
    /// HTTP error bodies (see `spec.md` §6.2 / §7).
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Unauthorized => "Unauthorized",
            Error::Forbidden(_) => "Forbidden",
            Error::InvalidToken => "InvalidToken",
            Error::Expired => "Expired",
            Error::TypeNotAllowedForTier(..) => "TypeNotAllowedForTier",
            Error::EmptyTopic => "EmptyTopic",
            Error::EmptyTypes => "EmptyTypes",
            Error::QuotaExceeded(_) => "QuotaExceeded",
            Error::TooManyInFlight(_) => "TooManyInFlight",
            Error::JobNotFound(_) => "JobNotFound",
            Error::JobTerminal(_) => "JobTerminal",
            Error::JobLogExpired(_) => "JobLogExpired",
            Error::StageTimeout(_) => "StageTimeout",
            Error::PipelineError(_) => "PipelineError",
            Error::PoolUnavailable(_) => "PoolUnavailable",
            Error::ValidationFailed(..) => "ValidationFailed",
            Error::Cancelled => "Cancelled",
            Error::Config(_) => "Config",
            Error::Io(_) | Error::Json(_) | Error::Other(_) => "Internal",
        }
    }

    /// The HTTP status this error kind maps to on the `/api/generate` and
    /// `/api/jobs/{id}/*` surfaces (see `spec.md` §6.1).
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized | Error::InvalidToken | Error::Expired => 401,
            Error::TypeNotAllowedForTier(..) => 403,
            Error::EmptyTopic | Error::EmptyTypes | Error::ValidationFailed(..) => 422,
            Error::QuotaExceeded(_) => 403,
            Error::Forbidden(_) => 403,
            Error::TooManyInFlight(_) => 409,
            Error::JobNotFound(_) => 404,
            Error::JobTerminal(_) => 409,
            Error::JobLogExpired(_) => 410,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
