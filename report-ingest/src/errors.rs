use crate::backend::BackendError;
use crate::config::ValidationError;
use hyper::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for report-ingest operations
pub type Result<T, E = IngestError> = std::result::Result<T, E>;

/// Request-level failures. Each one stops the request before any report is
/// normalized and is returned to the caller.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("missing API key")]
    MissingApiKey,

    #[error("unknown API key")]
    UnknownApiKey,

    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("request body is not a report or a list of reports")]
    NotAReport,

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("no route matched for request")]
    NoRouteMatched,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("backend session unavailable: {0}")]
    SessionUnavailable(Arc<BackendError>),

    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::MissingApiKey
            | IngestError::EmptyBody
            | IngestError::InvalidJson(_)
            | IngestError::NotAReport
            | IngestError::RequestBodyError(_) => StatusCode::BAD_REQUEST,
            IngestError::UnknownApiKey => StatusCode::FORBIDDEN,
            IngestError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::NoRouteMatched => StatusCode::NOT_FOUND,
            IngestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::SessionUnavailable(_) => StatusCode::BAD_GATEWAY,
            IngestError::Config(_) | IngestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short tag for the `requests.rejected` metric.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingApiKey => "missing_api_key",
            IngestError::UnknownApiKey => "unknown_api_key",
            IngestError::UnsupportedContentType(_) => "unsupported_content_type",
            IngestError::EmptyBody => "empty_body",
            IngestError::InvalidJson(_) => "invalid_json",
            IngestError::NotAReport => "not_a_report",
            IngestError::BodyTooLarge(_) => "body_too_large",
            IngestError::RequestBodyError(_) => "body_read",
            IngestError::NoRouteMatched => "no_route",
            IngestError::MethodNotAllowed => "method_not_allowed",
            IngestError::SessionUnavailable(_) => "session_unavailable",
            IngestError::Config(_) | IngestError::Io(_) => "internal",
        }
    }
}
