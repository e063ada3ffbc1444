//! Request-level error taxonomy and HTTP mapping.
//!
//! Every failure the caller can see is one of these variants; handlers and
//! the pipeline never return a bare `anyhow::Error` to axum. Row-level and
//! refinement failures are recovered inside the pipeline and never reach
//! this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Neither a file nor a file_url was supplied.
    #[error("provide either a 'file' multipart field or a 'file_url' field")]
    MissingInput,

    /// Malformed request body (e.g. unreadable multipart field).
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Content sniffing found neither an image nor a PDF.
    #[error("unsupported file type '{0}'. Send a PDF or image")]
    UnsupportedMedia(String),

    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The remote document could not be fetched (bad URL, non-2xx, I/O).
    #[error("could not fetch file: {0}")]
    Fetch(String),

    #[error("timeout fetching document from URL")]
    FetchTimeout,

    /// Required credential absent from configuration. Surfaced before any
    /// network call is attempted.
    #[error("{0} not set")]
    MissingCredentials(&'static str),

    /// Non-success status from the vision model endpoint. Body is truncated
    /// upstream, never echoed in full.
    #[error("vision model error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("timeout calling vision model")]
    UpstreamTimeout,

    /// Transport-level failure reaching the vision model endpoint.
    #[error("vision model unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The model responded, but the text could not be parsed as JSON even
    /// after fence stripping and trailing-comma repair.
    #[error("vision model returned invalid JSON: {message}. Raw: {excerpt}")]
    BadUpstreamResponse { message: String, excerpt: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ExtractError {
    /// Short category string used as the `error` field of the JSON body.
    fn category(&self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::BadRequest(_) => "bad_request",
            Self::UnsupportedMedia(_) => "unsupported_media",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Fetch(_) => "fetch_failed",
            Self::FetchTimeout => "fetch_timeout",
            Self::MissingCredentials(_) => "missing_credentials",
            Self::Upstream { .. } | Self::UpstreamUnreachable(_) => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::BadUpstreamResponse { .. } => "bad_upstream_response",
            Self::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingInput => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Fetch(_) => StatusCode::BAD_REQUEST,
            Self::FetchTimeout | Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::MissingCredentials(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. }
            | Self::UpstreamUnreachable(_)
            | Self::BadUpstreamResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let detail = match &self {
            // Full diagnostics go to the log; the caller gets a generic line.
            Self::Internal(err) => {
                error!("Unhandled pipeline error: {:#}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": self.category(),
            "detail": detail,
        }));

        (self.status_code(), body).into_response()
    }
}
