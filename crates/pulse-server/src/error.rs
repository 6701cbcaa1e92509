use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use pulse_core::ValidationError;

/// Errors surfaced to HTTP callers. Display text is the exact `error`
/// string in the response body; internal detail is logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded. Please retry shortly.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Failed to process review")]
    ProcessingFailed,

    #[error("Failed to load reviews")]
    LoadFailed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ProcessingFailed | Self::LoadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::RateLimited { retry_after_secs } => {
                let body = json!({
                    "error": self.to_string(),
                    "retryAfterSec": retry_after_secs,
                });
                let mut response = (status, Json(body)).into_response();
                if retry_after_secs > 0 {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                }
                response
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
