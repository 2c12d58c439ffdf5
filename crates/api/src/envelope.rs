//! JSON response envelopes.
//!
//! Success bodies are `{success: true, data, message?}`; failures carry
//! an RFC7807-shaped `error` object under `{success: false}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use calbridge_domain::CalbridgeError;

/// Success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

/// Success envelope with a human-readable message.
pub fn ok_with_message<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": data, "message": message })),
    )
        .into_response()
}

/// Success envelope for resource creation.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(json!({ "success": true, "data": data }))).into_response()
}

/// Error envelope wrapper so handlers can `?` on domain results.
#[derive(Debug)]
pub struct ApiError(pub CalbridgeError);

impl From<CalbridgeError> for ApiError {
    fn from(err: CalbridgeError) -> Self {
        Self(err)
    }
}

pub type ApiResult<T = Response> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title) = status_for(&self.0);
        let detail = detail_for(&self.0);

        let body = json!({
            "success": false,
            "error": {
                "type": self.0.kind(),
                "title": title,
                "status": status.as_u16(),
                "detail": detail,
            }
        });

        (status, Json(body)).into_response()
    }
}

fn status_for(err: &CalbridgeError) -> (StatusCode, &'static str) {
    match err {
        CalbridgeError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
        CalbridgeError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "Not authenticated"),
        CalbridgeError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
        CalbridgeError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
        CalbridgeError::RateLimited(_) => {
            (StatusCode::TOO_MANY_REQUESTS, "Upstream rate limit exceeded")
        }
        CalbridgeError::QuotaExceeded(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Upstream quota exceeded")
        }
        CalbridgeError::UpstreamAuth(_) => {
            (StatusCode::UNAUTHORIZED, "Upstream authentication failed")
        }
        CalbridgeError::Network(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Upstream unavailable"),
        CalbridgeError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
        CalbridgeError::Database(_)
        | CalbridgeError::Config(_)
        | CalbridgeError::Security(_)
        | CalbridgeError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

/// Internal classes render a generic detail; everything else carries
/// its message.
fn detail_for(err: &CalbridgeError) -> String {
    match err {
        CalbridgeError::Database(_)
        | CalbridgeError::Config(_)
        | CalbridgeError::Security(_)
        | CalbridgeError::Internal(_) => "an internal error occurred".to_string(),
        CalbridgeError::QuotaExceeded(msg) => format!("upstream daily quota exhausted: {msg}"),
        other => other.to_string(),
    }
}
