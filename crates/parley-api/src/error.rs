//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping domain errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use parley_core::error::{ParleyError, ValidationErrors};

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "validation_error", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Field-level details, present for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or malformed parameters.
    BadRequest(String),
    /// 400 Bad Request - request body failed validation.
    Validation(ValidationErrors),
    /// 401 Unauthorized - missing or wrong bearer token.
    Unauthorized(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 413 Payload Too Large - body exceeds `server.max_body_bytes`.
    PayloadTooLarge(String),
    /// 409 Conflict - transcript id already stored.
    Conflict(String),
    /// 500 Internal Server Error - an inference stage failed.
    Extraction(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("Validation failed: {}", errors),
                serde_json::to_value(&errors).ok(),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg, None)
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "duplicate_transcript", msg, None),
            ApiError::Extraction(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "extraction_failure",
                msg,
                None,
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ParleyError> for ApiError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::Validation(errors) => ApiError::Validation(errors),
            ParleyError::InvalidQuery(msg) => ApiError::BadRequest(msg),
            ParleyError::DuplicateTranscript(id) => {
                ApiError::Conflict(format!("Transcript with id '{}' already exists", id))
            }
            ParleyError::NotFound(msg) => ApiError::NotFound(msg),
            ParleyError::Extraction { stage, cause } => {
                error!(stage = %stage, cause = %cause, "Extraction failed");
                ApiError::Extraction(format!("Extraction failed at {} stage", stage))
            }
            other => {
                error!(kind = other.kind(), error = %other, "Request failed");
                ApiError::Internal(internal_message(&other).to_string())
            }
        }
    }
}

/// Client-facing text for server-side failures. Driver and I/O detail stays in
/// the logs.
fn internal_message(err: &ParleyError) -> &'static str {
    match err {
        ParleyError::Persistence(_) => "Failed to access transcript storage",
        ParleyError::Serialization(_) => "Failed to encode or decode stored data",
        ParleyError::Io(_) => "I/O failure while handling the request",
        ParleyError::Config(_) => "Server is misconfigured",
        _ => "Internal server error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ExtractionStage;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ParleyError::Validation(ValidationErrors::new()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ParleyError::InvalidQuery("q".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ParleyError::DuplicateTranscript("t-1".to_string()),
                StatusCode::CONFLICT,
            ),
            (ParleyError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (
                ParleyError::Extraction {
                    stage: ExtractionStage::Summarization,
                    cause: "boom".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ParleyError::Persistence("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let resp = ApiError::from(err).into_response();
            assert_eq!(resp.status(), status);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_hides_driver_detail() {
        let err = ParleyError::Persistence(
            "Failed to insert transcript: UNIQUE constraint failed: transcripts.transcript_id"
                .to_string(),
        );
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "Failed to access transcript storage");
        assert!(!body.to_string().contains("UNIQUE"));
    }
}
