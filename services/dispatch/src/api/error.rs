//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes error response construction so every failure leaves the
//! service in the same envelope:
//! `{"error": {"code": "<SYMBOLIC_CODE>", "message": "<text>"}}`.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable upper-case `code` and a human-readable
//!   `message`.
//! - Status codes align with the error category.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
//! - Access denials never say which check failed.
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
pub const INVALID_ACCESS_TOKEN: &str = "INVALID_ACCESS_TOKEN";
pub const METHOD_NOT_SUPPORTED: &str = "METHOD_NOT_SUPPORTED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Structured API error. Couples an HTTP status with the error body.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use dispatch::api::error::api_not_found;
///
/// let err = api_not_found("no resource");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// assert_eq!(err.body.code, "NOT_FOUND");
/// ```
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn code(&self) -> &str {
        &self.body.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, NOT_FOUND, message)
}

/// 403 with a fixed message, whatever the reason.
pub fn api_forbidden() -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, ACCESS_DENIED, "access denied")
}

pub fn api_invalid_token(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, INVALID_ACCESS_TOKEN, message)
}

pub fn api_method_not_supported(verb: &str, resource: &str) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        METHOD_NOT_SUPPORTED,
        &format!("method {verb} is not supported by {resource}"),
    )
}

/// 400 with a caller-chosen code, e.g. `NO_USERNAME`.
pub fn api_client_error(code: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, code, message)
}

pub fn api_payload_too_large(limit: usize) -> ApiError {
    ApiError::new(
        StatusCode::PAYLOAD_TOO_LARGE,
        PAYLOAD_TOO_LARGE,
        &format!("request body exceeds {limit} bytes"),
    )
}

/// 500 with a generic message. `context` and `err` are logged, never sent.
pub fn api_internal(context: &str, err: &dyn std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "{context}");
    api_internal_message()
}

pub fn api_internal_message() -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR,
        "internal error",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code(), NOT_FOUND);

        let forbidden = api_forbidden();
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.code(), ACCESS_DENIED);

        let token = api_invalid_token("bad signature");
        assert_eq!(token.status, StatusCode::BAD_REQUEST);
        assert_eq!(token.code(), INVALID_ACCESS_TOKEN);

        let method = api_method_not_supported("delete", "items");
        assert_eq!(method.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(method.body.message.contains("items"));

        let client = api_client_error("NO_USERNAME", "username missing");
        assert_eq!(client.status, StatusCode::BAD_REQUEST);
        assert_eq!(client.code(), "NO_USERNAME");

        let large = api_payload_too_large(10);
        assert_eq!(large.status, StatusCode::PAYLOAD_TOO_LARGE);

        let internal = api_internal("store lookup failed", &"connection reset");
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.body.message, "internal error");
    }

    #[test]
    fn envelope_wraps_body_under_error_key() {
        let envelope = ErrorEnvelope {
            error: api_forbidden().body,
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"error": {"code": "ACCESS_DENIED", "message": "access denied"}})
        );
    }
}
