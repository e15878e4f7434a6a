//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CheckoutError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or unknown bearer token.
    Unauthorized,
    /// Authenticated, but the role does not allow the operation.
    Forbidden(String),
    /// Conflicting state, e.g. an already-registered email.
    Conflict(String),
    /// Checkout failure.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing or invalid token".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        // Surfaced verbatim so the caller can show which item blocked
        // the checkout.
        CheckoutError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::EmptyCart | CheckoutError::InvalidQuantity { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutError::Busy => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        CheckoutError::Storage(inner) => {
            tracing::error!(error = %inner, "checkout storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(id) => ApiError::NotFound(format!("product {id} not found")),
            StoreError::DuplicateEmail => ApiError::Conflict("email already registered".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
