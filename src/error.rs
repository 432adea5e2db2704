use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::StoreError;
use crate::twilio::token::TokenError;

/// Application-level error type.
/// Implements `IntoResponse` so handlers can return `Result<T, DialerError>`.
#[derive(Debug, thiserror::Error)]
pub enum DialerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid webhook signature")]
    BadSignature,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl IntoResponse for DialerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            DialerError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            DialerError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            DialerError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            DialerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or missing bearer token".to_string(),
            ),
            DialerError::BadSignature => (
                StatusCode::FORBIDDEN,
                "BAD_SIGNATURE",
                "Invalid webhook signature".to_string(),
            ),
            DialerError::NotConfigured(what) => {
                tracing::warn!("{what} not configured, rejecting request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NOT_CONFIGURED",
                    format!("{what} not configured"),
                )
            }
            DialerError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            DialerError::Token(TokenError::NotConfigured) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_CONFIGURED",
                "Twilio API key not configured".to_string(),
            ),
            DialerError::Token(e) => {
                tracing::error!("Token error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TOKEN_ERROR",
                    "Failed to issue token".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
