use axum::http::HeaderMap;

use crate::error::DialerError;

/// Checks `Authorization: Bearer <token>` against the configured api.token.
/// An empty configured token rejects every request.
pub fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), DialerError> {
    if expected_token.is_empty() {
        return Err(DialerError::NotConfigured("API token".to_string()));
    }

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected_token => Ok(()),
        _ => {
            tracing::warn!("Unauthorized API request");
            Err(DialerError::Unauthorized)
        }
    }
}
