use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use super::auth::check_auth;
use crate::dialer::dispatcher::{StartReport, StartRequest};
use crate::dialer::model::{Call, QueuedCall};
use crate::error::DialerError;
use crate::AppState;

/// POST /api/dialer/start: Place a batch of calls.
///
/// Request body (all fields optional):
/// ```json
/// {
///   "campaign_id": "spring-refi",
///   "limit": 10
/// }
/// ```
pub async fn handle_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartReport>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;

    let req = body.map(|Json(req)| req).unwrap_or_default();
    tracing::info!(campaign_id = ?req.campaign_id, limit = ?req.limit, "Dialing requested");

    let report = state.dialer.start_dialing(req).await?;
    Ok(Json(report))
}

/// GET /api/dialer/calls/{sid}
pub async fn handle_get_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<Json<Call>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;

    state
        .dialer
        .store()
        .get_call(&sid)
        .await?
        .map(Json)
        .ok_or_else(|| DialerError::NotFound(format!("call {sid}")))
}

/// GET /api/dialer/queue: Callers waiting for an agent, oldest first.
pub async fn handle_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<QueuedCall>>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;
    Ok(Json(state.dialer.store().list_queue().await?))
}
