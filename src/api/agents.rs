use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use super::auth::check_auth;
use crate::dialer::agents::PresenceUpdate;
use crate::dialer::model::Agent;
use crate::error::DialerError;
use crate::twilio::token::IssuedToken;
use crate::AppState;

/// POST /api/agents/presence: An agent connects, disconnects, or goes busy.
///
/// ```json
/// {
///   "agent_id": "lo-12",
///   "identity": "lo-12",
///   "status": "available"
/// }
/// ```
pub async fn handle_presence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<PresenceUpdate>,
) -> Result<Json<Agent>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;
    let agent = state.dialer.update_presence(update).await?;
    Ok(Json(agent))
}

/// GET /api/agents
pub async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Agent>>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;
    Ok(Json(state.dialer.store().list_agents().await?))
}

/// GET /api/agents/{id}/token: Voice SDK access token for the agent's browser.
pub async fn handle_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
) -> Result<Json<IssuedToken>, DialerError> {
    check_auth(&headers, &state.config.api.token)?;

    let agent = state
        .dialer
        .store()
        .get_agent(&agent_id)
        .await?
        .ok_or_else(|| DialerError::NotFound(format!("agent {agent_id}")))?;

    Ok(Json(state.tokens.issue(&agent.identity)?))
}
