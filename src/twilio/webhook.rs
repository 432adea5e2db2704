use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::Form;

use crate::dialer::machine::AnswerEvent;
use crate::dialer::model::AnsweredBy;
use crate::dialer::status::StatusEvent;
use crate::error::DialerError;
use crate::twilio::signature;
use crate::twilio::twiml::Twiml;
use crate::AppState;

/// Form parameters of a Twilio voice webhook, checked against `X-Twilio-Signature`.
struct WebhookForm {
    params: Vec<(String, String)>,
}

impl WebhookForm {
    fn verified(
        state: &AppState,
        headers: &HeaderMap,
        uri: &Uri,
        params: Vec<(String, String)>,
    ) -> Result<Self, DialerError> {
        if state.config.twilio.validate_signatures {
            let url = format!(
                "{}{}",
                state.config.server.external_url.trim_end_matches('/'),
                uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
            );
            let provided = headers
                .get("x-twilio-signature")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            if !signature::validate(&state.config.twilio.auth_token, &url, &params, provided) {
                tracing::warn!(url = %url, "Rejected webhook with bad signature");
                return Err(DialerError::BadSignature);
            }
        }
        Ok(Self { params })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<String, DialerError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or_else(|| DialerError::Validation(format!("missing {key}")))
    }
}

/// Handle POST /twilio/dialer/answer: the call's voice URL.
///
/// Twilio holds the request until machine detection finishes, so
/// `AnsweredBy` is already set. Responds with TwiML that bridges, queues,
/// or drops a voicemail.
pub async fn handle_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<Twiml, DialerError> {
    let form = WebhookForm::verified(&state, &headers, &uri, params)?;
    let event = AnswerEvent {
        call_sid: form.require("CallSid")?,
        answered_by: form.get("AnsweredBy").and_then(AnsweredBy::parse),
    };
    state.dialer.handle_answer(event).await
}

/// Handle POST /twilio/dialer/status: call lifecycle callbacks.
pub async fn handle_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<Twiml, DialerError> {
    let form = WebhookForm::verified(&state, &headers, &uri, params)?;
    let event = StatusEvent {
        call_sid: form.require("CallSid")?,
        call_status: form.require("CallStatus")?,
        duration_secs: form.get("CallDuration").and_then(|d| d.parse().ok()),
    };
    state.dialer.handle_status(event).await?;
    Ok(Twiml::empty())
}

/// Handle POST /twilio/dialer/bridge: TwiML for a call redirected out of the queue.
pub async fn handle_bridge(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<Twiml, DialerError> {
    let form = WebhookForm::verified(&state, &headers, &uri, params)?;
    let call_sid = form.require("CallSid")?;
    state.dialer.handle_bridge(&call_sid).await
}
