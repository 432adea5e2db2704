use async_trait::async_trait;

use crate::config::{DialerConfig, TwilioConfig};

pub const ANSWER_PATH: &str = "/twilio/dialer/answer";
pub const STATUS_PATH: &str = "/twilio/dialer/status";
pub const BRIDGE_PATH: &str = "/twilio/dialer/bridge";

/// Outbound side of the telephony provider: placing calls and steering live ones.
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Place a call to `to` with answering machine detection. Returns the call SID.
    async fn place_call(&self, to: &str) -> Result<String, OutboundError>;

    /// Point a live call at a new TwiML webhook, pulling it out of any queue.
    async fn redirect_call(&self, call_sid: &str, path: &str) -> Result<(), OutboundError>;
}

/// Twilio REST API client for the dialer's outbound legs.
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    external_url: String,
    amd_timeout_secs: String,
    ring_timeout_secs: String,
}

impl TwilioClient {
    pub fn new(twilio_config: &TwilioConfig, dialer: &DialerConfig, external_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid: twilio_config.account_sid.clone(),
            auth_token: twilio_config.auth_token.clone(),
            from_number: twilio_config.phone_number.clone(),
            external_url: external_url.trim_end_matches('/').to_string(),
            amd_timeout_secs: dialer.machine_detection_timeout_secs.to_string(),
            ring_timeout_secs: dialer.ring_timeout_secs.to_string(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Calls",
            self.account_sid
        )
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, OutboundError> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .send()
            .await
            .map_err(|e| OutboundError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OutboundError::Api(format!("{status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| OutboundError::Request(e.to_string()))
    }
}

#[async_trait]
impl Telephony for TwilioClient {
    /// Twilio calls `to`, waits for the machine detection verdict, then POSTs
    /// to the answer webhook with `AnsweredBy` set. Lifecycle events go to the
    /// status webhook.
    async fn place_call(&self, to: &str) -> Result<String, OutboundError> {
        let answer_url = format!("{}{ANSWER_PATH}", self.external_url);
        let status_url = format!("{}{STATUS_PATH}", self.external_url);

        let params = [
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Url", answer_url.as_str()),
            ("Method", "POST"),
            ("MachineDetection", "DetectMessageEnd"),
            ("MachineDetectionTimeout", self.amd_timeout_secs.as_str()),
            ("Timeout", self.ring_timeout_secs.as_str()),
            ("StatusCallback", status_url.as_str()),
            ("StatusCallbackMethod", "POST"),
            ("StatusCallbackEvent", "initiated"),
            ("StatusCallbackEvent", "ringing"),
            ("StatusCallbackEvent", "answered"),
            ("StatusCallbackEvent", "completed"),
        ];

        let body = self
            .post_form(&format!("{}.json", self.calls_url()), &params)
            .await?;

        let call_sid = body["sid"]
            .as_str()
            .ok_or_else(|| OutboundError::Api("response missing call sid".into()))?
            .to_string();

        tracing::info!(to, call_sid = %call_sid, "Outbound call initiated");
        Ok(call_sid)
    }

    async fn redirect_call(&self, call_sid: &str, path: &str) -> Result<(), OutboundError> {
        let url = format!("{}/{call_sid}.json", self.calls_url());
        let target = format!("{}{path}", self.external_url);
        let params = [("Url", target.as_str()), ("Method", "POST")];

        self.post_form(&url, &params).await?;

        tracing::info!(call_sid, target = %target, "Call redirected");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Twilio API error: {0}")]
    Api(String),
}
