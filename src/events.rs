use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::EventsConfig;
use crate::dialer::model::{AnsweredBy, CallStatus, Disposition};

/// Call lifecycle event pushed to dashboards when a call ends.
#[derive(Debug, Clone, Serialize)]
pub struct CallEvent {
    pub name: &'static str,
    pub call_sid: String,
    pub contact_id: Uuid,
    pub agent_id: Option<String>,
    pub status: CallStatus,
    pub answered_by: Option<AnsweredBy>,
    pub disposition: Disposition,
    pub duration_secs: Option<i32>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &CallEvent) -> Result<(), PublishError>;
}

/// Publishes to a broker's HTTP publish endpoint.
pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
    api_key: String,
    channel: String,
}

impl HttpPublisher {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            channel: config.channel.clone(),
        }
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, event: &CallEvent) -> Result<(), PublishError> {
        let body = json!({
            "channel": self.channel,
            "name": event.name,
            "data": event,
        });

        let mut req = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PublishError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Response(format!("HTTP {status}: {body}")));
        }

        tracing::debug!(call_sid = %event.call_sid, name = event.name, "Event published");
        Ok(())
    }
}

/// Used when no broker is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &CallEvent) -> Result<(), PublishError> {
        tracing::debug!(call_sid = %event.call_sid, "No event broker configured, dropping event");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish request failed: {0}")]
    Request(String),
    #[error("Broker returned error: {0}")]
    Response(String),
}
