use serde::Deserialize;

use super::model::{Agent, AgentStatus, CallStatus, ContactStatus, Disposition};
use super::Dialer;
use crate::error::DialerError;
use crate::twilio::outbound::BRIDGE_PATH;
use crate::twilio::twiml::Twiml;

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceUpdate {
    pub agent_id: String,
    /// Client identity to ring. Defaults to the agent id.
    pub identity: Option<String>,
    pub name: Option<String>,
    pub status: AgentStatus,
}

impl Dialer {
    /// Register or update an agent. An agent coming online pulls waiting callers.
    pub async fn update_presence(&self, update: PresenceUpdate) -> Result<Agent, DialerError> {
        if update.agent_id.trim().is_empty() {
            return Err(DialerError::Validation("agent_id is required".into()));
        }

        let identity = match update.identity.as_deref() {
            Some(identity) if !identity.trim().is_empty() => identity.to_string(),
            _ => match self.store.get_agent(&update.agent_id).await? {
                Some(existing) => existing.identity,
                None => update.agent_id.clone(),
            },
        };

        let agent = self
            .store
            .set_agent_presence(
                &update.agent_id,
                &identity,
                update.name.as_deref(),
                update.status,
            )
            .await?
            .ok_or_else(|| {
                DialerError::Conflict(format!(
                    "agent {} is on a live call",
                    update.agent_id
                ))
            })?;

        tracing::info!(agent_id = %agent.id, status = %agent.status, "Agent presence updated");

        if agent.status == AgentStatus::Available {
            let assigned = self.drain_queue().await?;
            if assigned > 0 {
                tracing::info!(agent_id = %agent.id, assigned, "Queued calls assigned");
            }
        }

        Ok(agent)
    }

    /// Pair queued callers with available agents until either runs out.
    /// Returns the number of calls assigned.
    pub async fn drain_queue(&self) -> Result<usize, DialerError> {
        let mut assigned = 0;

        while self.store.count_available_agents().await? > 0 {
            let Some(entry) = self.store.dequeue_call().await? else {
                break;
            };

            let call = match self.store.get_call(&entry.call_sid).await? {
                Some(call) if !call.status.is_terminal() => call,
                _ => {
                    tracing::debug!(call_sid = %entry.call_sid, "Dropping ended call from queue");
                    continue;
                }
            };

            let Some(agent) = self.store.claim_available_agent(&call.sid).await? else {
                // Lost the agent to a concurrent claim; keep the caller's place.
                self.store.requeue_front(&entry).await?;
                break;
            };

            // The bridge webhook reads the assignment, so record it before redirecting.
            self.store
                .record_disposition(&call.sid, None, Disposition::Connected, Some(&agent.id))
                .await?;

            match self.telephony.redirect_call(&call.sid, BRIDGE_PATH).await {
                Ok(()) => {
                    self.store
                        .set_contact_status(call.contact_id, ContactStatus::Connected)
                        .await?;
                    tracing::info!(
                        call_sid = %call.sid,
                        agent_id = %agent.id,
                        "Queued call assigned"
                    );
                    assigned += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        call_sid = %call.sid,
                        agent_id = %agent.id,
                        "Failed to redirect queued call: {e}"
                    );
                    self.store.release_agent(&agent.id, &call.sid).await?;
                    if let Some(failed) = self
                        .store
                        .advance_call_status(&call.sid, CallStatus::Failed, None)
                        .await?
                    {
                        self.store
                            .set_contact_status(call.contact_id, ContactStatus::Failed)
                            .await?;
                        self.publish_completed(&failed).await;
                    }
                }
            }
        }

        Ok(assigned)
    }

    /// TwiML for a call pulled out of the queue: ring its assigned agent.
    pub async fn handle_bridge(&self, call_sid: &str) -> Result<Twiml, DialerError> {
        let agent_id = self
            .store
            .get_call(call_sid)
            .await?
            .and_then(|call| call.agent_id);

        let agent = match agent_id {
            Some(id) => self.store.get_agent(&id).await?,
            None => None,
        };

        match agent {
            Some(agent) if agent.current_call_sid.as_deref() == Some(call_sid) => {
                tracing::info!(call_sid, agent_id = %agent.id, "Bridging queued call");
                Ok(Twiml::dial_client(&agent.identity))
            }
            _ => {
                tracing::warn!(call_sid, "Bridge requested without an assigned agent");
                Ok(Twiml::hangup())
            }
        }
    }
}
