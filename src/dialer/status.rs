use chrono::Utc;

use super::model::{Call, CallStatus, ContactStatus};
use super::Dialer;
use crate::error::DialerError;
use crate::events::CallEvent;

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub call_sid: String,
    /// Raw provider status, e.g. `in-progress` or `no-answer`.
    pub call_status: String,
    pub duration_secs: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied(CallStatus),
    /// Out of order, redelivered, unknown call, or unrecognized status.
    Ignored,
}

impl Dialer {
    /// Follow a provider lifecycle callback. Terminal statuses finalize the
    /// contact, free the agent, and publish a completion event.
    pub async fn handle_status(&self, event: StatusEvent) -> Result<StatusOutcome, DialerError> {
        let Some(status) = CallStatus::parse(&event.call_status) else {
            tracing::warn!(
                call_sid = %event.call_sid,
                status = %event.call_status,
                "Unrecognized call status"
            );
            return Ok(StatusOutcome::Ignored);
        };

        let Some(current) = self.store.get_call(&event.call_sid).await? else {
            tracing::warn!(call_sid = %event.call_sid, "Status for unknown call");
            return Ok(StatusOutcome::Ignored);
        };

        let Some(call) = self
            .store
            .advance_call_status(&event.call_sid, status, event.duration_secs)
            .await?
        else {
            tracing::debug!(
                call_sid = %event.call_sid,
                from = %current.status,
                to = %status,
                "Stale status ignored"
            );
            return Ok(StatusOutcome::Ignored);
        };

        tracing::info!(call_sid = %call.sid, status = %status, "Call status updated");

        if status.is_terminal() {
            self.finish_call(&call).await?;
        }

        Ok(StatusOutcome::Applied(status))
    }

    async fn finish_call(&self, call: &Call) -> Result<(), DialerError> {
        if self.store.remove_queued(&call.sid).await? {
            tracing::info!(call_sid = %call.sid, "Caller hung up while queued");
        }

        if let Some(contact) = self.store.get_contact(call.contact_id).await? {
            if let Some(final_status) = final_contact_status(contact.status, call.status) {
                self.store
                    .set_contact_status(contact.id, final_status)
                    .await?;
            }
        }

        if let Some(agent_id) = &call.agent_id {
            if self.store.release_agent(agent_id, &call.sid).await? {
                tracing::info!(call_sid = %call.sid, agent_id = %agent_id, "Agent released");
                self.drain_queue().await?;
            }
        }

        self.publish_completed(call).await;
        Ok(())
    }

    /// Best effort: a broker outage never fails the caller.
    pub(super) async fn publish_completed(&self, call: &Call) {
        let event = CallEvent {
            name: "call.completed",
            call_sid: call.sid.clone(),
            contact_id: call.contact_id,
            agent_id: call.agent_id.clone(),
            status: call.status,
            answered_by: call.answered_by,
            disposition: call.disposition,
            duration_secs: call.duration_secs,
            at: Utc::now(),
        };
        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(call_sid = %call.sid, "Failed to publish completion event: {e}");
        }
    }
}

/// Contact status after its call ends. `None` keeps the current status.
fn final_contact_status(current: ContactStatus, ended: CallStatus) -> Option<ContactStatus> {
    match ended {
        CallStatus::Completed => match current {
            ContactStatus::Voicemail | ContactStatus::Failed => None,
            _ => Some(ContactStatus::Completed),
        },
        CallStatus::Busy => Some(ContactStatus::Busy),
        CallStatus::NoAnswer => Some(ContactStatus::NoAnswer),
        CallStatus::Failed | CallStatus::Canceled => Some(ContactStatus::Failed),
        _ => None,
    }
}
