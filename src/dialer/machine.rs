use super::model::{AnsweredBy, Call, CallStatus, ContactStatus, Disposition};
use super::Dialer;
use crate::error::DialerError;
use crate::twilio::twiml::Twiml;

#[derive(Debug, Clone)]
pub struct AnswerEvent {
    pub call_sid: String,
    /// Missing when detection was disabled or timed out without a verdict.
    pub answered_by: Option<AnsweredBy>,
}

impl Dialer {
    /// Decide what an answered call does next, based on the provider's
    /// answering machine detection verdict.
    ///
    /// A call is decided once. A redelivered answer replays the earlier
    /// decision, and an answer for a call that already ended hangs up.
    pub async fn handle_answer(&self, event: AnswerEvent) -> Result<Twiml, DialerError> {
        let Some(call) = self.store.get_call(&event.call_sid).await? else {
            tracing::warn!(call_sid = %event.call_sid, "Answer for unknown call, hanging up");
            return Ok(Twiml::hangup());
        };

        if call.status.is_terminal() {
            tracing::info!(call_sid = %call.sid, status = %call.status, "Answer for ended call");
            return Ok(Twiml::hangup());
        }
        if call.disposition != Disposition::Pending {
            tracing::info!(
                call_sid = %call.sid,
                disposition = %call.disposition,
                "Answer redelivered"
            );
            return self.replay_answer(&call).await;
        }

        self.store
            .advance_call_status(&call.sid, CallStatus::InProgress, None)
            .await?;

        let answered_by = event.answered_by.unwrap_or(AnsweredBy::Unknown);
        tracing::info!(
            call_sid = %call.sid,
            answered_by = %answered_by,
            "Call answered"
        );

        if answered_by.is_machine() {
            return self.leave_voicemail(&call, answered_by).await;
        }
        if answered_by == AnsweredBy::Fax {
            if self
                .store
                .settle_answer(&call.sid, answered_by, Disposition::Rejected, None)
                .await?
                .is_none()
            {
                return self.answer_lost(&call.sid).await;
            }
            self.store
                .set_contact_status(call.contact_id, ContactStatus::Failed)
                .await?;
            return Ok(Twiml::hangup());
        }

        self.connect_or_enqueue(&call, answered_by).await
    }

    async fn connect_or_enqueue(
        &self,
        call: &Call,
        answered_by: AnsweredBy,
    ) -> Result<Twiml, DialerError> {
        if let Some(agent) = self.store.claim_available_agent(&call.sid).await? {
            let settled = self
                .store
                .settle_answer(
                    &call.sid,
                    answered_by,
                    Disposition::Connected,
                    Some(&agent.id),
                )
                .await?;
            if settled.is_none() {
                // Ended or decided elsewhere in the meantime; hand the agent back.
                if self.store.release_agent(&agent.id, &call.sid).await? {
                    self.drain_queue().await?;
                }
                return self.answer_lost(&call.sid).await;
            }

            self.store
                .set_contact_status(call.contact_id, ContactStatus::Connected)
                .await?;
            tracing::info!(call_sid = %call.sid, agent_id = %agent.id, "Connecting to agent");
            return Ok(Twiml::dial_client(&agent.identity));
        }

        // The disposition goes first: once enqueued, a drain may connect the call.
        if self
            .store
            .settle_answer(&call.sid, answered_by, Disposition::Queued, None)
            .await?
            .is_none()
        {
            return self.answer_lost(&call.sid).await;
        }
        self.store.enqueue_call(&call.sid).await?;
        tracing::info!(call_sid = %call.sid, "No agent available, call queued");

        // An agent may have freed up between the claim and the enqueue.
        let dialer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dialer.drain_queue().await {
                tracing::error!("Queue drain after enqueue failed: {e}");
            }
        });

        Ok(self.hold_twiml())
    }

    async fn leave_voicemail(
        &self,
        call: &Call,
        answered_by: AnsweredBy,
    ) -> Result<Twiml, DialerError> {
        if self
            .store
            .settle_answer(&call.sid, answered_by, Disposition::Voicemail, None)
            .await?
            .is_none()
        {
            return self.answer_lost(&call.sid).await;
        }
        self.store
            .set_contact_status(call.contact_id, ContactStatus::Voicemail)
            .await?;

        tracing::info!(call_sid = %call.sid, "Leaving voicemail");
        self.voicemail_twiml(call).await
    }

    /// Another handler got to the call first. Answer with whatever it decided.
    async fn answer_lost(&self, call_sid: &str) -> Result<Twiml, DialerError> {
        match self.store.get_call(call_sid).await? {
            Some(call) if !call.status.is_terminal() => self.replay_answer(&call).await,
            _ => Ok(Twiml::hangup()),
        }
    }

    async fn replay_answer(&self, call: &Call) -> Result<Twiml, DialerError> {
        match call.disposition {
            Disposition::Connected => {
                let agent = match &call.agent_id {
                    Some(id) => self.store.get_agent(id).await?,
                    None => None,
                };
                match agent {
                    Some(agent) if agent.current_call_sid.as_deref() == Some(call.sid.as_str()) => {
                        Ok(Twiml::dial_client(&agent.identity))
                    }
                    _ => Ok(Twiml::hangup()),
                }
            }
            Disposition::Queued => Ok(self.hold_twiml()),
            Disposition::Voicemail => self.voicemail_twiml(call).await,
            Disposition::Pending | Disposition::Rejected => Ok(Twiml::hangup()),
        }
    }

    fn hold_twiml(&self) -> Twiml {
        Twiml::enqueue(&self.config.hold_message, &self.config.queue_name)
    }

    async fn voicemail_twiml(&self, call: &Call) -> Result<Twiml, DialerError> {
        let contact = self.store.get_contact(call.contact_id).await?;
        let name = contact
            .as_ref()
            .and_then(|c| c.first_name())
            .unwrap_or("there");
        Ok(Twiml::voicemail(
            &self.config.voicemail_script.replace("{name}", name),
        ))
    }
}
