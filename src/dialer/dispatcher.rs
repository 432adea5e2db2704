use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Call, Contact, ContactStatus};
use super::Dialer;
use crate::error::DialerError;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Only dial contacts in this campaign.
    pub campaign_id: Option<String>,
    /// Explicit batch size. Defaults to `calls_per_agent` per available agent.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PlacedCall {
    pub call_sid: String,
    pub contact_id: Uuid,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DialFailure {
    pub contact_id: Uuid,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct StartReport {
    pub placed: Vec<PlacedCall>,
    pub failures: Vec<DialFailure>,
}

impl Dialer {
    /// Place one batch of outbound calls to contacts that have not been called yet.
    pub async fn start_dialing(&self, req: StartRequest) -> Result<StartReport, DialerError> {
        let batch = self.batch_size(req.limit).await?;
        if batch == 0 {
            tracing::info!("Nothing to dial: no available agents");
            return Ok(StartReport::default());
        }

        let contacts = self
            .store
            .claim_pending_contacts(req.campaign_id.as_deref(), batch)
            .await?;

        tracing::info!(
            batch,
            claimed = contacts.len(),
            campaign_id = ?req.campaign_id,
            "Dialing batch"
        );

        let mut report = StartReport::default();
        for contact in contacts {
            match self.dial_contact(&contact).await {
                Ok(call_sid) => report.placed.push(PlacedCall {
                    call_sid,
                    contact_id: contact.id,
                }),
                Err(error) => report.failures.push(DialFailure {
                    contact_id: contact.id,
                    error,
                }),
            }
        }

        Ok(report)
    }

    /// Place one claimed contact's call. Every failure is reported per
    /// contact so the rest of the batch still goes out.
    async fn dial_contact(&self, contact: &Contact) -> Result<String, String> {
        let call_sid = match self.telephony.place_call(&contact.phone).await {
            Ok(sid) => sid,
            Err(e) => {
                tracing::warn!(contact_id = %contact.id, "Failed to place call: {e}");
                self.mark_failed(contact).await;
                return Err(e.to_string());
            }
        };

        if let Err(e) = self
            .store
            .insert_call(&Call::placed(call_sid.clone(), contact.id))
            .await
        {
            // The call is live but its webhooks will find no row.
            tracing::error!(
                call_sid = %call_sid,
                contact_id = %contact.id,
                "Failed to record placed call: {e}"
            );
            self.mark_failed(contact).await;
            return Err(format!("call {call_sid} placed but not recorded: {e}"));
        }

        tracing::info!(
            call_sid = %call_sid,
            contact_id = %contact.id,
            "Call placed"
        );
        Ok(call_sid)
    }

    async fn mark_failed(&self, contact: &Contact) {
        if let Err(e) = self
            .store
            .set_contact_status(contact.id, ContactStatus::Failed)
            .await
        {
            tracing::error!(contact_id = %contact.id, "Failed to mark contact failed: {e}");
        }
    }

    async fn batch_size(&self, limit: Option<usize>) -> Result<usize, DialerError> {
        let wanted = match limit {
            Some(0) => return Err(DialerError::Validation("limit must be positive".into())),
            Some(n) => n,
            None => {
                let agents = self.store.count_available_agents().await?;
                agents.saturating_mul(self.config.calls_per_agent)
            }
        };
        Ok(wanted.min(self.config.max_batch))
    }
}
