use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DialerStore, StoreError};
use crate::dialer::model::{
    Agent, AgentStatus, AnsweredBy, Call, CallStatus, Contact, ContactStatus, Disposition,
    QueuedCall,
};

#[derive(Default)]
struct Inner {
    contacts: HashMap<Uuid, Contact>,
    calls: HashMap<String, Call>,
    agents: HashMap<String, Agent>,
    queue: VecDeque<QueuedCall>,
}

/// Process-local store. All state lives behind one lock, so every trait
/// method is atomic with respect to the others.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DialerStore for MemoryStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .contacts
            .insert(contact.id, contact.clone());
        Ok(())
    }

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, StoreError> {
        Ok(self.inner.lock().await.contacts.get(&id).cloned())
    }

    async fn claim_pending_contacts(
        &self,
        campaign_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut pending: Vec<&mut Contact> = inner
            .contacts
            .values_mut()
            .filter(|c| c.status == ContactStatus::Pending)
            .filter(|c| campaign_id.is_none() || c.campaign_id.as_deref() == campaign_id)
            .collect();
        pending.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let now = Utc::now();
        Ok(pending
            .into_iter()
            .take(limit)
            .map(|c| {
                c.status = ContactStatus::Dialing;
                c.attempts += 1;
                c.last_called_at = Some(now);
                c.clone()
            })
            .collect())
    }

    async fn set_contact_status(
        &self,
        id: Uuid,
        status: ContactStatus,
    ) -> Result<(), StoreError> {
        if let Some(c) = self.inner.lock().await.contacts.get_mut(&id) {
            c.status = status;
        }
        Ok(())
    }

    async fn insert_call(&self, call: &Call) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .calls
            .insert(call.sid.clone(), call.clone());
        Ok(())
    }

    async fn get_call(&self, sid: &str) -> Result<Option<Call>, StoreError> {
        Ok(self.inner.lock().await.calls.get(sid).cloned())
    }

    async fn advance_call_status(
        &self,
        sid: &str,
        status: CallStatus,
        duration_secs: Option<i32>,
    ) -> Result<Option<Call>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(call) = inner.calls.get_mut(sid) else {
            return Ok(None);
        };
        if !call.status.can_advance_to(status) {
            return Ok(None);
        }

        let now = Utc::now();
        call.status = status;
        call.updated_at = now;
        if duration_secs.is_some() {
            call.duration_secs = duration_secs;
        }
        if status.is_terminal() {
            call.ended_at = Some(now);
        }
        Ok(Some(call.clone()))
    }

    async fn settle_answer(
        &self,
        sid: &str,
        answered_by: AnsweredBy,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(call) = inner.calls.get_mut(sid) else {
            return Ok(None);
        };
        if call.status.is_terminal() || call.disposition != Disposition::Pending {
            return Ok(None);
        }

        call.answered_by = Some(answered_by);
        call.disposition = disposition;
        call.agent_id = agent_id.map(String::from);
        call.updated_at = Utc::now();
        Ok(Some(call.clone()))
    }

    async fn record_disposition(
        &self,
        sid: &str,
        answered_by: Option<AnsweredBy>,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(call) = inner.calls.get_mut(sid) else {
            return Ok(None);
        };
        if answered_by.is_some() {
            call.answered_by = answered_by;
        }
        call.disposition = disposition;
        if let Some(agent_id) = agent_id {
            call.agent_id = Some(agent_id.to_string());
        }
        call.updated_at = Utc::now();
        Ok(Some(call.clone()))
    }

    async fn set_agent_presence(
        &self,
        id: &str,
        identity: &str,
        name: Option<&str>,
        status: AgentStatus,
    ) -> Result<Option<Agent>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        if let Some(agent) = inner.agents.get_mut(id) {
            if agent.current_call_sid.is_some() && status != AgentStatus::Busy {
                return Ok(None);
            }
            agent.identity = identity.to_string();
            if name.is_some() {
                agent.name = name.map(String::from);
            }
            agent.status = status;
            agent.updated_at = now;
            return Ok(Some(agent.clone()));
        }

        let agent = Agent {
            id: id.to_string(),
            identity: identity.to_string(),
            name: name.map(String::from),
            status,
            current_call_sid: None,
            updated_at: now,
        };
        inner.agents.insert(id.to_string(), agent.clone());
        Ok(Some(agent))
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.inner.lock().await.agents.get(id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self.inner.lock().await.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn count_available_agents(&self) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .agents
            .values()
            .filter(|a| a.status == AgentStatus::Available)
            .count())
    }

    async fn claim_available_agent(&self, call_sid: &str) -> Result<Option<Agent>, StoreError> {
        let mut inner = self.inner.lock().await;
        let agent = inner
            .agents
            .values_mut()
            .filter(|a| a.status == AgentStatus::Available)
            .min_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));

        Ok(agent.map(|a| {
            a.status = AgentStatus::Busy;
            a.current_call_sid = Some(call_sid.to_string());
            a.updated_at = Utc::now();
            a.clone()
        }))
    }

    async fn release_agent(&self, agent_id: &str, call_sid: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.agents.get_mut(agent_id) {
            Some(a) if a.current_call_sid.as_deref() == Some(call_sid) => {
                a.status = AgentStatus::Available;
                a.current_call_sid = None;
                a.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn enqueue_call(&self, call_sid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.queue.iter().any(|q| q.call_sid == call_sid) {
            return Ok(());
        }
        inner.queue.push_back(QueuedCall {
            call_sid: call_sid.to_string(),
            enqueued_at: Utc::now(),
        });
        Ok(())
    }

    async fn requeue_front(&self, entry: &QueuedCall) -> Result<(), StoreError> {
        self.inner.lock().await.queue.push_front(entry.clone());
        Ok(())
    }

    async fn dequeue_call(&self) -> Result<Option<QueuedCall>, StoreError> {
        Ok(self.inner.lock().await.queue.pop_front())
    }

    async fn remove_queued(&self, call_sid: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.queue.len();
        inner.queue.retain(|q| q.call_sid != call_sid);
        Ok(inner.queue.len() != before)
    }

    async fn list_queue(&self) -> Result<Vec<QueuedCall>, StoreError> {
        Ok(self.inner.lock().await.queue.iter().cloned().collect())
    }
}
