use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::model::{
    Agent, AgentStatus, AnsweredBy, Call, CallStatus, Contact, ContactStatus, Disposition,
    QueuedCall,
};
use super::Dialer;
use crate::config::DialerConfig;
use crate::events::{CallEvent, EventPublisher, PublishError};
use crate::store::memory::MemoryStore;
use crate::store::{DialerStore, StoreError};
use crate::twilio::outbound::{OutboundError, Telephony};

/// Records outbound requests instead of talking to Twilio.
#[derive(Default)]
pub struct FakeTelephony {
    next_sid: AtomicUsize,
    dialed: Mutex<Vec<String>>,
    redirects: Mutex<Vec<(String, String)>>,
    failing_numbers: Mutex<HashSet<String>>,
    failing_redirects: Mutex<HashSet<String>>,
}

impl FakeTelephony {
    pub async fn dialed(&self) -> Vec<String> {
        self.dialed.lock().await.clone()
    }

    pub async fn redirects(&self) -> Vec<(String, String)> {
        self.redirects.lock().await.clone()
    }

    pub async fn fail_number(&self, number: &str) {
        self.failing_numbers.lock().await.insert(number.to_string());
    }

    pub async fn fail_redirect(&self, call_sid: &str) {
        self.failing_redirects
            .lock()
            .await
            .insert(call_sid.to_string());
    }

    pub fn next_sid(&self) -> String {
        format!("CA{:032}", self.next_sid.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn place_call(&self, to: &str) -> Result<String, OutboundError> {
        if self.failing_numbers.lock().await.contains(to) {
            return Err(OutboundError::Api("400: invalid 'To' number".into()));
        }
        self.dialed.lock().await.push(to.to_string());
        Ok(self.next_sid())
    }

    async fn redirect_call(&self, call_sid: &str, path: &str) -> Result<(), OutboundError> {
        if self.failing_redirects.lock().await.contains(call_sid) {
            return Err(OutboundError::Api("404: call not in progress".into()));
        }
        self.redirects
            .lock()
            .await
            .push((call_sid.to_string(), path.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<CallEvent>>,
    fail_next: Mutex<bool>,
}

impl RecordingPublisher {
    pub async fn events(&self) -> Vec<CallEvent> {
        self.events.lock().await.clone()
    }

    pub async fn fail_next(&self) {
        *self.fail_next.lock().await = true;
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &CallEvent) -> Result<(), PublishError> {
        let mut fail = self.fail_next.lock().await;
        if *fail {
            *fail = false;
            return Err(PublishError::Response("HTTP 503: broker down".into()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub dialer: Dialer,
    pub store: Arc<MemoryStore>,
    pub telephony: Arc<FakeTelephony>,
    pub events: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(false).0
    }

    /// Harness whose dialer goes through a [`ScriptedStore`]. `store` still
    /// points at the underlying memory store, bypassing the scripted faults.
    pub fn scripted() -> (Self, Arc<ScriptedStore>) {
        Self::build(true)
    }

    fn build(scripted: bool) -> (Self, Arc<ScriptedStore>) {
        let store = Arc::new(MemoryStore::new());
        let telephony = Arc::new(FakeTelephony::default());
        let events = Arc::new(RecordingPublisher::default());

        let wrapper = Arc::new(ScriptedStore::new(store.clone()));
        let dialer_store: Arc<dyn DialerStore> = if scripted {
            wrapper.clone()
        } else {
            store.clone()
        };
        let dialer = Dialer::new(
            dialer_store,
            telephony.clone(),
            events.clone(),
            DialerConfig::default(),
        );
        let harness = Self {
            dialer,
            store,
            telephony,
            events,
        };
        (harness, wrapper)
    }

    pub async fn agent(&self, id: &str, status: AgentStatus) -> Agent {
        self.store
            .set_agent_presence(id, id, None, status)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn contact(&self, name: &str, phone: &str) -> Contact {
        let contact = Contact::new(name.to_string(), phone.to_string(), None);
        self.store.insert_contact(&contact).await.unwrap();
        contact
    }

    /// A contact that has just been dialed, with its call row.
    pub async fn placed_call(&self, name: &str) -> Call {
        let mut contact = Contact::new(name.to_string(), "+15550109999".to_string(), None);
        contact.status = ContactStatus::Dialing;
        contact.attempts = 1;
        self.store.insert_contact(&contact).await.unwrap();

        let call = Call::placed(self.telephony.next_sid(), contact.id);
        self.store.insert_call(&call).await.unwrap();
        call
    }
}

/// Memory store with injectable faults and interleavings.
pub struct ScriptedStore {
    inner: Arc<MemoryStore>,
    fail_next_insert_call: AtomicBool,
    on_enqueue: Mutex<Option<(Dialer, String)>>,
}

impl ScriptedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_next_insert_call: AtomicBool::new(false),
            on_enqueue: Mutex::new(None),
        }
    }

    pub fn fail_next_insert_call(&self) {
        self.fail_next_insert_call.store(true, Ordering::SeqCst);
    }

    /// Right after the next enqueue, bring `agent_id` online and drain the
    /// queue through `dialer`, as a concurrent presence update would.
    pub async fn drain_after_enqueue(&self, dialer: Dialer, agent_id: &str) {
        *self.on_enqueue.lock().await = Some((dialer, agent_id.to_string()));
    }
}

#[async_trait]
impl DialerStore for ScriptedStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError> {
        self.inner.insert_contact(contact).await
    }

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, StoreError> {
        self.inner.get_contact(id).await
    }

    async fn claim_pending_contacts(
        &self,
        campaign_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        self.inner.claim_pending_contacts(campaign_id, limit).await
    }

    async fn set_contact_status(
        &self,
        id: Uuid,
        status: ContactStatus,
    ) -> Result<(), StoreError> {
        self.inner.set_contact_status(id, status).await
    }

    async fn insert_call(&self, call: &Call) -> Result<(), StoreError> {
        if self.fail_next_insert_call.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Corrupt("connection reset".into()));
        }
        self.inner.insert_call(call).await
    }

    async fn get_call(&self, sid: &str) -> Result<Option<Call>, StoreError> {
        self.inner.get_call(sid).await
    }

    async fn advance_call_status(
        &self,
        sid: &str,
        status: CallStatus,
        duration_secs: Option<i32>,
    ) -> Result<Option<Call>, StoreError> {
        self.inner.advance_call_status(sid, status, duration_secs).await
    }

    async fn settle_answer(
        &self,
        sid: &str,
        answered_by: AnsweredBy,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        self.inner
            .settle_answer(sid, answered_by, disposition, agent_id)
            .await
    }

    async fn record_disposition(
        &self,
        sid: &str,
        answered_by: Option<AnsweredBy>,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError> {
        self.inner
            .record_disposition(sid, answered_by, disposition, agent_id)
            .await
    }

    async fn set_agent_presence(
        &self,
        id: &str,
        identity: &str,
        name: Option<&str>,
        status: AgentStatus,
    ) -> Result<Option<Agent>, StoreError> {
        self.inner.set_agent_presence(id, identity, name, status).await
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        self.inner.get_agent(id).await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.inner.list_agents().await
    }

    async fn count_available_agents(&self) -> Result<usize, StoreError> {
        self.inner.count_available_agents().await
    }

    async fn claim_available_agent(&self, call_sid: &str) -> Result<Option<Agent>, StoreError> {
        self.inner.claim_available_agent(call_sid).await
    }

    async fn release_agent(&self, agent_id: &str, call_sid: &str) -> Result<bool, StoreError> {
        self.inner.release_agent(agent_id, call_sid).await
    }

    async fn enqueue_call(&self, call_sid: &str) -> Result<(), StoreError> {
        self.inner.enqueue_call(call_sid).await?;

        let hook = self.on_enqueue.lock().await.take();
        if let Some((dialer, agent_id)) = hook {
            self.inner
                .set_agent_presence(&agent_id, &agent_id, None, AgentStatus::Available)
                .await?;
            dialer
                .drain_queue()
                .await
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        }
        Ok(())
    }

    async fn requeue_front(&self, entry: &QueuedCall) -> Result<(), StoreError> {
        self.inner.requeue_front(entry).await
    }

    async fn dequeue_call(&self) -> Result<Option<QueuedCall>, StoreError> {
        self.inner.dequeue_call().await
    }

    async fn remove_queued(&self, call_sid: &str) -> Result<bool, StoreError> {
        self.inner.remove_queued(call_sid).await
    }

    async fn list_queue(&self) -> Result<Vec<QueuedCall>, StoreError> {
        self.inner.list_queue().await
    }
}
