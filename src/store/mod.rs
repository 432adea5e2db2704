//! Persistence for contacts, calls, agents and the wait queue.
//!
//! Every operation that two webhooks can race on (claiming contacts, claiming
//! an agent, advancing a call's status, popping the queue) is a single atomic
//! store call, so handlers never read-modify-write shared rows themselves.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::dialer::model::{
    Agent, AgentStatus, AnsweredBy, Call, CallStatus, Contact, ContactStatus, Disposition,
    QueuedCall,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait DialerStore: Send + Sync {
    async fn insert_contact(&self, contact: &Contact) -> Result<(), StoreError>;

    async fn get_contact(&self, id: Uuid) -> Result<Option<Contact>, StoreError>;

    /// Move up to `limit` pending contacts to `Dialing`, oldest first, bumping
    /// their attempt counter. Contacts claimed here are invisible to other callers.
    async fn claim_pending_contacts(
        &self,
        campaign_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError>;

    async fn set_contact_status(&self, id: Uuid, status: ContactStatus)
        -> Result<(), StoreError>;

    async fn insert_call(&self, call: &Call) -> Result<(), StoreError>;

    async fn get_call(&self, sid: &str) -> Result<Option<Call>, StoreError>;

    /// Apply `status` only if it moves the call forward in its lifecycle.
    /// Returns the updated call, or `None` if the call is unknown or the
    /// update was stale.
    async fn advance_call_status(
        &self,
        sid: &str,
        status: CallStatus,
        duration_secs: Option<i32>,
    ) -> Result<Option<Call>, StoreError>;

    /// Decide an answered call exactly once. Applies only while the call is
    /// live and its disposition is still `Pending`; returns `None` otherwise.
    async fn settle_answer(
        &self,
        sid: &str,
        answered_by: AnsweredBy,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError>;

    /// Record what was done with an answered call.
    async fn record_disposition(
        &self,
        sid: &str,
        answered_by: Option<AnsweredBy>,
        disposition: Disposition,
        agent_id: Option<&str>,
    ) -> Result<Option<Call>, StoreError>;

    /// Register or update an agent's presence. Returns `None` when the agent
    /// is bridged to a live call and `status` is not `Busy`.
    async fn set_agent_presence(
        &self,
        id: &str,
        identity: &str,
        name: Option<&str>,
        status: AgentStatus,
    ) -> Result<Option<Agent>, StoreError>;

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, StoreError>;

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;

    async fn count_available_agents(&self) -> Result<usize, StoreError>;

    /// Flip the longest-idle available agent to `Busy` on `call_sid`.
    async fn claim_available_agent(&self, call_sid: &str) -> Result<Option<Agent>, StoreError>;

    /// Return an agent to `Available`, but only if it is still on `call_sid`.
    async fn release_agent(&self, agent_id: &str, call_sid: &str) -> Result<bool, StoreError>;

    async fn enqueue_call(&self, call_sid: &str) -> Result<(), StoreError>;

    /// Put a previously dequeued call back at the head of the queue.
    async fn requeue_front(&self, entry: &QueuedCall) -> Result<(), StoreError>;

    async fn dequeue_call(&self) -> Result<Option<QueuedCall>, StoreError>;

    async fn remove_queued(&self, call_sid: &str) -> Result<bool, StoreError>;

    async fn list_queue(&self) -> Result<Vec<QueuedCall>, StoreError>;
}
