//! Predictive dialer state machine.
//!
//! A call moves through three hands:
//!
//! 1. [`Dialer::start_dialing`] claims pending contacts and places calls.
//! 2. [`Dialer::handle_answer`] receives the machine detection verdict and
//!    bridges a human to an agent, queues it, or drops a voicemail.
//! 3. [`Dialer::handle_status`] follows provider lifecycle callbacks and
//!    frees the agent when the call ends.
//!
//! Agents come and go through [`Dialer::update_presence`]. Whenever an agent
//! may have been freed, [`Dialer::drain_queue`] pairs waiting callers with
//! available agents.

pub mod agents;
pub mod dispatcher;
pub mod machine;
pub mod model;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::DialerConfig;
use crate::events::EventPublisher;
use crate::store::DialerStore;
use crate::twilio::outbound::Telephony;

#[derive(Clone)]
pub struct Dialer {
    store: Arc<dyn DialerStore>,
    telephony: Arc<dyn Telephony>,
    events: Arc<dyn EventPublisher>,
    config: DialerConfig,
}

impl Dialer {
    pub fn new(
        store: Arc<dyn DialerStore>,
        telephony: Arc<dyn Telephony>,
        events: Arc<dyn EventPublisher>,
        config: DialerConfig,
    ) -> Self {
        Self {
            store,
            telephony,
            events,
            config,
        }
    }

    pub fn store(&self) -> &dyn DialerStore {
        self.store.as_ref()
    }
}
