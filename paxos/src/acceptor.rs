//! Acceptor driver.
//!
//! One per process, regardless of how many acceptor roles the topology
//! declares for the host. Sans-IO: each handler consumes an inbound message
//! and returns the reply to send.

use crate::messages::{Message, MessageKind, PeerId};
use crate::state::SharedAcceptorState;

pub struct Acceptor {
    id: PeerId,
    state: SharedAcceptorState,
}

impl Acceptor {
    #[must_use]
    pub fn new(id: PeerId, state: SharedAcceptorState) -> Self {
        Self { id, state }
    }

    /// Handle a Prepare: reply with a Promise carrying the accepted
    /// (proposal, value) pair. A Promise is sent for every Prepare, even a
    /// stale one.
    #[must_use]
    pub fn receive_prepare(&self, message: &Message) -> (PeerId, Message) {
        let reply = self.state.prepare(message.payload.proposal);
        (
            message.sender,
            Message::new(self.id, MessageKind::Promise, reply.proposal, reply.value),
        )
    }

    /// Handle an Accept: reply with an Accepted carrying the current
    /// minimum proposal (and always a `Nil` value).
    #[must_use]
    pub fn receive_accept(&self, message: &Message) -> (PeerId, Message) {
        let reply = self
            .state
            .accept(message.payload.proposal, message.payload.value.clone());
        (
            message.sender,
            Message::new(self.id, MessageKind::Accepted, reply.proposal, reply.value),
        )
    }
}
