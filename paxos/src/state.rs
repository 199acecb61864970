//! Shared acceptor state.
//!
//! One instance per process, shared between the acceptor driver and any
//! colocated proposers (a proposer publishes its own proposals here instead
//! of sending itself wire messages). A single reader-writer lock guards the
//! three fields: state transitions take the write lock atomically, getters
//! take the read lock.

use std::sync::{Arc, RwLock};

use crate::messages::{Payload, ProposalNumber, Value};

#[derive(Debug, Default)]
struct AcceptorRecord {
    /// Highest proposal ever promised or accepted. Never decreases.
    min_proposal: ProposalNumber,
    /// Proposal number of the most recent accepted value, 0 if none.
    accepted_proposal: ProposalNumber,
    /// Value of the most recent accepted proposal, `Nil` if none.
    accepted_value: Value,
}

/// Cloneable handle to the process-wide acceptor state.
#[derive(Clone, Default)]
pub struct SharedAcceptorState {
    inner: Arc<RwLock<AcceptorRecord>>,
}

impl SharedAcceptorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn min_proposal(&self) -> ProposalNumber {
        self.inner.read().unwrap().min_proposal
    }

    #[must_use]
    pub fn accepted_proposal(&self) -> ProposalNumber {
        self.inner.read().unwrap().accepted_proposal
    }

    #[must_use]
    pub fn accepted_value(&self) -> Value {
        self.inner.read().unwrap().accepted_value.clone()
    }

    /// Handle a Prepare for `proposal`: raise `min_proposal` if exceeded and
    /// return the Promise payload — the accepted (proposal, value) as they
    /// stand after the raise. Every Prepare gets a Promise; a stale one lets
    /// the proposer detect contention from the payload.
    pub fn prepare(&self, proposal: ProposalNumber) -> Payload {
        let mut record = self.inner.write().unwrap();
        if proposal > record.min_proposal {
            record.min_proposal = proposal;
        }
        Payload {
            proposal: record.accepted_proposal,
            value: record.accepted_value.clone(),
        }
    }

    /// Handle an Accept of (`proposal`, `value`): record it if `proposal`
    /// is at least `min_proposal`, and return the Accepted payload carrying
    /// the current `min_proposal` (which exceeds `proposal` if a higher
    /// Prepare intervened) and `Nil`.
    pub fn accept(&self, proposal: ProposalNumber, value: Value) -> Payload {
        let mut record = self.inner.write().unwrap();
        if proposal >= record.min_proposal {
            record.min_proposal = proposal;
            record.accepted_proposal = proposal;
            record.accepted_value = value;
        }
        Payload {
            proposal: record.min_proposal,
            value: Value::Nil,
        }
    }

    /// A colocated proposer's implicit self-Prepare. Never lowers
    /// `min_proposal`.
    pub fn publish_min_proposal(&self, proposal: ProposalNumber) {
        let mut record = self.inner.write().unwrap();
        if proposal > record.min_proposal {
            record.min_proposal = proposal;
        }
    }

    /// A colocated proposer's implicit self-Accept at the start of its
    /// Accept phase.
    pub fn publish_accepted(&self, proposal: ProposalNumber, value: Value) {
        let mut record = self.inner.write().unwrap();
        if proposal > record.min_proposal {
            record.min_proposal = proposal;
        }
        record.accepted_proposal = proposal;
        record.accepted_value = value;
    }
}
