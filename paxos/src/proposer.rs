//! Push-based Paxos proposer.
//!
//! Sans-IO, in the same shape as the acceptor driver: the caller feeds in
//! the start signal and inbound replies, and gets back the messages to
//! send. The caller owns timing — when to fire the first round and when to
//! act on [`ProposeResult::Retry`].
//!
//! The proposer shares the process-wide [`SharedAcceptorState`]: its own
//! prepares and accepts are published there directly instead of being sent
//! to itself over the wire, and quorum members equal to the proposer's own
//! id are accounted as implicit votes.

use crate::messages::{Message, MessageKind, PeerId, ProposalNumber, Value};
use crate::state::SharedAcceptorState;

/// Result of feeding an Accepted reply to the proposer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposeResult {
    /// Still waiting on the rest of the quorum.
    Pending,
    /// The decree is chosen: a full quorum accepted and nobody reported a
    /// higher proposal.
    Chosen {
        value: Value,
        proposal: ProposalNumber,
    },
    /// Preempted by a higher proposal; the caller should start a new round.
    Retry,
}

pub struct Proposer {
    id: PeerId,
    /// Current proposal number; seeded from the topology role number and
    /// incremented before each Prepare burst.
    proposal_number: ProposalNumber,
    /// Highest proposal observed in any Promise or Accepted reply.
    min_proposal_seen: ProposalNumber,
    /// Value to propose.
    value: Value,
    /// Highest-numbered previously accepted (proposal, value) reported by a
    /// Promise in the current round, if any.
    adopted: Option<(ProposalNumber, Value)>,
    quorum: Vec<PeerId>,
    promise_count: usize,
    accept_count: usize,
    state: SharedAcceptorState,
}

impl Proposer {
    #[must_use]
    pub fn new(
        id: PeerId,
        seed: ProposalNumber,
        value: Value,
        quorum: Vec<PeerId>,
        state: SharedAcceptorState,
    ) -> Self {
        Self {
            id,
            proposal_number: seed,
            min_proposal_seen: 0,
            value,
            adopted: None,
            quorum,
            promise_count: 0,
            accept_count: 0,
            state,
        }
    }

    #[must_use]
    pub fn proposal_number(&self) -> ProposalNumber {
        self.proposal_number
    }

    /// Start a proposal round: pick a proposal number above everything seen
    /// so far, publish it to the local acceptor state, and return the
    /// Prepare burst for the quorum.
    pub fn start_round(&mut self) -> Vec<(PeerId, Message)> {
        if self.min_proposal_seen > self.proposal_number {
            self.proposal_number = self.min_proposal_seen;
        }
        if let Some((_, value)) = self.adopted.take() {
            self.value = value;
        }
        self.promise_count = 0;
        self.proposal_number += 1;

        self.state.publish_min_proposal(self.proposal_number);

        let mut burst = Vec::with_capacity(self.quorum.len());
        for &peer in &self.quorum {
            if peer == self.id {
                self.promise_count += 1;
            } else {
                burst.push((
                    peer,
                    Message::new(
                        self.id,
                        MessageKind::Prepare,
                        self.proposal_number,
                        self.value.clone(),
                    ),
                ));
            }
        }
        burst
    }

    /// Feed in a Promise reply. Returns the messages to send: nothing until
    /// the quorum completes, then the Accept burst. Completing the quorum
    /// also publishes the self-accept into the local acceptor state.
    pub fn receive_promise(&mut self, message: &Message) -> Vec<(PeerId, Message)> {
        let payload = &message.payload;
        self.promise_count += 1;
        if payload.proposal > self.min_proposal_seen {
            self.min_proposal_seen = payload.proposal;
        }
        if !payload.value.is_nil()
            && self
                .adopted
                .as_ref()
                .is_none_or(|(prior, _)| payload.proposal > *prior)
        {
            // Adopt the value of the highest-numbered accepted proposal
            // reported so far, not merely the last one observed.
            self.adopted = Some((payload.proposal, payload.value.clone()));
        }
        self.accept_count = 0;

        if self.promise_count != self.quorum.len() {
            return Vec::new();
        }

        if let Some((_, value)) = &self.adopted {
            self.value = value.clone();
        }
        self.state
            .publish_accepted(self.proposal_number, self.value.clone());

        let mut burst = Vec::with_capacity(self.quorum.len());
        for &peer in &self.quorum {
            if peer == self.id {
                self.accept_count += 1;
            } else {
                burst.push((
                    peer,
                    Message::new(
                        self.id,
                        MessageKind::Accept,
                        self.proposal_number,
                        self.value.clone(),
                    ),
                ));
            }
        }
        burst
    }

    /// Feed in an Accepted reply. On the final reply of the round the
    /// decree is either chosen, or the round was preempted and the caller
    /// should retry.
    pub fn receive_accepted(&mut self, message: &Message) -> ProposeResult {
        let payload = &message.payload;
        self.accept_count += 1;
        if payload.proposal > self.min_proposal_seen {
            self.min_proposal_seen = payload.proposal;
        }

        if self.accept_count != self.quorum.len() {
            return ProposeResult::Pending;
        }

        if self.min_proposal_seen <= self.proposal_number {
            // The chosen value is read from the local acceptor state, where
            // the accept phase published it.
            ProposeResult::Chosen {
                value: self.state.accepted_value(),
                proposal: payload.proposal,
            }
        } else {
            ProposeResult::Retry
        }
    }
}
