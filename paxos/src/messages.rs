//! Paxos wire messages
//!
//! Every frame on the wire carries a fixed header (sender, kind, payload
//! size) and a payload of (proposal number, tagged value), regardless of
//! message kind. The meaning of the payload fields depends on the kind:
//! a `Promise` carries the acceptor's accepted proposal and value, an
//! `Accepted` carries the acceptor's current minimum proposal and `Nil`.

use std::fmt;

/// Peer identity, assigned from hostfile order (1-based).
pub type PeerId = i64;

/// Proposal number, totally ordered by numeric value.
pub type ProposalNumber = i64;

/// Message kinds carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Phase 1a: proposer asks acceptors to promise.
    Prepare,
    /// Phase 1b: acceptor's reply, carrying its accepted (proposal, value).
    Promise,
    /// Phase 2a: proposer asks acceptors to accept a value.
    Accept,
    /// Phase 2b: acceptor's reply, carrying its current minimum proposal.
    Accepted,
}

impl MessageKind {
    /// Parse a raw wire discriminant. Unknown discriminants yield `None`
    /// so the dispatcher can drop them without tearing the connection down.
    #[must_use]
    pub fn from_wire(kind: i64) -> Option<Self> {
        match kind {
            1 => Some(Self::Prepare),
            2 => Some(Self::Promise),
            3 => Some(Self::Accept),
            4 => Some(Self::Accepted),
            _ => None,
        }
    }

    /// The wire discriminant for this kind.
    #[must_use]
    pub fn wire(self) -> i64 {
        match self {
            Self::Prepare => 1,
            Self::Promise => 2,
            Self::Accept => 3,
            Self::Accepted => 4,
        }
    }
}

/// A dynamically typed protocol value.
///
/// `Nil` is itself a value (the wire always carries a tag), distinct from a
/// missing payload. Operator-supplied values enter the protocol as `Utf8`;
/// the other variants exist for wire completeness.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Value {
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("<nil>"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

/// The payload every message carries: a proposal number and a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub proposal: ProposalNumber,
    pub value: Value,
}

/// One framed protocol message.
///
/// `kind` is kept as the raw wire discriminant: frames with an unknown kind
/// must survive decoding so the dispatcher can log and drop them.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: PeerId,
    pub kind: i64,
    pub payload: Payload,
}

impl Message {
    #[must_use]
    pub fn new(sender: PeerId, kind: MessageKind, proposal: ProposalNumber, value: Value) -> Self {
        Self {
            sender,
            kind: kind.wire(),
            payload: Payload { proposal, value },
        }
    }

    /// The parsed kind, or `None` for an unknown discriminant.
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_wire(self.kind)
    }
}
