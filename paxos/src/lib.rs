//! Single-decree Paxos consensus library
//!
//! This library provides the protocol half of a single-decree Paxos
//! deployment: the wire model and framed codec, the shared acceptor state,
//! and sans-IO proposer/acceptor drivers.
//!
//! # Architecture
//!
//! - **Proposers** drive one decree to chosen through Prepare/Accept rounds
//! - **Acceptors** maintain the promise/accept state that guarantees safety
//! - **Drivers are push-based**: callers feed inbound [`Message`]s in and
//!   send the returned messages out, so the protocol runs unmodified over
//!   TCP, in-memory channels, or a deterministic test harness
//!
//! # Quick start
//!
//! ```ignore
//! use decree_paxos::{Acceptor, ProposeResult, Proposer, SharedAcceptorState};
//!
//! let state = SharedAcceptorState::new();
//! let acceptor = Acceptor::new(my_id, state.clone());
//! let mut proposer = Proposer::new(my_id, seed, value, quorum, state);
//!
//! for (target, message) in proposer.start_round() {
//!     transport.send(target, message).await?;
//! }
//! // feed replies back via proposer.receive_promise / receive_accepted
//! ```

#![warn(clippy::pedantic)]

pub mod acceptor;
pub mod codec;
pub mod messages;
pub mod proposer;
pub mod state;

pub use acceptor::Acceptor;
pub use codec::{FrameCodec, WireError};
pub use messages::{Message, MessageKind, Payload, PeerId, ProposalNumber, Value};
pub use proposer::{ProposeResult, Proposer};
pub use state::SharedAcceptorState;
