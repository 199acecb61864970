//! Engine run loops.
//!
//! Thin async shells around the sans-IO drivers: receive from the per-kind
//! queues, hand the message to the driver, send whatever it returns.

use std::sync::Arc;

use decree_paxos::{Acceptor, Message, ProposeResult, Proposer, Value};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, trace};

use crate::error::TransportError;
use crate::events::EventLog;
use crate::transport::Transport;

/// Serve Prepare and Accept requests until both queues close. The two
/// queues are polled fairly; order within each queue is preserved.
///
/// # Errors
///
/// Fails when a reply cannot be sent; transport failures are fatal.
#[instrument(skip_all, name = "acceptor", fields(id = transport.self_id()))]
pub async fn run_acceptor(
    acceptor: Acceptor,
    transport: Arc<Transport>,
    mut prepare_rx: mpsc::Receiver<Message>,
    mut accept_rx: mpsc::Receiver<Message>,
) -> Result<(), TransportError> {
    debug!("acceptor started");
    loop {
        select! {
            message = prepare_rx.recv() => {
                let Some(message) = message else { return Ok(()) };
                trace!(sender = message.sender, proposal = message.payload.proposal, "prepare");
                let (target, reply) = acceptor.receive_prepare(&message);
                transport.send(target, reply).await?;
            }
            message = accept_rx.recv() => {
                let Some(message) = message else { return Ok(()) };
                trace!(sender = message.sender, proposal = message.payload.proposal, "accept");
                let (target, reply) = acceptor.receive_accept(&message);
                transport.send(target, reply).await?;
            }
        }
    }
}

/// Drive one proposer until its queues close.
///
/// The start channel doubles as the retry signal: phase C requeues a start
/// on preemption. It is buffered (depth 1), and a full buffer means a start
/// is already pending, which subsumes the retry.
///
/// # Errors
///
/// Fails when an outbound message cannot be sent.
#[instrument(skip_all, name = "proposer", fields(id = transport.self_id()))]
#[allow(clippy::too_many_arguments)]
pub async fn run_proposer(
    mut proposer: Proposer,
    transport: Arc<Transport>,
    events: EventLog,
    start_tx: mpsc::Sender<()>,
    mut start_rx: mpsc::Receiver<()>,
    mut promise_rx: mpsc::Receiver<Message>,
    mut accepted_rx: mpsc::Receiver<Message>,
    chosen_tx: watch::Sender<Option<Value>>,
) -> Result<(), TransportError> {
    debug!("proposer started");
    loop {
        select! {
            signal = start_rx.recv() => {
                if signal.is_none() {
                    return Ok(());
                }
                let burst = proposer.start_round();
                debug!(proposal = proposer.proposal_number(), "starting proposal round");
                for (target, message) in burst {
                    transport.send(target, message).await?;
                }
            }
            message = promise_rx.recv() => {
                let Some(message) = message else { return Ok(()) };
                trace!(sender = message.sender, proposal = message.payload.proposal, "promise");
                for (target, reply) in proposer.receive_promise(&message) {
                    transport.send(target, reply).await?;
                }
            }
            message = accepted_rx.recv() => {
                let Some(message) = message else { return Ok(()) };
                trace!(sender = message.sender, proposal = message.payload.proposal, "accepted");
                match proposer.receive_accepted(&message) {
                    ProposeResult::Pending => {}
                    ProposeResult::Chosen { value, proposal } => {
                        debug!(%value, proposal, "value chosen");
                        events.chose(transport.self_id(), &value, proposal);
                        let _ = chosen_tx.send(Some(value));
                    }
                    ProposeResult::Retry => {
                        debug!(proposal = proposer.proposal_number(), "preempted, retrying");
                        if start_tx.try_send(()).is_err() {
                            trace!("start already queued, retry subsumed");
                        }
                    }
                }
            }
        }
    }
}
