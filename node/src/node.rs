//! Node bootstrap.
//!
//! Wires topology, transport, dispatcher, and engines into a running peer:
//! listener first (so peers can reach us while we dial them), then outgoing
//! connections (blocking until every peer is up), then the engines and the
//! delayed start trigger.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use decree_paxos::{Acceptor, Message, Proposer, SharedAcceptorState, Value};
use error_stack::{Report, ResultExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::dispatch::{self, Queues};
use crate::error::{ConfigError, TaskError};
use crate::events::EventLog;
use crate::runner;
use crate::topology::Topology;
use crate::transport::{self, DEFAULT_PORT, Transport};

const INBOUND_DEPTH: usize = 256;
const QUEUE_DEPTH: usize = 64;

pub struct NodeConfig {
    pub topology: Topology,
    /// This process's hostname; must match exactly one hostfile entry.
    pub hostname: String,
    /// Value to propose, required iff the host runs a proposer role.
    pub value: Option<String>,
    /// Delay between connection establishment and the first proposal.
    pub wait: Duration,
    /// Local listen address.
    pub listen: SocketAddr,
    /// Port remote peers listen on.
    pub port: u16,
    pub events: EventLog,
}

impl NodeConfig {
    #[must_use]
    pub fn new(topology: Topology, hostname: String, value: Option<String>, wait: Duration) -> Self {
        Self {
            topology,
            hostname,
            value,
            wait,
            listen: (Ipv4Addr::UNSPECIFIED, DEFAULT_PORT).into(),
            port: DEFAULT_PORT,
            events: EventLog::stdout(),
        }
    }
}

/// A running peer.
#[derive(Debug)]
pub struct Node {
    /// Resolves to the chosen value once a local proposer's decree
    /// completes. Stays `None` forever on acceptor-only hosts.
    pub chosen: watch::Receiver<Option<Value>>,
    /// Every long-running task. The process is expected to join these
    /// forever; the first failure is fatal.
    pub tasks: JoinSet<Result<(), TaskError>>,
}

/// Boot a peer from its configuration. Returns once all outgoing
/// connections are established and every engine is running.
///
/// # Errors
///
/// All [`ConfigError`] conditions are detected here, before any protocol
/// traffic: unknown hostname, missing proposer value, empty quorum, and an
/// unbindable listen socket.
pub async fn start(config: NodeConfig) -> Result<Node, Report<ConfigError>> {
    let NodeConfig {
        topology,
        hostname,
        value,
        wait,
        listen,
        port,
        events,
    } = config;

    let self_id = topology.peer_for_hostname(&hostname).ok_or_else(|| {
        Report::new(ConfigError::UnknownHost)
            .attach_printable(format!("hostname {hostname:?} has no hostfile entry"))
    })?;
    let local = topology
        .entry(self_id)
        .cloned()
        .unwrap_or_default();

    let proposer_value = if local.proposers.is_empty() {
        None
    } else {
        let value = value.ok_or_else(|| {
            Report::new(ConfigError::MissingValue)
                .attach_printable(format!("host {hostname:?} declares a proposer role"))
        })?;
        Some(Value::Utf8(value))
    };

    let quorum = topology.acceptor_quorum(self_id);
    if proposer_value.is_some() && quorum.is_empty() {
        return Err(Report::new(ConfigError::EmptyQuorum)
            .attach_printable("no other host declares an active acceptor role"));
    }

    let mut tasks: JoinSet<Result<(), TaskError>> = JoinSet::new();
    let state = SharedAcceptorState::new();

    // Bind before dialing: every peer must be reachable while it waits for
    // its own outgoing connections.
    let listener = TcpListener::bind(listen)
        .await
        .change_context(ConfigError::Listen)
        .attach_printable_lazy(|| format!("binding {listen}"))?;
    info!(self_id, %listen, "listening");

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_DEPTH);
    tasks.spawn(async move {
        transport::listen(listener, inbound_tx)
            .await
            .map_err(TaskError::Io)
    });

    let peers: BTreeMap<_, _> = topology
        .remote_peers(self_id)
        .map(|(id, entry)| (id, entry.hostname.clone()))
        .collect();
    let transport = Arc::new(Transport::connect(self_id, peers, port, events.clone()).await);

    let (prepare_tx, prepare_rx) = mpsc::channel(QUEUE_DEPTH);
    let (promise_tx, promise_rx) = mpsc::channel(QUEUE_DEPTH);
    let (accept_tx, accept_rx) = mpsc::channel(QUEUE_DEPTH);
    let (accepted_tx, accepted_rx) = mpsc::channel(QUEUE_DEPTH);
    let dispatcher_events = events.clone();
    tasks.spawn(async move {
        dispatch::run(
            inbound_rx,
            Queues {
                prepare: prepare_tx,
                promise: promise_tx,
                accept: accept_tx,
                accepted: accepted_tx,
            },
            dispatcher_events,
        )
        .await;
        Ok(())
    });

    // One acceptor per process, whatever the declared role count.
    let acceptor = Acceptor::new(self_id, state.clone());
    let acceptor_transport = transport.clone();
    tasks.spawn(async move {
        runner::run_acceptor(acceptor, acceptor_transport, prepare_rx, accept_rx)
            .await
            .map_err(TaskError::from)
    });

    let (chosen_tx, chosen_rx) = watch::channel(None);
    let mut starts = Vec::new();
    if let Some(value) = proposer_value {
        let (promise_rxs, accepted_rxs) =
            split_replies(&mut tasks, local.proposers.len(), promise_rx, accepted_rx);
        for ((seed, promise_rx), accepted_rx) in local
            .proposers
            .iter()
            .zip(promise_rxs)
            .zip(accepted_rxs)
        {
            debug!(self_id, seed, ?quorum, "starting proposer");
            let (start_tx, start_rx) = mpsc::channel(1);
            starts.push(start_tx.clone());
            let proposer =
                Proposer::new(self_id, *seed, value.clone(), quorum.clone(), state.clone());
            let proposer_transport = transport.clone();
            let proposer_events = events.clone();
            let proposer_chosen = chosen_tx.clone();
            tasks.spawn(async move {
                runner::run_proposer(
                    proposer,
                    proposer_transport,
                    proposer_events,
                    start_tx,
                    start_rx,
                    promise_rx,
                    accepted_rx,
                    proposer_chosen,
                )
                .await
                .map_err(TaskError::from)
            });
        }
    }

    if !starts.is_empty() {
        tasks.spawn(async move {
            tokio::time::sleep(wait).await;
            info!("firing start signal");
            for start in starts {
                let _ = start.send(()).await;
            }
            Ok(())
        });
    }

    Ok(Node {
        chosen: chosen_rx,
        tasks,
    })
}

/// Hand the promise/accepted queues to the proposers: directly when there
/// is one, through cloning forwarders when the topology declares several.
fn split_replies(
    tasks: &mut JoinSet<Result<(), TaskError>>,
    proposers: usize,
    promise_rx: mpsc::Receiver<Message>,
    accepted_rx: mpsc::Receiver<Message>,
) -> (Vec<mpsc::Receiver<Message>>, Vec<mpsc::Receiver<Message>>) {
    if proposers <= 1 {
        return (vec![promise_rx], vec![accepted_rx]);
    }
    (
        fan_out(tasks, proposers, promise_rx),
        fan_out(tasks, proposers, accepted_rx),
    )
}

fn fan_out(
    tasks: &mut JoinSet<Result<(), TaskError>>,
    consumers: usize,
    mut rx: mpsc::Receiver<Message>,
) -> Vec<mpsc::Receiver<Message>> {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..consumers).map(|_| mpsc::channel(QUEUE_DEPTH)).unzip();
    tasks.spawn(async move {
        while let Some(message) = rx.recv().await {
            for sender in &senders {
                let _ = sender.send(message.clone()).await;
            }
        }
        Ok(())
    });
    receivers
}
