//! Error types for node configuration and transport.

use std::fmt;
use std::io;

use decree_paxos::{PeerId, WireError};

/// Startup configuration failures. Fatal; reported as
/// `error_stack::Report<ConfigError>` with the offending detail attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Malformed hostfile line or role token.
    Hostfile,
    /// The process hostname does not appear in the hostfile.
    UnknownHost,
    /// The host declares a proposer role but no value was supplied.
    MissingValue,
    /// A proposer role has no acceptor-hosting peers to form a quorum.
    EmptyQuorum,
    /// The listen socket could not be bound.
    Listen,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostfile => f.write_str("malformed hostfile"),
            Self::UnknownHost => f.write_str("hostname not present in the hostfile"),
            Self::MissingValue => f.write_str("a proposer role requires a value (-v)"),
            Self::EmptyQuorum => f.write_str("proposer has no acceptor quorum"),
            Self::Listen => f.write_str("failed to bind the listen socket"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Outgoing transport failures. Both variants indicate a partition or a
/// configuration defect, and both are fatal to the process.
#[derive(Debug)]
pub enum TransportError {
    /// No established connection for the target peer.
    NoConnection(PeerId),
    /// Writing to an established connection failed.
    Send { peer: PeerId, source: WireError },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConnection(peer) => write!(f, "no connection for peer {peer}"),
            Self::Send { peer, source } => write!(f, "failed to send to peer {peer}: {source}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoConnection(_) => None,
            Self::Send { source, .. } => Some(source),
        }
    }
}

/// Failure of one of the node's long-running tasks.
#[derive(Debug)]
pub enum TaskError {
    Transport(TransportError),
    Io(io::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport failure: {e}"),
            Self::Io(e) => write!(f, "io failure: {e}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<TransportError> for TaskError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<io::Error> for TaskError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Marker context for the binary's top-level report.
#[derive(Debug)]
pub struct NodeError;

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("node terminated abnormally")
    }
}

impl std::error::Error for NodeError {}
