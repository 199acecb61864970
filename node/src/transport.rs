//! TCP transport.
//!
//! Inbound and outbound use independent connections: every peer dials every
//! other peer once for its outgoing frames and accepts one connection per
//! remote for incoming frames, so a process holds up to 2·(N−1) sockets.
//! This keeps framing one-directional per socket.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use decree_paxos::{FrameCodec, Message, PeerId};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::events::EventLog;

/// The port every peer listens on.
pub const DEFAULT_PORT: u16 = 8888;

/// Delay between dial attempts while a peer is unreachable.
const DIAL_RETRY: Duration = Duration::from_millis(500);

/// Outgoing side: one framed writer per remote peer, established during
/// bootstrap and read-only afterwards.
pub struct Transport {
    self_id: PeerId,
    events: EventLog,
    writers: BTreeMap<PeerId, Mutex<FramedWrite<TcpStream, FrameCodec>>>,
}

impl Transport {
    /// Dial every peer in parallel until each connection is established.
    /// A failed dial sleeps 500 ms and tries again, indefinitely: peers are
    /// expected to come up eventually, and there is nothing useful to do
    /// before they all have.
    pub async fn connect(
        self_id: PeerId,
        peers: BTreeMap<PeerId, String>,
        port: u16,
        events: EventLog,
    ) -> Self {
        let mut dials = JoinSet::new();
        for (peer, host) in peers {
            dials.spawn(async move {
                let addr = format!("{host}:{port}");
                loop {
                    match TcpStream::connect(&addr).await {
                        Ok(stream) => {
                            debug!(peer, %addr, "connected");
                            return (peer, stream);
                        }
                        Err(error) => {
                            trace!(peer, %addr, %error, "dial failed, retrying");
                            tokio::time::sleep(DIAL_RETRY).await;
                        }
                    }
                }
            });
        }

        let mut writers = BTreeMap::new();
        while let Some(dialed) = dials.join_next().await {
            let (peer, stream) = dialed.expect("dial tasks do not panic");
            writers.insert(peer, Mutex::new(FramedWrite::new(stream, FrameCodec)));
        }
        info!(self_id, peers = writers.len(), "all outgoing connections established");

        Self {
            self_id,
            events,
            writers,
        }
    }

    #[must_use]
    pub fn self_id(&self) -> PeerId {
        self.self_id
    }

    /// Write one message to `target`'s outgoing stream and emit the `sent`
    /// oracle event.
    ///
    /// # Errors
    ///
    /// A missing connection or a failed write is a [`TransportError`]; both
    /// indicate misconfiguration or partition and are fatal to the process.
    pub async fn send(&self, target: PeerId, message: Message) -> Result<(), TransportError> {
        let Some(writer) = self.writers.get(&target) else {
            return Err(TransportError::NoConnection(target));
        };
        let kind = message.kind();
        let payload = message.payload.clone();

        writer
            .lock()
            .await
            .send(message)
            .await
            .map_err(|source| TransportError::Send {
                peer: target,
                source,
            })?;

        if let Some(kind) = kind {
            self.events.sent(self.self_id, kind, &payload);
        }
        Ok(())
    }
}

/// Accept inbound connections forever. Each connection gets its own reader
/// task framing messages onto `inbound`; a decode failure or peer close
/// drops that connection without affecting the others.
pub async fn listen(listener: TcpListener, inbound: mpsc::Sender<Message>) -> io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        debug!(%peer_addr, "accepted connection");
        let inbound = inbound.clone();
        tokio::spawn(async move {
            let mut frames = FramedRead::new(stream, FrameCodec);
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        warn!(%peer_addr, %error, "dropping connection");
                        return;
                    }
                }
            }
            debug!(%peer_addr, "peer closed connection");
        });
    }
}
