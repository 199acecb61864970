//! Inbound message dispatcher.
//!
//! Routes each inbound message to the queue for its kind — no business
//! logic. Emits the `received` oracle event on the way through.

use decree_paxos::{Message, MessageKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::EventLog;

/// The four per-kind queues.
pub struct Queues {
    pub prepare: mpsc::Sender<Message>,
    pub promise: mpsc::Sender<Message>,
    pub accept: mpsc::Sender<Message>,
    pub accepted: mpsc::Sender<Message>,
}

/// Run until the inbound channel closes. Messages with an unknown kind are
/// dropped with a log line; wire-level garbage never panics. A queue whose
/// consumer is gone (e.g. promises arriving at a host with no proposer)
/// also just drops the message.
pub async fn run(mut inbound: mpsc::Receiver<Message>, queues: Queues, events: EventLog) {
    while let Some(message) = inbound.recv().await {
        let Some(kind) = message.kind() else {
            warn!(
                kind = message.kind,
                sender = message.sender,
                "dropping message of unknown kind"
            );
            continue;
        };

        events.received(message.sender, kind, &message.payload);

        let queue = match kind {
            MessageKind::Prepare => &queues.prepare,
            MessageKind::Promise => &queues.promise,
            MessageKind::Accept => &queues.accept,
            MessageKind::Accepted => &queues.accepted,
        };
        if queue.send(message).await.is_err() {
            debug!(?kind, "no consumer for queue, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decree_paxos::{Payload, Value};

    fn queues() -> (
        Queues,
        mpsc::Receiver<Message>,
        mpsc::Receiver<Message>,
        mpsc::Receiver<Message>,
        mpsc::Receiver<Message>,
    ) {
        let (prepare, prepare_rx) = mpsc::channel(8);
        let (promise, promise_rx) = mpsc::channel(8);
        let (accept, accept_rx) = mpsc::channel(8);
        let (accepted, accepted_rx) = mpsc::channel(8);
        (
            Queues {
                prepare,
                promise,
                accept,
                accepted,
            },
            prepare_rx,
            promise_rx,
            accept_rx,
            accepted_rx,
        )
    }

    #[tokio::test]
    async fn routes_by_kind_in_arrival_order() {
        let (queues, mut prepare_rx, mut promise_rx, mut accept_rx, mut accepted_rx) = queues();
        let (events, _) = EventLog::capture();
        let (tx, rx) = mpsc::channel(8);

        for (kind, proposal) in [
            (MessageKind::Prepare, 1),
            (MessageKind::Promise, 2),
            (MessageKind::Accept, 3),
            (MessageKind::Accepted, 4),
            (MessageKind::Prepare, 5),
        ] {
            tx.send(Message::new(9, kind, proposal, Value::Nil))
                .await
                .unwrap();
        }
        drop(tx);
        run(rx, queues, events).await;

        assert_eq!(prepare_rx.recv().await.unwrap().payload.proposal, 1);
        assert_eq!(prepare_rx.recv().await.unwrap().payload.proposal, 5);
        assert_eq!(promise_rx.recv().await.unwrap().payload.proposal, 2);
        assert_eq!(accept_rx.recv().await.unwrap().payload.proposal, 3);
        assert_eq!(accepted_rx.recv().await.unwrap().payload.proposal, 4);
    }

    #[tokio::test]
    async fn unknown_kind_is_dropped_without_an_event() {
        let (queues, mut prepare_rx, _promise_rx, _accept_rx, _accepted_rx) = queues();
        let (events, buffer) = EventLog::capture();
        let (tx, rx) = mpsc::channel(8);

        tx.send(Message {
            sender: 2,
            kind: 42,
            payload: Payload::default(),
        })
        .await
        .unwrap();
        tx.send(Message::new(2, MessageKind::Prepare, 1, Value::Nil))
            .await
            .unwrap();
        drop(tx);
        run(rx, queues, events).await;

        // Only the valid message got through and only it was logged.
        assert_eq!(prepare_rx.recv().await.unwrap().payload.proposal, 1);
        assert!(prepare_rx.recv().await.is_none());
        let captured = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(captured.lines().count(), 1);
    }

    #[tokio::test]
    async fn missing_consumer_does_not_stop_dispatch() {
        let (queues, mut prepare_rx, promise_rx, _accept_rx, _accepted_rx) = queues();
        drop(promise_rx);
        let (events, _) = EventLog::capture();
        let (tx, rx) = mpsc::channel(8);

        tx.send(Message::new(1, MessageKind::Promise, 1, Value::Nil))
            .await
            .unwrap();
        tx.send(Message::new(1, MessageKind::Prepare, 2, Value::Nil))
            .await
            .unwrap();
        drop(tx);
        run(rx, queues, events).await;

        assert_eq!(prepare_rx.recv().await.unwrap().payload.proposal, 2);
    }
}
