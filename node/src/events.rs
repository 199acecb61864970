//! The observable event stream: one JSON object per line on stdout.
//!
//! This output is the primary oracle for the protocol — every message sent,
//! every message received, and the chosen value. Diagnostics go to stderr
//! via `tracing`; stdout carries nothing else.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use decree_paxos::{MessageKind, Payload, PeerId, ProposalNumber, Value};
use serde::Serialize;

/// Field order is part of the contract.
#[derive(Serialize)]
struct Event<'a> {
    peer_id: PeerId,
    action: &'a str,
    message_type: &'a str,
    message_value: String,
    proposal_num: ProposalNumber,
}

/// How each message kind is named in the event stream.
fn message_type(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Prepare => "prepare",
        MessageKind::Promise => "prepare_ack",
        MessageKind::Accept => "accept",
        MessageKind::Accepted => "accept_ack",
    }
}

#[derive(Clone)]
enum Sink {
    Stdout,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Cloneable handle for emitting oracle events.
#[derive(Clone)]
pub struct EventLog {
    sink: Sink,
}

impl EventLog {
    /// Emit to standard output (the production sink).
    #[must_use]
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// Emit into a shared buffer; tests read it back line by line.
    #[must_use]
    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sink: Sink::Buffer(buffer.clone()),
            },
            buffer,
        )
    }

    fn emit(&self, event: &Event<'_>) {
        let line = serde_json::to_string(event).expect("event serialization cannot fail");
        match &self.sink {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                let _ = writeln!(out, "{line}");
            }
            Sink::Buffer(buffer) => {
                let mut out = buffer.lock().unwrap();
                let _ = writeln!(out, "{line}");
            }
        }
    }

    /// A message of `kind` was written to the wire by this peer.
    pub fn sent(&self, peer_id: PeerId, kind: MessageKind, payload: &Payload) {
        self.emit(&Event {
            peer_id,
            action: "sent",
            message_type: message_type(kind),
            message_value: payload.value.to_string(),
            proposal_num: payload.proposal,
        });
    }

    /// A message of `kind` arrived from `sender`. Received events carry the
    /// sender's peer id, not the local one.
    pub fn received(&self, sender: PeerId, kind: MessageKind, payload: &Payload) {
        self.emit(&Event {
            peer_id: sender,
            action: "received",
            message_type: message_type(kind),
            message_value: payload.value.to_string(),
            proposal_num: payload.proposal,
        });
    }

    /// This peer observed its decree reach chosen state.
    pub fn chose(&self, peer_id: PeerId, value: &Value, proposal: ProposalNumber) {
        self.emit(&Event {
            peer_id,
            action: "chose",
            message_type: "chose",
            message_value: value.to_string(),
            proposal_num: proposal,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
        String::from_utf8(buffer.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn sent_event_shape() {
        let (log, buffer) = EventLog::capture();
        log.sent(
            1,
            MessageKind::Prepare,
            &Payload {
                proposal: 2,
                value: Value::Utf8("foo".into()),
            },
        );
        assert_eq!(
            lines(&buffer),
            vec![
                r#"{"peer_id":1,"action":"sent","message_type":"prepare","message_value":"foo","proposal_num":2}"#
            ]
        );
    }

    #[test]
    fn nil_value_renders_as_the_nil_token() {
        let (log, buffer) = EventLog::capture();
        log.sent(
            3,
            MessageKind::Accepted,
            &Payload {
                proposal: 7,
                value: Value::Nil,
            },
        );
        assert!(lines(&buffer)[0].contains(r#""message_value":"<nil>""#));
        assert!(lines(&buffer)[0].contains(r#""message_type":"accept_ack""#));
    }

    #[test]
    fn received_event_carries_the_sender_id() {
        let (log, buffer) = EventLog::capture();
        log.received(
            9,
            MessageKind::Promise,
            &Payload {
                proposal: 0,
                value: Value::Nil,
            },
        );
        let line: serde_json::Value = serde_json::from_str(&lines(&buffer)[0]).unwrap();
        assert_eq!(line["peer_id"], 9);
        assert_eq!(line["action"], "received");
        assert_eq!(line["message_type"], "prepare_ack");
    }

    #[test]
    fn chose_event_is_valid_json_even_with_quotes() {
        let (log, buffer) = EventLog::capture();
        log.chose(2, &Value::Utf8("say \"hi\"".into()), 4);
        let line: serde_json::Value = serde_json::from_str(&lines(&buffer)[0]).unwrap();
        assert_eq!(line["message_value"], "say \"hi\"");
        assert_eq!(line["proposal_num"], 4);
    }
}
