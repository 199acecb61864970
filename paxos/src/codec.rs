//! Length-prefixed binary framing for [`Message`].
//!
//! Frame layout, all integers big-endian two's-complement i64:
//!
//! ```text
//! HEADER (24 bytes): sender | kind | payload_size
//! PAYLOAD (payload_size bytes, absent iff payload_size == 0):
//!     proposal | value_tag | value body
//! ```
//!
//! Value bodies: Nil carries nothing; Int64 and Float64 carry 8 bytes
//! (IEEE-754 binary64 for floats); String carries an i64 byte length
//! followed by UTF-8 bytes.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{Message, Payload, Value};

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 24;

/// Upper bound on a single payload; frames claiming more are rejected
/// rather than buffered.
const MAX_PAYLOAD: i64 = 16 * 1024 * 1024;

const TAG_NIL: i64 = 0;
const TAG_INT64: i64 = 1;
const TAG_FLOAT64: i64 = 2;
const TAG_STRING: i64 = 3;

/// Decode failures. Any of these tears down the offending connection; the
/// peer's other connections and the process are unaffected.
#[derive(Debug)]
pub enum WireError {
    /// The stream ended in the middle of a frame.
    ShortRead,
    /// Unknown value tag.
    BadTag(i64),
    /// A declared length is negative, too small for the payload fields, or
    /// runs past the end of the payload.
    BadLength(i64),
    /// Underlying stream failure.
    Io(io::Error),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortRead => f.write_str("stream ended mid-frame"),
            Self::BadTag(tag) => write!(f, "unknown value tag {tag}"),
            Self::BadLength(len) => write!(f, "bad length {len}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Codec for one [`Message`] per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Encoder<Message> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), WireError> {
        let mut payload = BytesMut::with_capacity(32);
        payload.put_i64(item.payload.proposal);
        match &item.payload.value {
            Value::Nil => payload.put_i64(TAG_NIL),
            Value::Int64(v) => {
                payload.put_i64(TAG_INT64);
                payload.put_i64(*v);
            }
            Value::Float64(v) => {
                payload.put_i64(TAG_FLOAT64);
                payload.put_f64(*v);
            }
            Value::Utf8(s) => {
                payload.put_i64(TAG_STRING);
                payload.put_i64(s.len() as i64);
                payload.extend_from_slice(s.as_bytes());
            }
        }

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_i64(item.sender);
        dst.put_i64(item.kind);
        dst.put_i64(payload.len() as i64);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&src[16..24]);
        let payload_size = i64::from_be_bytes(size_bytes);
        if !(0..=MAX_PAYLOAD).contains(&payload_size) {
            return Err(WireError::BadLength(payload_size));
        }

        let frame_len = HEADER_LEN + payload_size as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        let sender = frame.get_i64();
        let kind = frame.get_i64();
        let payload_size = frame.get_i64();

        let payload = if payload_size == 0 {
            // Degenerate empty payload: the protocol never sends one, but
            // the decoder must tolerate it.
            Payload::default()
        } else {
            decode_payload(&mut frame, payload_size)?
        };

        Ok(Some(Message {
            sender,
            kind,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(WireError::ShortRead),
        }
    }
}

/// Parse a payload from exactly `payload_size` buffered bytes. Trailing
/// slack after the value body is consumed with the frame rather than
/// rejected.
fn decode_payload(frame: &mut BytesMut, payload_size: i64) -> Result<Payload, WireError> {
    if payload_size < 16 {
        return Err(WireError::BadLength(payload_size));
    }
    let proposal = frame.get_i64();
    let tag = frame.get_i64();

    let value = match tag {
        TAG_NIL => Value::Nil,
        TAG_INT64 => {
            if frame.remaining() < 8 {
                return Err(WireError::BadLength(payload_size));
            }
            Value::Int64(frame.get_i64())
        }
        TAG_FLOAT64 => {
            if frame.remaining() < 8 {
                return Err(WireError::BadLength(payload_size));
            }
            Value::Float64(frame.get_f64())
        }
        TAG_STRING => {
            if frame.remaining() < 8 {
                return Err(WireError::BadLength(payload_size));
            }
            let len = frame.get_i64();
            if len < 0 || len as usize > frame.remaining() {
                return Err(WireError::BadLength(len));
            }
            let bytes = frame.split_to(len as usize);
            // Strings are UTF-8 by contract; arbitrary bytes decode lossily.
            Value::Utf8(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => return Err(WireError::BadTag(other)),
    };

    Ok(Payload { proposal, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageKind;

    fn encode(message: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec.encode(message, &mut buf).unwrap();
        buf
    }

    fn decode_one(buf: &mut BytesMut) -> Result<Option<Message>, WireError> {
        FrameCodec.decode(buf)
    }

    #[test]
    fn int64_frame_matches_wire_layout() {
        let message = Message::new(1, MessageKind::Prepare, 5, Value::Int64(42));
        let buf = encode(message);

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0, 0, 0, 0, 0, 0, 0, 0x01, // sender
            0, 0, 0, 0, 0, 0, 0, 0x01, // kind = Prepare
            0, 0, 0, 0, 0, 0, 0, 0x18, // payload_size = 24
            0, 0, 0, 0, 0, 0, 0, 0x05, // proposal
            0, 0, 0, 0, 0, 0, 0, 0x01, // tag = Int64
            0, 0, 0, 0, 0, 0, 0, 0x2A, // value = 42
        ];
        assert_eq!(&buf[..], expected);
        assert_eq!(buf.len(), 48);
    }

    #[test]
    fn nil_frame_is_forty_bytes() {
        let message = Message::new(2, MessageKind::Promise, 7, Value::Nil);
        let buf = encode(message);
        assert_eq!(buf.len(), 40);
        // payload_size field
        assert_eq!(buf[16..24], 16i64.to_be_bytes());
    }

    #[test]
    fn round_trip_all_variants() {
        let values = [
            Value::Nil,
            Value::Int64(-7),
            Value::Int64(i64::MAX),
            Value::Float64(3.5),
            Value::Float64(-0.125),
            Value::Utf8(String::new()),
            Value::Utf8("hello".into()),
            Value::Utf8("snowman \u{2603}".into()),
        ];
        for (i, value) in values.into_iter().enumerate() {
            let message = Message::new(i as i64, MessageKind::Accept, 100 + i as i64, value);
            let mut buf = encode(message.clone());
            let mut size_bytes = [0u8; 8];
            size_bytes.copy_from_slice(&buf[16..24]);
            assert_eq!(
                buf.len() as i64,
                24 + i64::from_be_bytes(size_bytes),
                "frame length must be header + payload_size"
            );
            let decoded = decode_one(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, message);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let message = Message::new(3, MessageKind::Accept, 9, Value::Utf8("abcdef".into()));
        let full = encode(message.clone());

        for split in 1..full.len() {
            let mut buf = BytesMut::from(&full[..split]);
            assert!(decode_one(&mut buf).unwrap().is_none(), "split at {split}");
        }

        let mut buf = full;
        assert_eq!(decode_one(&mut buf).unwrap().unwrap(), message);
    }

    #[test]
    fn two_frames_back_to_back() {
        let first = Message::new(1, MessageKind::Prepare, 2, Value::Utf8("x".into()));
        let second = Message::new(2, MessageKind::Promise, 0, Value::Nil);
        let mut buf = encode(first.clone());
        buf.extend_from_slice(&encode(second.clone()));

        assert_eq!(decode_one(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decode_one(&mut buf).unwrap().unwrap(), second);
        assert!(decode_one(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_payload_decodes_to_nil() {
        let mut buf = BytesMut::new();
        buf.put_i64(4); // sender
        buf.put_i64(2); // kind
        buf.put_i64(0); // payload_size
        let decoded = decode_one(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload, Payload::default());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i64(1);
        buf.put_i64(1);
        buf.put_i64(16);
        buf.put_i64(5); // proposal
        buf.put_i64(99); // tag
        assert!(matches!(decode_one(&mut buf), Err(WireError::BadTag(99))));
    }

    #[test]
    fn negative_payload_size_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i64(1);
        buf.put_i64(1);
        buf.put_i64(-8);
        assert!(matches!(
            decode_one(&mut buf),
            Err(WireError::BadLength(-8))
        ));
    }

    #[test]
    fn string_length_past_payload_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i64(1);
        buf.put_i64(3);
        buf.put_i64(28); // proposal + tag + len + 4 bytes of body
        buf.put_i64(5);
        buf.put_i64(TAG_STRING);
        buf.put_i64(1000); // claims more than the 4 remaining bytes
        buf.extend_from_slice(b"abcd");
        assert!(matches!(
            decode_one(&mut buf),
            Err(WireError::BadLength(1000))
        ));
    }

    #[test]
    fn truncated_stream_is_a_short_read() {
        let message = Message::new(1, MessageKind::Accept, 3, Value::Utf8("hello".into()));
        let full = encode(message);
        let mut buf = BytesMut::from(&full[..full.len() - 2]);
        assert!(matches!(
            FrameCodec.decode_eof(&mut buf),
            Err(WireError::ShortRead)
        ));

        let mut empty = BytesMut::new();
        assert!(FrameCodec.decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn unknown_kind_decodes_for_dispatcher() {
        let message = Message {
            sender: 1,
            kind: 42,
            payload: Payload {
                proposal: 1,
                value: Value::Nil,
            },
        };
        let mut buf = encode(message.clone());
        let decoded = decode_one(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.kind(), None);
    }
}
