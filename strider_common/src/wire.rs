//! Frame codec shared by the WebSocket and BLE adapters.
//!
//! A frame is a heterogeneous array:
//!
//! ```text
//! [ msg_kind, topic_id, payload ]      kind = Event
//! [ msg_kind, topic_id, ..., topic_id ] kind = Connect | Disconnect
//! [ msg_kind ]                          kind = Ping | Pong
//! ```
//!
//! Exactly one serialization format is active per build: human-readable JSON
//! by default, MessagePack with the `msgpack` feature. The semantics are
//! identical either way.

use thiserror::Error;

use crate::topic::{Payload, Topic};

/// Wire message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgKind {
    Connect = 0,
    Disconnect = 1,
    Event = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u8> for MsgKind {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(Self::Connect),
            1 => Ok(Self::Disconnect),
            2 => Ok(Self::Event),
            3 => Ok(Self::Ping),
            4 => Ok(Self::Pong),
            other => Err(other),
        }
    }
}

/// Upper bound on topic ids listed in one Connect/Disconnect frame.
/// Duplicates are legal, so the cap is looser than [`Topic::COUNT`].
pub const MAX_FRAME_TOPICS: usize = 16;

/// Topic list carried by Connect/Disconnect frames.
pub type TopicList = heapless::Vec<Topic, MAX_FRAME_TOPICS>;

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Subscribe the sending client to the listed topics.
    Connect(TopicList),
    /// Unsubscribe the sending client from the listed topics.
    Disconnect(TopicList),
    /// A typed message published on a topic.
    Event { topic: Topic, payload: Payload },
    /// Liveness probe; answered with [`Frame::Pong`].
    Ping,
    /// Liveness answer.
    Pong,
}

impl Frame {
    /// Kind code of this frame.
    pub const fn kind(&self) -> MsgKind {
        match self {
            Frame::Connect(_) => MsgKind::Connect,
            Frame::Disconnect(_) => MsgKind::Disconnect,
            Frame::Event { .. } => MsgKind::Event,
            Frame::Ping => MsgKind::Ping,
            Frame::Pong => MsgKind::Pong,
        }
    }
}

/// Frame could not be encoded. Practically unreachable for the closed
/// payload set, but surfaced instead of panicking on the send path.
#[derive(Debug, Error)]
#[error("frame encode failed: {0}")]
pub struct EncodeError(String);

/// Frame could not be decoded. Per the error policy the frame is dropped,
/// logged and the connection continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame has fewer elements than its kind requires.
    #[error("frame too short")]
    TooShort,
    /// Message kind code out of range.
    #[error("unknown message kind {0}")]
    BadKind(u8),
    /// Topic id not present in the registry.
    #[error("unknown topic id {0}")]
    UnknownTopic(u8),
    /// Payload does not match the schema of its topic.
    #[error("payload does not match topic {0:?}")]
    BadPayload(Topic),
    /// Connect/Disconnect frame lists more than [`MAX_FRAME_TOPICS`] topics.
    #[error("frame lists too many topics")]
    TooManyTopics,
    /// Bytes are not a well-formed array in the active wire format.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

#[cfg(not(feature = "msgpack"))]
mod codec {
    use super::*;
    use serde_json::Value;

    /// Encode a frame into wire bytes.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let mut items: Vec<Value> = vec![Value::from(frame.kind() as u8)];
        match frame {
            Frame::Connect(topics) | Frame::Disconnect(topics) => {
                items.extend(topics.iter().map(|t| Value::from(t.index() as u8)));
            }
            Frame::Event { topic, payload } => {
                items.push(Value::from(topic.index() as u8));
                items.push(
                    serde_json::to_value(payload).map_err(|e| EncodeError(e.to_string()))?,
                );
            }
            Frame::Ping | Frame::Pong => {}
        }
        serde_json::to_vec(&Value::Array(items)).map_err(|e| EncodeError(e.to_string()))
    }

    /// Decode wire bytes into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let items = value
            .as_array()
            .ok_or_else(|| DecodeError::Malformed("frame is not an array".into()))?;

        let kind = kind_of(items)?;
        match kind {
            MsgKind::Connect => Ok(Frame::Connect(topic_list(&items[1..])?)),
            MsgKind::Disconnect => Ok(Frame::Disconnect(topic_list(&items[1..])?)),
            MsgKind::Event => {
                if items.len() < 3 {
                    return Err(DecodeError::TooShort);
                }
                let topic = topic_of(&items[1])?;
                let payload = Payload::from_json(topic, items[2].clone())
                    .map_err(|_| DecodeError::BadPayload(topic))?;
                Ok(Frame::Event { topic, payload })
            }
            MsgKind::Ping => Ok(Frame::Ping),
            MsgKind::Pong => Ok(Frame::Pong),
        }
    }

    fn kind_of(items: &[Value]) -> Result<MsgKind, DecodeError> {
        let first = items.first().ok_or(DecodeError::TooShort)?;
        let raw = first
            .as_u64()
            .ok_or_else(|| DecodeError::Malformed("kind is not an integer".into()))?;
        u8::try_from(raw)
            .ok()
            .and_then(|k| MsgKind::try_from(k).ok())
            .ok_or(DecodeError::BadKind(raw.min(u64::from(u8::MAX)) as u8))
    }

    fn topic_of(item: &Value) -> Result<Topic, DecodeError> {
        let raw = item
            .as_u64()
            .ok_or_else(|| DecodeError::Malformed("topic id is not an integer".into()))?;
        u8::try_from(raw)
            .ok()
            .and_then(|t| Topic::try_from(t).ok())
            .ok_or(DecodeError::UnknownTopic(raw.min(u64::from(u8::MAX)) as u8))
    }

    fn topic_list(items: &[Value]) -> Result<TopicList, DecodeError> {
        let mut topics = TopicList::new();
        for item in items {
            let topic = topic_of(item)?;
            topics.push(topic).map_err(|_| DecodeError::TooManyTopics)?;
        }
        Ok(topics)
    }
}

#[cfg(feature = "msgpack")]
mod codec {
    use super::*;
    use rmpv::Value;

    /// Encode a frame into wire bytes.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let mut items: Vec<Value> = vec![Value::from(frame.kind() as u8)];
        match frame {
            Frame::Connect(topics) | Frame::Disconnect(topics) => {
                items.extend(topics.iter().map(|t| Value::from(t.index() as u8)));
            }
            Frame::Event { topic, payload } => {
                items.push(Value::from(topic.index() as u8));
                items.push(
                    rmpv::ext::to_value(payload).map_err(|e| EncodeError(e.to_string()))?,
                );
            }
            Frame::Ping | Frame::Pong => {}
        }
        rmp_serde::to_vec(&Value::Array(items)).map_err(|e| EncodeError(e.to_string()))
    }

    /// Decode wire bytes into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let value: Value = rmp_serde::from_slice(bytes)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let items = value
            .as_array()
            .ok_or_else(|| DecodeError::Malformed("frame is not an array".into()))?;

        let kind = kind_of(items)?;
        match kind {
            MsgKind::Connect => Ok(Frame::Connect(topic_list(&items[1..])?)),
            MsgKind::Disconnect => Ok(Frame::Disconnect(topic_list(&items[1..])?)),
            MsgKind::Event => {
                if items.len() < 3 {
                    return Err(DecodeError::TooShort);
                }
                let topic = topic_of(&items[1])?;
                let payload = Payload::from_msgpack(topic, items[2].clone())
                    .map_err(|_| DecodeError::BadPayload(topic))?;
                Ok(Frame::Event { topic, payload })
            }
            MsgKind::Ping => Ok(Frame::Ping),
            MsgKind::Pong => Ok(Frame::Pong),
        }
    }

    fn kind_of(items: &[Value]) -> Result<MsgKind, DecodeError> {
        let first = items.first().ok_or(DecodeError::TooShort)?;
        let raw = first
            .as_u64()
            .ok_or_else(|| DecodeError::Malformed("kind is not an integer".into()))?;
        u8::try_from(raw)
            .ok()
            .and_then(|k| MsgKind::try_from(k).ok())
            .ok_or(DecodeError::BadKind(raw.min(u64::from(u8::MAX)) as u8))
    }

    fn topic_of(item: &Value) -> Result<Topic, DecodeError> {
        let raw = item
            .as_u64()
            .ok_or_else(|| DecodeError::Malformed("topic id is not an integer".into()))?;
        u8::try_from(raw)
            .ok()
            .and_then(|t| Topic::try_from(t).ok())
            .ok_or(DecodeError::UnknownTopic(raw.min(u64::from(u8::MAX)) as u8))
    }

    fn topic_list(items: &[Value]) -> Result<TopicList, DecodeError> {
        let mut topics = TopicList::new();
        for item in items {
            let topic = topic_of(item)?;
            topics.push(topic).map_err(|_| DecodeError::TooManyTopics)?;
        }
        Ok(topics)
    }
}

pub use codec::{decode, encode};

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{MotionInputMsg, MotionModeMsg};
    use crate::topic::TopicMessage;

    fn event(payload: Payload) -> Frame {
        Frame::Event {
            topic: payload.topic(),
            payload,
        }
    }

    #[test]
    fn event_round_trip() {
        let frame = event(
            MotionInputMsg {
                lx: 0.5,
                ly: -0.25,
                rx: 0.0,
                ry: 1.0,
                h: 0.0,
                s: 0.5,
                s1: -1.0,
            }
            .into_payload(),
        );
        let bytes = encode(&frame).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), frame);
    }

    #[test]
    fn mode_event_round_trip() {
        let frame = event(MotionModeMsg { mode: 2 }.into_payload());
        let bytes = encode(&frame).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), frame);
    }

    #[test]
    fn connect_round_trip() {
        let mut topics = TopicList::new();
        topics.push(Topic::MotionAngles).expect("capacity");
        topics.push(Topic::Imu).expect("capacity");
        let frame = Frame::Connect(topics);
        let bytes = encode(&frame).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), frame);
    }

    #[test]
    fn ping_and_pong_are_single_element() {
        let bytes = encode(&Frame::Ping).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), Frame::Ping);
        let bytes = encode(&Frame::Pong).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), Frame::Pong);
    }

    #[cfg(not(feature = "msgpack"))]
    #[test]
    fn json_layout_matches_the_wire_contract() {
        let frame = event(
            crate::msg::ImuMsg {
                yaw: 1.0,
                pitch: 2.0,
                roll: 3.0,
            }
            .into_payload(),
        );
        let bytes = encode(&frame).expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text, "[2,4,[1.0,2.0,3.0]]");
    }

    #[test]
    fn empty_frame_is_too_short() {
        let bytes = encode_raw_array(&[]);
        assert!(matches!(decode(&bytes), Err(DecodeError::TooShort)));
    }

    #[test]
    fn out_of_range_kind_is_rejected() {
        let bytes = encode_raw_array(&[9]);
        assert!(matches!(decode(&bytes), Err(DecodeError::BadKind(9))));
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let bytes = encode_raw_array(&[2, 200, 0]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::UnknownTopic(200))
        ));
    }

    #[test]
    fn event_without_payload_is_too_short() {
        let bytes = encode_raw_array(&[2, 4]);
        assert!(matches!(decode(&bytes), Err(DecodeError::TooShort)));
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        // Imu expects three floats, not a bare integer.
        let bytes = encode_raw_array(&[2, 4, 7]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::BadPayload(Topic::Imu))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode(b"\xff\xfe\x00garbage"),
            Err(DecodeError::Malformed(_))
        ));
    }

    /// Encode a plain integer array in the active wire format, bypassing
    /// the frame constructors, to probe the decoder with bad input.
    fn encode_raw_array(items: &[u8]) -> Vec<u8> {
        #[cfg(not(feature = "msgpack"))]
        {
            serde_json::to_vec(&items).expect("encode probe")
        }
        #[cfg(feature = "msgpack")]
        {
            rmp_serde::to_vec(&items).expect("encode probe")
        }
    }
}
