//! Compile-time topic registry.
//!
//! The topic set is closed: every topic binds exactly one payload type, and
//! the wire tag equals the numeric value of the enum. The registry is
//! generated by the `topics!` macro so the enum, the sealed payload union
//! and the per-topic decode dispatch can never drift apart.

use serde::Serialize;

use crate::msg::*;

/// Binds a message type to its topic. Implemented by the registry macro for
/// every payload type; sealed by construction (the macro is not exported).
pub trait TopicMessage: Copy + Send + 'static {
    /// The topic this message travels on.
    const TOPIC: Topic;

    /// Wrap into the payload union.
    fn into_payload(self) -> Payload;

    /// Borrow back out of the payload union; `None` when the payload
    /// belongs to a different topic.
    fn from_payload(payload: &Payload) -> Option<&Self>;
}

macro_rules! topics {
    ($( $(#[$meta:meta])* $name:ident = $id:literal => $msg:ty ),+ $(,)?) => {
        /// Closed set of bus topics. Wire tag = enum value.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Topic {
            $( $(#[$meta])* $name = $id, )+
        }

        impl Topic {
            /// Number of topics in the registry.
            pub const COUNT: usize = [$($id as u8),+].len();

            /// All topics in tag order.
            pub const ALL: [Topic; Self::COUNT] = [$(Topic::$name),+];

            /// Dense index of this topic (equals the wire tag).
            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }
        }

        impl TryFrom<u8> for Topic {
            type Error = u8;

            fn try_from(tag: u8) -> Result<Self, u8> {
                match tag {
                    $( $id => Ok(Topic::$name), )+
                    other => Err(other),
                }
            }
        }

        /// The sealed payload union carried by the event bus. One variant
        /// per topic.
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum Payload {
            $( $(#[$meta])* $name($msg), )+
        }

        impl Payload {
            /// Topic this payload belongs to.
            #[inline]
            pub const fn topic(&self) -> Topic {
                match self {
                    $( Payload::$name(_) => Topic::$name, )+
                }
            }

            /// Decode a payload of the given topic from a JSON value.
            pub fn from_json(
                topic: Topic,
                value: serde_json::Value,
            ) -> Result<Self, serde_json::Error> {
                Ok(match topic {
                    $( Topic::$name => Payload::$name(serde_json::from_value::<$msg>(value)?), )+
                })
            }

            /// Decode a payload of the given topic from a MessagePack value.
            #[cfg(feature = "msgpack")]
            pub fn from_msgpack(
                topic: Topic,
                value: rmpv::Value,
            ) -> Result<Self, rmpv::ext::Error> {
                Ok(match topic {
                    $( Topic::$name => Payload::$name(rmpv::ext::from_value::<$msg>(value)?), )+
                })
            }
        }

        impl Serialize for Payload {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    $( Payload::$name(msg) => msg.serialize(serializer), )+
                }
            }
        }

        $(
            impl TopicMessage for $msg {
                const TOPIC: Topic = Topic::$name;

                #[inline]
                fn into_payload(self) -> Payload {
                    Payload::$name(self)
                }

                #[inline]
                fn from_payload(payload: &Payload) -> Option<&Self> {
                    match payload {
                        Payload::$name(msg) => Some(msg),
                        _ => None,
                    }
                }
            }
        )+
    };
}

topics! {
    /// Operator stick input.
    MotionInput = 0 => MotionInputMsg,
    /// Motion mode selection.
    MotionMode = 1 => MotionModeMsg,
    /// Commanded body pose.
    MotionPosition = 2 => MotionPositionMsg,
    /// Joint angle telemetry.
    MotionAngles = 3 => MotionAnglesMsg,
    /// Attitude estimate.
    Imu = 4 => ImuMsg,
    /// Direct servo angle override.
    ServoAngles = 5 => ServoAnglesMsg,
    /// Legacy two-axis drive command.
    Command = 6 => CommandMsg,
    /// Walk gait selection.
    WalkGait = 7 => WalkGaitMsg,
    /// Sonar range telemetry.
    Sonar = 8 => SonarMsg,
    /// Barometer telemetry.
    Environment = 9 => EnvironmentMsg,
}

static_assertions::const_assert_eq!(Topic::COUNT, 10);
static_assertions::const_assert!(Topic::COUNT <= u8::MAX as usize);

// ─── Tests ──────────────────────────────────────────────────────────
