//! Message envelope and topic vocabulary spoken between the two contexts.
//!
//! On the wire every message has the shape `{ "topic": string, "value": T | null }`.
//! [`Envelope`] mirrors that shape exactly, including its failure modes: a
//! receiver may be handed an envelope with no topic or with a topic nobody
//! recognises. [`Message`] is the typed view a handler matches on, obtained
//! through [`Message::from_envelope`], which returns `None` for anything a
//! handler must silently discard.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Which side of the channel a topic is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by the controller, handled by the scheduler context.
    ToScheduler,
    /// Sent by the scheduler context, handled by the controller.
    ToController,
}

/// The closed set of message topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum Topic {
    /// "Are you alive?" from the controller.
    ReadyQuery,
    /// Handshake complete, from the scheduler.
    ReadyAck,
    /// Begin periodic emission, from the controller.
    StartCommand,
    /// One tick occurred, from the scheduler.
    TickEvent,
}

impl Topic {
    /// Every topic, in handshake order.
    pub const ALL: [Self; 4] = [
        Self::ReadyQuery,
        Self::ReadyAck,
        Self::StartCommand,
        Self::TickEvent,
    ];

    /// The wire name of this topic.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadyQuery => "ready-query",
            Self::ReadyAck => "ready-ack",
            Self::StartCommand => "start-command",
            Self::TickEvent => "tick-event",
        }
    }

    /// Look up a topic by its wire name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.as_str() == name)
    }

    /// The side of the channel this topic is addressed to.
    pub const fn direction(self) -> Direction {
        match self {
            Self::ReadyQuery | Self::StartCommand => Direction::ToScheduler,
            Self::ReadyAck | Self::TickEvent => Direction::ToController,
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw wire envelope.
///
/// Both fields are optional on the wire. A missing `value` and an explicit
/// `null` are the same thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Envelope {
    /// Wire name of the topic, if present.
    #[serde(default)]
    pub topic: Option<String>,

    /// Topic-dependent payload, opaque to the protocol layer.
    #[serde(default)]
    #[ts(type = "unknown")]
    pub value: Option<Value>,
}

impl Envelope {
    /// Build an envelope from an arbitrary topic name and payload.
    pub fn new(topic: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            topic: Some(topic.into()),
            value,
        }
    }
}

/// Typed view of a well-formed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    /// See [`Topic::ReadyQuery`].
    ReadyQuery,
    /// See [`Topic::ReadyAck`].
    ReadyAck,
    /// See [`Topic::StartCommand`].
    StartCommand,
    /// See [`Topic::TickEvent`].
    TickEvent {
        /// Scheduler tick counter after the increment, or `None` when the
        /// payload was null or not an unsigned integer.
        tick: Option<u64>,
    },
}

impl Message {
    /// The topic this message travels under.
    pub const fn topic(self) -> Topic {
        match self {
            Self::ReadyQuery => Topic::ReadyQuery,
            Self::ReadyAck => Topic::ReadyAck,
            Self::StartCommand => Topic::StartCommand,
            Self::TickEvent { .. } => Topic::TickEvent,
        }
    }

    /// Interpret an envelope. Returns `None` for a missing or unknown topic.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let topic = Topic::parse(envelope.topic.as_deref()?)?;
        let message = match topic {
            Topic::ReadyQuery => Self::ReadyQuery,
            Topic::ReadyAck => Self::ReadyAck,
            Topic::StartCommand => Self::StartCommand,
            Topic::TickEvent => Self::TickEvent {
                tick: envelope.value.as_ref().and_then(Value::as_u64),
            },
        };
        Some(message)
    }

    /// Wrap this message in its wire envelope.
    pub fn to_envelope(self) -> Envelope {
        let value = match self {
            Self::TickEvent { tick: Some(tick) } => Some(Value::from(tick)),
            _ => None,
        };
        Envelope::new(self.topic().as_str(), value)
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        message.to_envelope()
    }
}
