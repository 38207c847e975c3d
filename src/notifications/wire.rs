//! Decoder for the pipe-delimited text protocol spoken by the event gateway.
//!
//! ```text
//! WEBSOCKET_CONNECTED|21aee875|1752050873974
//! MQTT_EVENT|<topic>|EVENT_CREATED|<id>|<title>|<date time>|<location>|<private>|...
//! MQTT_EVENT|<topic>|<payload>|<timestamp>
//! <TAG>|<field>|<field>|...
//! {"title": "...", "content": "...", "type": "..."}
//! anything else
//! ```

use serde::Deserialize;
use serde_json::Value;
use serde_with::serde_as;

use crate::serde_helpers::{LenientString, deserialize_with_warnings};

const SEPARATOR: char = '|';
const BROKER_EVENT_TAG: &str = "MQTT_EVENT";
const EVENT_CREATED: &str = "EVENT_CREATED";
/// Minimum number of segments of a structured `EVENT_CREATED` frame
const EVENT_CREATED_SEGMENTS: usize = 9;

/// Control frames of the gateway. They never become notifications.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SystemKind {
    #[strum(serialize = "WEBSOCKET_CONNECTED")]
    Connected,
    #[strum(serialize = "KEEPALIVE")]
    Keepalive,
    #[strum(serialize = "PONG")]
    Pong,
}

impl SystemKind {
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "WEBSOCKET_CONNECTED" => Some(Self::Connected),
            "KEEPALIVE" => Some(Self::Keepalive),
            "PONG" => Some(Self::Pong),
            _ => None,
        }
    }
}

/// Generic event relayed from the broker.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEvent {
    pub topic: String,
    /// Third segment of the frame. Outside `EVENT_CREATED` frames the gateway
    /// puts the payload here.
    pub event_type: String,
    /// Every segment from the third one on, in frame order
    pub fields: Vec<String>,
}

impl BrokerEvent {
    /// Payload slot, shared with the event type.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.event_type
    }

    /// Timestamp segment as sent by the gateway, if any.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(1).map(String::as_str)
    }
}

/// `EVENT_CREATED` broker event with its fields extracted.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCreated {
    pub topic: String,
    pub event_id: String,
    pub title: String,
    /// Date and time exactly as sent, usually RFC 3339
    pub date_time_raw: String,
    pub location: String,
    pub is_private: bool,
}

/// Fields read from a JSON frame. Every field is optional.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JsonFrame {
    #[serde_as(as = "LenientString")]
    #[serde(default)]
    pub title: Option<String>,
    #[serde_as(as = "LenientString")]
    #[serde(default)]
    pub content: Option<String>,
    #[serde_as(as = "LenientString")]
    #[serde(default)]
    pub message: Option<String>,
    #[serde_as(as = "LenientString")]
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// One decoded text frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    System(SystemKind),
    BrokerEvent(BrokerEvent),
    EventCreated(EventCreated),
    /// Pipe-delimited frame with a tag this client has no special handling for
    ServerText {
        kind: String,
        rest: Vec<String>,
    },
    Json(JsonFrame),
    PlainText {
        text: String,
    },
}

impl WireMessage {
    /// Decode a raw text frame. Never fails: anything unrecognised degrades to
    /// [`WireMessage::ServerText`] or [`WireMessage::PlainText`].
    #[must_use]
    pub fn parse(frame: &str) -> Self {
        if frame.contains(SEPARATOR) {
            let parts: Vec<&str> = frame.split(SEPARATOR).collect();
            return Self::from_parts(&parts);
        }

        match serde_json::from_str::<Value>(frame) {
            Ok(Value::Null) | Err(_) => Self::PlainText {
                text: frame.to_owned(),
            },
            Ok(value @ Value::Object(_)) => {
                Self::Json(deserialize_with_warnings(value).unwrap_or_default())
            }
            // Scalars and arrays are valid JSON but carry no fields
            Ok(_) => Self::Json(JsonFrame::default()),
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    fn from_parts(parts: &[&str]) -> Self {
        let segment = |index: usize| parts.get(index).copied().unwrap_or_default().to_owned();
        let tag = parts.first().copied().unwrap_or_default();

        if let Some(kind) = SystemKind::from_tag(tag) {
            return Self::System(kind);
        }

        if tag != BROKER_EVENT_TAG {
            return Self::ServerText {
                kind: tag.to_owned(),
                rest: parts.iter().skip(1).map(|&part| part.to_owned()).collect(),
            };
        }

        if parts.get(2) == Some(&EVENT_CREATED) && parts.len() >= EVENT_CREATED_SEGMENTS {
            return Self::EventCreated(EventCreated {
                topic: segment(1),
                event_id: segment(3),
                title: segment(4),
                date_time_raw: segment(5),
                location: segment(6),
                is_private: parts.get(7) == Some(&"true"),
            });
        }

        Self::BrokerEvent(BrokerEvent {
            topic: segment(1),
            event_type: segment(2),
            fields: parts.iter().skip(2).map(|&part| part.to_owned()).collect(),
        })
    }
}
