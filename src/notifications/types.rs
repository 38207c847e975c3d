use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use bon::bon;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Category of a [`Notification`].
///
/// The well-known categories drive the icon; anything else a JSON frame puts
/// in its `type` field is kept verbatim as [`NotificationKind::Other`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum NotificationKind {
    Event,
    Community,
    Reminder,
    Mqtt,
    Info,
    Warning,
    Error,
    Other(String),
}

impl NotificationKind {
    /// Icon shown next to notifications of this kind.
    #[must_use]
    pub fn icon(&self) -> Icon {
        match self {
            Self::Event => Icon::Calendar,
            Self::Community => Icon::People,
            Self::Reminder => Icon::Time,
            Self::Mqtt => Icon::Radio,
            Self::Warning => Icon::Warning,
            Self::Error => Icon::AlertCircle,
            Self::Info | Self::Other(_) => Icon::InformationCircle,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Event => "event",
            Self::Community => "community",
            Self::Reminder => "reminder",
            Self::Mqtt => "mqtt",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "event" => Self::Event,
            "community" => Self::Community,
            "reminder" => Self::Reminder,
            "mqtt" => Self::Mqtt,
            "info" => Self::Info,
            "warning" => Self::Warning,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        })
    }
}

/// Symbolic icon name, rendered by the UI's icon set.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Icon {
    Calendar,
    People,
    Time,
    Warning,
    AlertCircle,
    Radio,
    InformationCircle,
}

/// Event details echoed from an `EVENT_CREATED` broker frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub id: String,
    pub title: String,
    /// Date and time exactly as the broker sent it
    pub date_time: String,
    pub location: String,
    pub is_private: bool,
}

/// A notification as presented to the UI.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub icon: Icon,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<EventData>,
}

#[bon]
impl Notification {
    /// Build an unread notification. The icon follows from `kind`.
    #[builder]
    pub fn new(
        #[builder(into)] id: String,
        #[builder(into)] title: String,
        #[builder(into)] message: String,
        #[builder(into)] subtitle: Option<String>,
        kind: NotificationKind,
        timestamp: DateTime<Utc>,
        event_data: Option<EventData>,
    ) -> Self {
        Self {
            id,
            title,
            message,
            subtitle,
            icon: kind.icon(),
            kind,
            timestamp,
            read: false,
            event_data,
        }
    }
}
