//! Turns decoded frames into [`Notification`]s.

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, Timelike as _, Utc};

use super::types::{EventData, Notification, NotificationKind};
use super::wire::{BrokerEvent, EventCreated, JsonFrame, WireMessage};

pub const EVENT_TITLE_FALLBACK: &str = "Neues Event";
pub const EVENT_MESSAGE_FALLBACK: &str = "Event erstellt";
pub const BROKER_TITLE_PREFIX: &str = "MQTT: ";
pub const BROKER_MESSAGE_FALLBACK: &str = "MQTT Nachricht erhalten";
pub const SERVER_TEXT_TITLE: &str = "Server Nachricht";
pub const MESSAGE_TITLE_FALLBACK: &str = "Neue Nachricht";
pub const MESSAGE_FALLBACK: &str = "Neue Benachrichtigung erhalten";

const WEEKDAYS: [&str; 7] = ["Mo.", "Di.", "Mi.", "Do.", "Fr.", "Sa.", "So."];
const MONTHS: [&str; 12] = [
    "Jan.", "Feb.", "März", "Apr.", "Mai", "Juni", "Juli", "Aug.", "Sept.", "Okt.", "Nov.", "Dez.",
];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Build the notification for a decoded frame, or `None` for control frames.
///
/// Notifications without an id of their own are identified by `now` in
/// milliseconds.
#[must_use]
pub fn from_wire_message(message: WireMessage, now: DateTime<Utc>) -> Option<Notification> {
    let fallback_id = now.timestamp_millis().to_string();

    let notification = match message {
        WireMessage::System(_) => return None,
        WireMessage::EventCreated(event) => event_created(event, fallback_id, now),
        WireMessage::BrokerEvent(event) => broker_event(event, fallback_id, now),
        WireMessage::ServerText { kind, rest } => Notification::builder()
            .id(fallback_id)
            .title(SERVER_TEXT_TITLE)
            .message(format!("{kind}: {}", rest.join(" | ")))
            .kind(NotificationKind::Info)
            .timestamp(now)
            .build(),
        WireMessage::Json(frame) => json_frame(frame, fallback_id, now),
        WireMessage::PlainText { text } => Notification::builder()
            .id(fallback_id)
            .title(MESSAGE_TITLE_FALLBACK)
            .message(text)
            .kind(NotificationKind::Info)
            .timestamp(now)
            .build(),
    };

    Some(notification)
}

fn event_created(event: EventCreated, fallback_id: String, now: DateTime<Utc>) -> Notification {
    let subtitle = (!event.date_time_raw.is_empty()).then(|| {
        format_event_date(&event.date_time_raw).unwrap_or_else(|| event.date_time_raw.clone())
    });

    Notification::builder()
        .id(non_empty_or(event.event_id.clone(), &fallback_id))
        .title(non_empty_or(event.title.clone(), EVENT_TITLE_FALLBACK))
        .message(non_empty_or(event.location.clone(), EVENT_MESSAGE_FALLBACK))
        .maybe_subtitle(subtitle)
        .kind(NotificationKind::Event)
        .timestamp(now)
        .event_data(EventData {
            id: event.event_id,
            title: event.title,
            date_time: event.date_time_raw,
            location: event.location,
            is_private: event.is_private,
        })
        .build()
}

fn broker_event(event: BrokerEvent, fallback_id: String, now: DateTime<Utc>) -> Notification {
    Notification::builder()
        .id(fallback_id)
        .title(format!("{BROKER_TITLE_PREFIX}{}", event.topic))
        .message(non_empty_or(event.event_type, BROKER_MESSAGE_FALLBACK))
        .kind(NotificationKind::Mqtt)
        .timestamp(now)
        .build()
}

fn json_frame(frame: JsonFrame, fallback_id: String, now: DateTime<Utc>) -> Notification {
    let kind = frame
        .kind
        .filter(|kind| !kind.is_empty())
        .map_or(NotificationKind::Info, |kind| match kind.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        });

    let message = [frame.content, frame.message]
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| MESSAGE_FALLBACK.to_owned());

    Notification::builder()
        .id(fallback_id)
        .title(non_empty_or(
            frame.title.unwrap_or_default(),
            MESSAGE_TITLE_FALLBACK,
        ))
        .message(message)
        .kind(kind)
        .timestamp(now)
        .build()
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

/// Render a broker date-time in the German short style, e.g.
/// `Fr., 15. Aug. 2025, 10:00`.
///
/// Offsets are kept as sent; times without an offset are shown as-is. Returns
/// `None` when the input is not a recognisable date.
#[must_use]
pub fn format_event_date(raw: &str) -> Option<String> {
    let raw = raw.trim();

    let local = DateTime::parse_from_rfc3339(raw)
        .map(|date_time| date_time.naive_local())
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    let weekday = WEEKDAYS
        .get(local.weekday().num_days_from_monday() as usize)
        .copied()?;
    let month = MONTHS.get(local.month0() as usize).copied()?;

    Some(format!(
        "{weekday}, {day}. {month} {year}, {hour:02}:{minute:02}",
        day = local.day(),
        year = local.year(),
        hour = local.hour(),
        minute = local.minute(),
    ))
}
