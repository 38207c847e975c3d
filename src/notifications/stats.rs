use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::factory::BROKER_TITLE_PREFIX;
use super::store::NotificationStore;
use super::types::{Notification, NotificationKind};
use crate::ws::ConnectionInfo;

/// Aggregate counters over the broker-event notifications currently stored.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Broker-event notifications in the store
    pub total_messages: usize,
    pub unique_topics: usize,
    /// Distinct topics, most recently seen first
    pub topics: Vec<String>,
    /// Newest broker-event notification
    pub latest: Option<Notification>,
    pub is_connected: bool,
    pub total_notifications: usize,
    pub active_listeners: usize,
}

impl Stats {
    #[must_use]
    pub fn collect(store: &NotificationStore, is_connected: bool) -> Self {
        let notifications = store.all();
        // Broker events carry the `MQTT: <topic>` title
        let broker_events: Vec<(&Notification, &str)> = notifications
            .iter()
            .filter(|notification| notification.kind == NotificationKind::Mqtt)
            .filter_map(|notification| {
                let topic = notification.title.strip_prefix(BROKER_TITLE_PREFIX)?;
                Some((notification, topic))
            })
            .collect();

        let mut topics: Vec<String> = Vec::new();
        for &(_, topic) in &broker_events {
            if !topics.iter().any(|seen| seen == topic) {
                topics.push(topic.to_owned());
            }
        }

        Self {
            total_messages: broker_events.len(),
            unique_topics: topics.len(),
            latest: broker_events
                .first()
                .map(|&(notification, _)| notification.clone()),
            topics,
            is_connected,
            total_notifications: notifications.len(),
            active_listeners: store.listener_count(),
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MQTT message statistics")?;
        writeln!(f, "  total MQTT messages: {}", self.total_messages)?;
        writeln!(
            f,
            "  unique topics: {} [{}]",
            self.unique_topics,
            self.topics.join(", ")
        )?;
        writeln!(f, "  connected: {}", self.is_connected)?;
        writeln!(f, "  stored notifications: {}", self.total_notifications)?;
        write!(f, "  active listeners: {}", self.active_listeners)?;
        if let Some(latest) = &self.latest {
            write!(
                f,
                "\n  latest: {} | {} | {}",
                latest.title,
                latest.message,
                latest.timestamp.to_rfc3339()
            )?;
        }
        Ok(())
    }
}

/// Cancels the inner [`CancellationToken`] when dropped or replaced.
#[derive(Debug, Default)]
struct DroppingCancellationToken(Option<CancellationToken>);

impl DroppingCancellationToken {
    fn cancel(&mut self) -> bool {
        match self.0.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for DroppingCancellationToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Read-only diagnostics over the store and the connection, plus an optional
/// periodic logger of those diagnostics.
#[derive(Debug)]
pub struct StatsReporter {
    store: Arc<NotificationStore>,
    connection: watch::Receiver<ConnectionInfo>,
    logger: Mutex<DroppingCancellationToken>,
}

impl StatsReporter {
    #[must_use]
    pub fn new(store: Arc<NotificationStore>, connection: watch::Receiver<ConnectionInfo>) -> Self {
        Self {
            store,
            connection,
            logger: Mutex::default(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Stats {
        Stats::collect(&self.store, self.connection.borrow().state.is_connected())
    }

    /// Log a [`Stats`] snapshot every `interval`, replacing a running logger.
    ///
    /// Must be called from within a Tokio runtime. A zero interval is ignored.
    pub fn start_logging(&self, interval: Duration) {
        if interval.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Stats logging interval must be positive, ignoring");
            return;
        }

        let token = CancellationToken::new();
        let token_clone = token.clone();
        let store = Arc::clone(&self.store);
        let connection = self.connection.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token_clone.cancelled() => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Stats logging cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = Stats::collect(&store, connection.borrow().state.is_connected());
                        #[cfg(feature = "tracing")]
                        tracing::info!("{stats}");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &stats;
                    }
                }
            }
        });

        let mut logger = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
        // Replacing the token cancels the previous logger
        *logger = DroppingCancellationToken(Some(token));

        #[cfg(feature = "tracing")]
        tracing::info!(?interval, "Started stats logging");
    }

    /// Stop the periodic logger. Returns whether one was running.
    pub fn stop_logging(&self) -> bool {
        let stopped = self
            .logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();

        if stopped {
            #[cfg(feature = "tracing")]
            tracing::info!("Stopped stats logging");
        }

        stopped
    }

    #[must_use]
    pub fn is_logging(&self) -> bool {
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;
    use crate::notifications::factory::from_wire_message;
    use crate::notifications::wire::WireMessage;
    use crate::ws::{Lifecycle, ReconnectConfig};

    fn push(store: &NotificationStore, frame: &str, second: u32) {
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, second).unwrap();
        if let Some(notification) = from_wire_message(WireMessage::parse(frame), now) {
            store.push(notification);
        }
    }

    fn idle() -> watch::Receiver<ConnectionInfo> {
        let (_, rx) = watch::channel(Lifecycle::new(ReconnectConfig::default()).info());
        rx
    }

    #[test]
    fn counts_broker_events_and_topics() {
        let store = NotificationStore::default();
        push(&store, "MQTT_EVENT|weather|rain|1", 0);
        push(&store, "plain text", 1);
        push(&store, "MQTT_EVENT|news|headline|2", 2);
        push(&store, "MQTT_EVENT|weather|sun|3", 3);
        push(&store, "MQTT_EVENT|t|EVENT_CREATED|id|T|2025-08-15|L|false|x", 4);
        store.add_listener(|_| {});

        let stats = Stats::collect(&store, true);

        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.unique_topics, 2);
        assert_eq!(stats.topics, ["weather", "news"]);
        assert_eq!(stats.total_notifications, 5);
        assert_eq!(stats.active_listeners, 1);
        assert!(stats.is_connected, "connected flag is passed through");

        let latest = stats.latest.unwrap();
        assert_eq!(latest.title, "MQTT: weather");
        assert_eq!(latest.message, "sun");
    }

    #[test]
    fn broker_kind_without_topic_title_is_not_counted() {
        let store = NotificationStore::default();
        push(&store, r#"{"title":"Alarm","type":"mqtt"}"#, 0);
        push(&store, r#"{"title":"MQTT: sensors","type":"mqtt"}"#, 1);

        let stats = Stats::collect(&store, false);

        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.topics, ["sensors"]);
        assert_eq!(stats.total_notifications, 2);
    }

    #[test]
    fn empty_store() {
        let stats = Stats::collect(&NotificationStore::default(), false);

        assert_eq!(stats.total_messages, 0);
        assert!(stats.topics.is_empty(), "no topics");
        assert_eq!(stats.latest, None);
        assert_eq!(
            stats.to_string(),
            "MQTT message statistics\n  total MQTT messages: 0\n  unique topics: 0 []\n  \
             connected: false\n  stored notifications: 0\n  active listeners: 0"
        );
    }

    #[test]
    fn snapshot_reads_connection_state() {
        let store = Arc::new(NotificationStore::default());
        let reporter = StatsReporter::new(Arc::clone(&store), idle());

        assert!(!reporter.snapshot().is_connected, "idle is not connected");
    }

    #[tokio::test]
    async fn logger_can_be_replaced_and_stopped() {
        let reporter = StatsReporter::new(Arc::new(NotificationStore::default()), idle());
        assert!(!reporter.stop_logging(), "nothing to stop yet");

        reporter.start_logging(Duration::from_millis(10));
        reporter.start_logging(Duration::from_millis(10));
        assert!(reporter.is_logging(), "logger running");

        assert!(reporter.stop_logging(), "logger was running");
        assert!(!reporter.is_logging(), "logger stopped");
    }

    #[tokio::test]
    async fn zero_interval_is_ignored() {
        let reporter = StatsReporter::new(Arc::new(NotificationStore::default()), idle());

        reporter.start_logging(Duration::ZERO);

        assert!(!reporter.is_logging(), "zero interval must not start a logger");
    }
}
