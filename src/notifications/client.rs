use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;

use super::pipeline::Pipeline;
use super::stats::{Stats, StatsReporter};
use super::store::{ListenerId, NotificationStore};
use super::types::Notification;
use crate::Result;
use crate::config::Config;
use crate::error::Error;
use crate::ws::{ConnectionInfo, ConnectionManager, ConnectionState, OutgoingMessage};

/// Real-time notification client.
///
/// Owns the connection, the notification store and the diagnostics. Create
/// one per session and share it by reference; dropping it closes the socket
/// and stops every background task.
///
/// None of the operations fail: socket problems are retried or logged and
/// show up through [`Self::connection_status`] and
/// [`Self::connection_state`].
///
/// # Example
///
/// ```ignore
/// let client = Client::new(Config::default());
/// let listener = client.add_notification_listener(|n| println!("{}: {}", n.title, n.message));
/// client.connect("ws://localhost:3000/ws/events");
/// // ...
/// client.remove_notification_listener(listener);
/// client.disconnect();
/// ```
#[derive(Debug)]
pub struct Client {
    config: Config,
    pipeline: Arc<Pipeline>,
    connection: ConnectionManager,
    stats: StatsReporter,
}

impl Client {
    /// Create a client. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(NotificationStore::new(config.capacity()));
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            config.verbose_logging(),
        ));
        let connection = ConnectionManager::new(config.reconnect().clone(), Arc::clone(&pipeline));
        let stats = StatsReporter::new(store, connection.state_receiver());

        Self {
            config,
            pipeline,
            connection,
            stats,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to `url`, replacing any current connection and restoring the
    /// reconnect budget.
    pub fn connect(&self, url: &str) {
        self.connection.connect(url);
    }

    /// Connect to the endpoint from [`Config`].
    pub fn connect_default(&self) -> Result<()> {
        let endpoint = self
            .config
            .endpoint()
            .ok_or_else(|| Error::validation("no default endpoint configured"))?;

        self.connect(endpoint);
        Ok(())
    }

    /// Close the connection, stop reconnecting and stop the stats logger.
    pub fn disconnect(&self) {
        self.connection.disconnect();
        self.stats.stop_logging();
    }

    /// Send a message; dropped with a warning unless the connection is open.
    pub fn send_message<M: Into<OutgoingMessage>>(&self, message: M) {
        self.connection.send_message(message);
    }

    #[must_use]
    pub fn connection_status(&self) -> bool {
        self.connection.is_connected()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.connection.info().reconnect_attempts
    }

    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.connection.info().last_url
    }

    /// Watch connection changes, e.g. for a status indicator.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionInfo> {
        self.connection.state_receiver()
    }

    /// Snapshot of the stored notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.store().all()
    }

    pub fn add_notification_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.store().add_listener(listener)
    }

    pub fn remove_notification_listener(&self, id: ListenerId) -> bool {
        self.store().remove_listener(id)
    }

    /// Stream of every notification stored from now on.
    pub fn subscribe(&self) -> impl Stream<Item = Result<Notification>> + use<> {
        self.store().subscribe()
    }

    pub fn clear_notifications(&self) {
        self.store().clear();
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.store().mark_read(id)
    }

    pub fn mark_all_read(&self) {
        self.store().mark_all_read();
    }

    pub fn delete_notification(&self, id: &str) -> bool {
        self.store().delete(id)
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.store().unread_count()
    }

    /// Broker-event statistics.
    #[must_use]
    pub fn mqtt_stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// Log [`Self::mqtt_stats`] periodically, every `interval` or the
    /// configured interval. Replaces a running logger.
    pub fn start_stats_logging(&self, interval: Option<Duration>) {
        self.stats
            .start_logging(interval.unwrap_or(self.config.stats_interval()));
    }

    pub fn stop_stats_logging(&self) -> bool {
        self.stats.stop_logging()
    }

    #[must_use]
    pub fn is_stats_logging(&self) -> bool {
        self.stats.is_logging()
    }

    /// Log every broker event at `info` when enabled, at `trace` otherwise.
    pub fn set_verbose_logging(&self, enabled: bool) {
        self.pipeline.set_verbose(enabled);
    }

    /// Run `frame` through the pipeline as if it had arrived on the socket.
    pub fn inject_frame(&self, frame: &str) -> Option<Notification> {
        #[cfg(feature = "tracing")]
        tracing::debug!(%frame, "Injecting frame");
        self.pipeline.process(frame)
    }

    fn store(&self) -> &NotificationStore {
        self.pipeline.store()
    }
}
