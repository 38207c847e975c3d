use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

use super::factory::from_wire_message;
use super::store::NotificationStore;
use super::types::Notification;
use super::wire::WireMessage;
use crate::ws::FrameHandler;

/// Frame → [`WireMessage`] → [`Notification`] → [`NotificationStore`].
#[derive(Debug)]
pub struct Pipeline {
    store: Arc<NotificationStore>,
    verbose: AtomicBool,
    /// Timestamp of the last notification built, kept strictly increasing so
    /// that timestamp-derived ids stay unique
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(store: Arc<NotificationStore>, verbose: bool) -> Self {
        Self {
            store,
            verbose: AtomicBool::new(verbose),
            last_timestamp: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn set_verbose(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::info!(enabled, "Verbose broker event logging");
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    /// Run one frame through the pipeline. Returns the stored notification,
    /// or `None` for empty and control frames.
    pub fn process(&self, frame: &str) -> Option<Notification> {
        if frame.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Empty frame received, ignoring");
            return None;
        }

        let message = WireMessage::parse(frame);

        match &message {
            WireMessage::System(kind) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%kind, "System message filtered");
                #[cfg(not(feature = "tracing"))]
                let _ = kind;
                return None;
            }
            WireMessage::BrokerEvent(_) | WireMessage::EventCreated(_) if self.is_verbose() => {
                #[cfg(feature = "tracing")]
                tracing::info!(?message, "Broker event received");
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?message, "Frame decoded");
            }
        }

        let notification = from_wire_message(message, self.next_timestamp())?;
        self.store.push(notification.clone());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            id = %notification.id,
            title = %notification.title,
            stored = self.store.len(),
            listeners = self.store.listener_count(),
            "Notification stored"
        );

        Some(notification)
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let next = match *last {
            Some(previous) if now <= previous => previous + TimeDelta::milliseconds(1),
            _ => now,
        };

        *last = Some(next);
        next
    }
}

impl FrameHandler for Pipeline {
    fn on_frame(&self, frame: &str) {
        _ = self.process(frame);
    }
}
