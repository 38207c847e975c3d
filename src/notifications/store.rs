use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_stream::stream;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::types::Notification;
use crate::Result;
use crate::ws::WsError;

/// Buffer of the async subscription channel
const SUBSCRIPTION_BUFFER: usize = 256;

/// Callback invoked for every stored notification.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Handle returned by [`NotificationStore::add_listener`], used to remove the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Bounded, newest-first notification buffer with listener fan-out.
///
/// [`Self::push`] stores the notification, evicting the oldest entries beyond
/// capacity, and then calls every registered listener before returning. A
/// panicking listener is logged and skipped; the remaining listeners still
/// run.
pub struct NotificationStore {
    entries: RwLock<VecDeque<Notification>>,
    capacity: usize,
    listeners: DashMap<ListenerId, Listener>,
    next_listener_id: AtomicU64,
    broadcast_tx: broadcast::Sender<Notification>,
}

impl fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    /// Create a store keeping at most `capacity` notifications (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (broadcast_tx, _) = broadcast::channel(SUBSCRIPTION_BUFFER);

        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            broadcast_tx,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `notification` at the head and notify every listener.
    pub fn push(&self, notification: Notification) {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.push_front(notification.clone());
            entries.truncate(self.capacity);
        }

        // Listeners may register, remove or push again from inside the callback
        let mut listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        listeners.sort_unstable_by_key(|(id, _)| *id);

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&notification))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(listener = id.0, "Notification listener panicked");
                #[cfg(not(feature = "tracing"))]
                let _ = id;
            }
        }

        // No subscribers is fine
        _ = self.broadcast_tx.send(notification);
    }

    /// Register a callback for every future notification.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Snapshot of all notifications, newest first.
    #[must_use]
    pub fn all(&self) -> Vec<Notification> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Mark every notification with `id` as read. Returns whether any matched.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut found = false;
        for notification in entries.iter_mut().filter(|n| n.id == id) {
            notification.read = true;
            found = true;
        }
        found
    }

    pub fn mark_all_read(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for notification in entries.iter_mut() {
            notification.read = true;
        }
    }

    /// Remove every notification with `id`. Returns whether any matched.
    pub fn delete(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|notification| notification.id != id);
        entries.len() != before
    }

    /// Remove all notifications. Listeners are not notified.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|notification| !notification.read)
            .count()
    }

    /// Stream of every notification pushed after this call.
    ///
    /// A consumer that falls behind receives [`WsError::Lagged`] once and
    /// then continues with the newest notifications.
    pub fn subscribe(&self) -> impl Stream<Item = Result<Notification>> + use<> {
        let mut rx = self.broadcast_tx.subscribe();

        stream! {
            loop {
                match rx.recv().await {
                    Ok(notification) => yield Ok(notification),
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Notification subscription lagged, missed {n} notifications");
                        yield Err(WsError::Lagged { count: n }.into());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
