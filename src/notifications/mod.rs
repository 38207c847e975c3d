//! Real-time notification ingestion.
//!
//! Every text frame received by the [`ConnectionManager`](crate::ws::ConnectionManager)
//! flows through the same steps:
//!
//! 1. [`WireMessage::parse`] decodes the frame,
//! 2. [`from_wire_message`] builds a [`Notification`] (control frames stop here),
//! 3. [`NotificationStore::push`] stores it and calls every listener.
//!
//! [`Client`] wires these together and is what UI code talks to.

pub mod client;
pub mod factory;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod types;
pub mod wire;

pub use client::Client;
pub use factory::{format_event_date, from_wire_message};
pub use pipeline::Pipeline;
pub use stats::{Stats, StatsReporter};
pub use store::{Listener, ListenerId, NotificationStore};
pub use types::{EventData, Icon, Notification, NotificationKind};
pub use wire::{BrokerEvent, EventCreated, JsonFrame, SystemKind, WireMessage};
