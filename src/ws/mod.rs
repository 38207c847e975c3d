//! Core WebSocket infrastructure.
//!
//! This module owns the socket and nothing else: it connects, reconnects with
//! linear backoff, honours manual disconnects and hands every inbound text
//! frame to a [`FrameHandler`]. What a frame means is decided by the caller.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Handle to the driver task that owns the socket
//! - [`Lifecycle`]: Pure reconnect state machine used by the driver
//! - [`FrameHandler`]: Trait for consuming inbound text frames
//!
//! # Example
//!
//! ```ignore
//! let connection = ConnectionManager::new(ReconnectConfig::default(), Printer);
//! connection.connect("ws://localhost:3000/ws/events");
//! connection.send_message("TEST_MESSAGE|client|1");
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod traits;

pub use config::{LinearBackoff, ReconnectConfig};
pub use connection::{ConnectionManager, OutgoingMessage};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use lifecycle::{CloseOutcome, ConnectionInfo, ConnectionState, Lifecycle};
pub use traits::*;
