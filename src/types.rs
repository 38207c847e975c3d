//! Re-exported types from external crates for convenience.
//!
//! These types appear in the public API and are re-exported here so users
//! don't need to add these dependencies to their `Cargo.toml`.

/// Date and time types for notification timestamps.
pub use chrono::{DateTime, FixedOffset, Utc};
/// JSON value type accepted by [`OutgoingMessage`](crate::ws::OutgoingMessage).
pub use serde_json::Value;
