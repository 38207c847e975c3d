//! Reconnect state machine, free of any I/O.
//!
//! [`Lifecycle`] is fed the socket events (`open`, `close`) and the public
//! `connect`/`disconnect` calls and decides what the driver has to do next.
//! Every socket it asks for is tagged with a generation number; events that
//! carry an older generation belong to a superseded socket and are ignored.

use std::time::{Duration, Instant};

use backoff::backoff::Backoff as _;

use super::config::{LinearBackoff, ReconnectConfig};

/// Close code sent on a manual disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code of a peer that is going away (server shutdown, page unload).
pub const GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame, or the handshake failed.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Whether a close code ends the session without scheduling a reconnect.
#[must_use]
pub const fn is_normal_closure(code: u16) -> bool {
    matches!(code, NORMAL_CLOSURE | GOING_AWAY)
}

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not connected and nothing scheduled
    Idle,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Manual disconnect in progress
    Closing,
    /// Waiting for the reconnect timer
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
        /// Delay before the attempt fires
        delay: Duration,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// State entered on a manual disconnect. A live or pending socket moves to
    /// `Closing`, a pending reconnect is dropped.
    #[must_use]
    pub const fn after_disconnect(self) -> Self {
        match self {
            Self::Connecting | Self::Open { .. } => Self::Closing,
            Self::Reconnecting { .. } => Self::Idle,
            Self::Idle | Self::Closing => self,
        }
    }
}

/// Point-in-time view of the connection, published to observers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub last_url: Option<String>,
}

impl ConnectionInfo {
    /// Apply a manual disconnect to this snapshot. Returns whether it changed.
    pub(crate) fn disconnect(&mut self) -> bool {
        let state = self.state.after_disconnect();
        let changed =
            state != self.state || self.reconnect_attempts != self.max_reconnect_attempts;
        self.state = state;
        self.reconnect_attempts = self.max_reconnect_attempts;
        changed
    }
}

/// What the driver has to do after a socket closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The event belonged to a superseded socket
    Stale,
    /// Normal or manual closure, nothing further to do
    Closed,
    /// Abnormal closure with the reconnect budget spent
    Exhausted,
    /// Schedule a reconnect after `delay`
    Reconnect {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Delay before reconnecting
        delay: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    backoff: LinearBackoff,
    last_url: Option<String>,
    generation: u64,
}

impl Lifecycle {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            backoff: config.into(),
            last_url: None,
            generation: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempt()
    }

    #[must_use]
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.backoff.max_attempts()
    }

    #[must_use]
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// Generation of the most recently requested socket.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.state,
            reconnect_attempts: self.reconnect_attempts(),
            max_reconnect_attempts: self.max_reconnect_attempts(),
            last_url: self.last_url.clone(),
        }
    }

    /// Manual connect: starts a fresh reconnect budget and returns the
    /// generation the new socket must be tagged with. Any socket or timer of
    /// an older generation is superseded.
    pub fn connect(&mut self, url: &str) -> u64 {
        self.backoff.reset();
        self.last_url = Some(url.to_owned());
        self.begin_attempt()
    }

    /// The reconnect timer scheduled for `generation` elapsed. Returns the URL
    /// and generation of the socket to open, or `None` when the timer is no
    /// longer live.
    pub fn reconnect_due(&mut self, generation: u64) -> Option<(String, u64)> {
        if generation != self.generation
            || !matches!(self.state, ConnectionState::Reconnecting { .. })
        {
            return None;
        }

        let url = self.last_url.clone()?;
        Some((url, self.begin_attempt()))
    }

    /// Returns `true` when the open belongs to the current attempt.
    pub fn on_open(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return false;
        }

        self.state = ConnectionState::Open {
            since: Instant::now(),
        };
        self.backoff.reset();
        true
    }

    pub fn on_close(&mut self, generation: u64, code: u16) -> CloseOutcome {
        if generation != self.generation {
            return CloseOutcome::Stale;
        }

        match self.state {
            ConnectionState::Idle | ConnectionState::Reconnecting { .. } => {
                return CloseOutcome::Stale;
            }
            ConnectionState::Closing => {
                self.state = ConnectionState::Idle;
                return CloseOutcome::Closed;
            }
            ConnectionState::Connecting | ConnectionState::Open { .. } => {}
        }

        if is_normal_closure(code) {
            self.state = ConnectionState::Idle;
            return CloseOutcome::Closed;
        }

        if let Some(delay) = self.backoff.next_backoff() {
            let attempt = self.backoff.attempt();
            self.state = ConnectionState::Reconnecting { attempt, delay };
            CloseOutcome::Reconnect { attempt, delay }
        } else {
            self.state = ConnectionState::Idle;
            CloseOutcome::Exhausted
        }
    }

    /// Manual disconnect. Spends the reconnect budget so a late close takes the
    /// normal branch. Returns `true` when there is a socket left to close.
    pub fn disconnect(&mut self) -> bool {
        self.backoff.exhaust();

        let previous = self.state;
        self.state = previous.after_disconnect();
        self.state == ConnectionState::Closing && previous != ConnectionState::Closing
    }

    /// Manual connect to an endpoint that cannot be used. Restores the budget
    /// and drops a pending reconnect; an open or opening socket is kept.
    pub fn reject_connect(&mut self) {
        self.backoff.reset();
        if matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.state = ConnectionState::Idle;
        }
    }

    fn begin_attempt(&mut self) -> u64 {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.generation
    }
}
