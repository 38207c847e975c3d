#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Backoff;

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_STEP_DURATION: Duration = Duration::from_secs(2);

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up.
    /// Only a manual `connect` starts a fresh budget once it is spent.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `step * n`.
    pub step: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            step: DEFAULT_RECONNECT_STEP_DURATION,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn new(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, step }
    }
}

impl From<ReconnectConfig> for LinearBackoff {
    fn from(config: ReconnectConfig) -> Self {
        LinearBackoff::new(config.step, config.max_attempts)
    }
}

/// Backoff whose delay grows by a fixed step per attempt and which stops
/// yielding delays once `max_attempts` have been handed out.
///
/// The attempt counter doubles as the connection's `reconnect_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearBackoff {
    step: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl LinearBackoff {
    #[must_use]
    pub fn new(step: Duration, max_attempts: u32) -> Self {
        Self {
            step,
            max_attempts,
            attempt: 0,
        }
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Spend the whole budget so that no further delay is produced.
    pub fn exhaust(&mut self) {
        self.attempt = self.max_attempts;
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        self.attempt += 1;
        Some(self.step.saturating_mul(self.attempt))
    }
}
