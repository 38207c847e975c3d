//! Client configuration.

use std::time::Duration;

use bon::Builder;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::ws::ReconnectConfig;

/// Environment variable holding the default WebSocket endpoint
pub const WEBSOCKET_URL_VAR: &str = "EVENTHUB_WEBSOCKET_URL";
/// Environment variable overriding the stats logging period, in seconds
pub const STATS_INTERVAL_VAR: &str = "EVENTHUB_STATS_INTERVAL_SECS";

/// Number of notifications kept in memory
pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration for [`Client`](crate::notifications::Client)
///
/// # Example
///
/// ```ignore
/// let config = Config::builder()
///     .endpoint("ws://localhost:3000/ws/events")
///     .verbose_logging(false)
///     .build();
/// ```
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Endpoint used by `connect_default`. Must be a `ws://` or `wss://` URL.
    #[builder(into)]
    endpoint: Option<String>,
    /// Reconnect policy applied after abnormal closes
    #[builder(default)]
    reconnect: ReconnectConfig,
    /// Maximum number of notifications kept, newest first
    #[builder(default = DEFAULT_CAPACITY)]
    capacity: usize,
    /// How often the stats logger reports. The default is five (5) minutes.
    #[builder(default = DEFAULT_STATS_INTERVAL)]
    stats_interval: Duration,
    /// Log every broker event at `info` instead of `trace`
    #[builder(default = true)]
    verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// Reads [`WEBSOCKET_URL_VAR`] and [`STATS_INTERVAL_VAR`]; unset variables
    /// keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(WEBSOCKET_URL_VAR)
            .map(|url| validate_endpoint(&url).map(|_| url))
            .transpose()?;

        let stats_interval = match lookup(STATS_INTERVAL_VAR) {
            Some(secs) => {
                let secs: u64 = secs.trim().parse()?;
                if secs == 0 {
                    return Err(Error::validation(format!(
                        "{STATS_INTERVAL_VAR} must be at least one second"
                    )));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_STATS_INTERVAL,
        };

        Ok(Self::builder()
            .maybe_endpoint(endpoint)
            .stats_interval(stats_interval)
            .build())
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    #[must_use]
    pub fn reconnect(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    #[must_use]
    pub fn verbose_logging(&self) -> bool {
        self.verbose_logging
    }
}

/// Parse `endpoint` and check that it is a WebSocket URL.
pub fn validate_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(Error::validation(format!(
            "unsupported scheme `{scheme}` for WebSocket endpoint {endpoint}"
        ))),
    }
}
