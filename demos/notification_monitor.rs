//! Connects to an event gateway and logs every notification it produces.
//!
//! Run with tracing enabled:
//! ```sh
//! EVENTHUB_WEBSOCKET_URL=ws://localhost:3000/ws/events RUST_LOG=info cargo run --example notification_monitor --features tracing
//! ```
//!
//! Optionally log to a file and stop after a number of seconds:
//! ```sh
//! LOG_FILE=monitor.log MONITOR_SECS=120 RUST_LOG=debug cargo run --example notification_monitor --features tracing
//! ```

use std::fs::File;
use std::time::Duration;

use eventhub_realtime::{Client, Config};
use futures::StreamExt as _;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const FALLBACK_URL: &str = "ws://localhost:3000/ws/events";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let run_for = match std::env::var("MONITOR_SECS") {
        Ok(secs) => Duration::from_secs(secs.parse()?),
        Err(_) => Duration::from_secs(60),
    };

    let client = Client::new(Config::from_env()?);
    let mut notifications = Box::pin(client.subscribe());

    client.add_notification_listener(|notification| {
        info!(
            id = %notification.id,
            kind = %notification.kind,
            icon = %notification.icon,
            title = %notification.title,
            message = %notification.message,
            subtitle = ?notification.subtitle,
            "listener"
        );
    });

    if client.connect_default().is_err() {
        warn!(url = FALLBACK_URL, "No endpoint configured, using fallback");
        client.connect(FALLBACK_URL);
    }
    client.start_stats_logging(Some(Duration::from_secs(30)));

    let mut state = client.state_receiver();
    let monitor = async {
        loop {
            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let info = state.borrow_and_update().clone();
                    info!(
                        state = %info.state,
                        attempts = info.reconnect_attempts,
                        max = info.max_reconnect_attempts,
                        "connection"
                    );
                    if info.state.is_connected() {
                        client.send_message("TEST_MESSAGE|notification_monitor|1");
                    }
                }
                next = notifications.next() => match next {
                    Some(Ok(notification)) => info!(unread = client.unread_count(), id = %notification.id, "stream"),
                    Some(Err(e)) => warn!(error = %e, "stream"),
                    None => break,
                },
            }
        }
    };

    if tokio::time::timeout(run_for, monitor).await.is_err() {
        info!(?run_for, "Monitoring period elapsed");
    }

    info!("{}", client.mqtt_stats());
    client.disconnect();

    Ok(())
}
