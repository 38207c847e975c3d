#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use eventhub_realtime::notifications::{Client, Notification, NotificationKind};
use eventhub_realtime::ws::{ConnectionInfo, ConnectionState, ReconnectConfig};
use eventhub_realtime::Config;
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Mock event gateway.
///
/// Greets every connection with a `WEBSOCKET_CONNECTED` frame, relays frames
/// to all clients and can close connections with a chosen code, drop them
/// abruptly or refuse the handshake altogether.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast frames to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// `Some(code)` sends a close frame, `None` drops the TCP stream
    close_tx: broadcast::Sender<Option<u16>>,
    /// Text frames sent by clients
    received_rx: mpsc::UnboundedReceiver<String>,
    /// Close codes sent by clients
    client_close_rx: mpsc::UnboundedReceiver<u16>,
    accepted: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (close_tx, _) = broadcast::channel::<Option<u16>>(10);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let (client_close_tx, client_close_rx) = mpsc::unbounded_channel::<u16>();
        let accepted = Arc::new(AtomicUsize::new(0));
        let refuse = Arc::new(AtomicBool::new(false));

        let broadcast_tx = message_tx.clone();
        let close_broadcast = close_tx.clone();
        let accept_count = Arc::clone(&accepted);
        let refusing = Arc::clone(&refuse);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let connection = accept_count.fetch_add(1, Ordering::SeqCst) + 1;

                if refusing.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }

                let mut msg_rx = broadcast_tx.subscribe();
                let mut close_rx = close_broadcast.subscribe();
                let received_tx = received_tx.clone();
                let client_close_tx = client_close_tx.clone();

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    let (mut write, mut read) = ws_stream.split();

                    let greeting = format!("WEBSOCKET_CONNECTED|conn{connection}|1752050873974");
                    if write.send(Message::Text(greeting.into())).await.is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            // Handle incoming messages from client
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        let code = frame.map_or(1005, |frame| u16::from(frame.code));
                                        drop(client_close_tx.send(code));
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            // Handle outgoing messages to client
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                            command = close_rx.recv() => {
                                if let Ok(Some(code)) = command {
                                    let frame = CloseFrame {
                                        code: CloseCode::from(code),
                                        reason: "server closing".into(),
                                    };
                                    drop(write.send(Message::Close(Some(frame))).await);
                                }
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            close_tx,
            received_rx,
            client_close_rx,
            accepted,
            refuse,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws/events", self.addr)
    }

    /// Send a frame to all connected clients.
    fn send(&self, frame: &str) {
        drop(self.message_tx.send(frame.to_owned()));
    }

    /// Close every open connection with `code`.
    fn close_all(&self, code: u16) {
        drop(self.close_tx.send(Some(code)));
    }

    /// Drop every open connection without a close frame.
    fn drop_all(&self) {
        drop(self.close_tx.send(None));
    }

    fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Receive the next frame sent by a client.
    async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next close code sent by a client.
    async fn recv_client_close(&mut self) -> Option<u16> {
        timeout(Duration::from_secs(2), self.client_close_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

fn config(max_attempts: u32, step: Duration) -> Config {
    Config::builder()
        .reconnect(ReconnectConfig::new(max_attempts, step))
        .verbose_logging(false)
        .build()
}

/// Wait until the published connection info satisfies `predicate`.
async fn wait_for<F>(client: &Client, predicate: F) -> ConnectionInfo
where
    F: FnMut(&ConnectionInfo) -> bool,
{
    let mut rx = client.state_receiver();
    timeout(Duration::from_secs(3), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for connection state")
        .unwrap()
        .clone()
}

async fn wait_connected(client: &Client) -> ConnectionInfo {
    wait_for(client, |info| info.state.is_connected()).await
}

async fn wait_idle(client: &Client) -> ConnectionInfo {
    wait_for(client, |info| info.state == ConnectionState::Idle).await
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn broker_event_reaches_store_and_stream() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));
        let mut stream = Box::pin(client.subscribe());

        client.connect(&server.ws_url());
        let info = wait_connected(&client).await;
        assert_eq!(info.last_url.as_deref(), Some(server.ws_url().as_str()));
        assert!(client.connection_status(), "client reports connected");

        server.send("MQTT_EVENT|weather|rain|169999999");

        let notification = timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(notification.kind, NotificationKind::Mqtt);
        assert_eq!(notification.title, "MQTT: weather");
        assert_eq!(notification.message, "rain");

        // The greeting is a system frame and never stored
        assert_eq!(client.notifications(), [notification]);
    }

    #[tokio::test]
    async fn event_created_frame() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));
        let mut stream = Box::pin(client.subscribe());

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        server.send(
            "MQTT_EVENT|topic1|EVENT_CREATED|id1|Birthday|2025-08-15T10:00:00Z|Park|false|extra1|extra2",
        );

        let notification = timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(notification.kind, NotificationKind::Event);
        assert_eq!(notification.title, "Birthday");
        assert_eq!(notification.message, "Park");
        assert_eq!(notification.subtitle.as_deref(), Some("Fr., 15. Aug. 2025, 10:00"));
        let data = notification.event_data.unwrap();
        assert_eq!(data.id, "id1");
        assert!(!data.is_private, "event is public");
    }

    #[tokio::test]
    async fn listeners_receive_frames_in_arrival_order() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        client.add_notification_listener(move |n| drop(tx.send(n.clone())));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        server.send("KEEPALIVE|1");
        server.send(r#"{"title":"Reminder","content":"Soccer at 5","type":"reminder"}"#);
        server.send("COMMUNITY_JOINED|42|Lena");
        server.send("Welcome back!");

        let mut titles = Vec::new();
        for _ in 0..3 {
            let notification = timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            titles.push(notification.title);
        }

        assert_eq!(titles, ["Reminder", "Server Nachricht", "Neue Nachricht"]);
        assert_eq!(client.unread_count(), 3);
        assert_eq!(client.mqtt_stats().total_notifications, 3);
    }
}

mod sending {
    use super::*;

    #[tokio::test]
    async fn text_and_json_payloads_reach_server() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        client.send_message("TEST_MESSAGE|client|1");
        client.send_message(json!({ "action": "join", "community": 7 }));

        assert_eq!(server.recv().await.as_deref(), Some("TEST_MESSAGE|client|1"));
        assert_eq!(
            server.recv().await.as_deref(),
            Some(r#"{"action":"join","community":7}"#)
        );
    }

    #[tokio::test]
    async fn send_while_disconnected_is_dropped() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));

        client.send_message("lost");

        client.connect(&server.ws_url());
        wait_connected(&client).await;
        client.send_message("delivered");

        assert_eq!(server.recv().await.as_deref(), Some("delivered"));
    }
}

mod reconnection {
    use super::*;

    #[tokio::test]
    async fn dropped_connection_reconnects() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        server.drop_all();
        wait_for(&client, |info| {
            matches!(info.state, ConnectionState::Reconnecting { attempt: 1, .. })
        })
        .await;

        let info = wait_connected(&client).await;
        assert_eq!(info.reconnect_attempts, 0, "open resets the counter");
        assert_eq!(server.accepted(), 2);
    }

    #[tokio::test]
    async fn abnormal_close_code_reconnects() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(50)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        server.close_all(4000);
        wait_for(&client, |info| {
            matches!(info.state, ConnectionState::Reconnecting { .. })
        })
        .await;
        wait_connected(&client).await;

        assert_eq!(server.accepted(), 2);
    }

    #[tokio::test]
    async fn normal_close_codes_do_not_reconnect() {
        for code in [1000, 1001] {
            let server = MockWsServer::start().await;
            let client = Client::new(config(5, Duration::from_millis(20)));

            client.connect(&server.ws_url());
            wait_connected(&client).await;

            server.close_all(code);
            wait_idle(&client).await;
            sleep(Duration::from_millis(150)).await;

            assert_eq!(server.accepted(), 1, "code {code} must not reconnect");
            assert_eq!(client.connection_state(), ConnectionState::Idle);
        }
    }

    #[tokio::test]
    async fn reconnect_budget_is_exhausted() {
        let server = MockWsServer::start().await;
        server.refuse_connections(true);
        let client = Client::new(config(3, Duration::from_millis(20)));

        client.connect(&server.ws_url());
        let info = wait_for(&client, |info| {
            info.state == ConnectionState::Idle && info.reconnect_attempts == 3
        })
        .await;
        assert_eq!(info.max_reconnect_attempts, 3);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(server.accepted(), 4, "initial attempt plus three reconnects");
        assert_eq!(client.connection_state(), ConnectionState::Idle);

        // Only a manual connect starts over
        server.refuse_connections(false);
        client.connect(&server.ws_url());
        let info = wait_connected(&client).await;
        assert_eq!(info.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let server = MockWsServer::start().await;
        server.refuse_connections(true);
        let client = Client::new(config(5, Duration::from_millis(200)));

        client.connect(&server.ws_url());
        wait_for(&client, |info| {
            matches!(info.state, ConnectionState::Reconnecting { attempt: 1, .. })
        })
        .await;

        client.disconnect();
        wait_idle(&client).await;

        sleep(Duration::from_millis(500)).await;
        assert_eq!(server.accepted(), 1, "no reconnect after disconnect");
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn invalid_endpoint_cancels_pending_reconnect() {
        let server = MockWsServer::start().await;
        server.refuse_connections(true);
        let client = Client::new(config(5, Duration::from_millis(200)));

        client.connect(&server.ws_url());
        wait_for(&client, |info| {
            matches!(info.state, ConnectionState::Reconnecting { attempt: 1, .. })
        })
        .await;

        client.connect("http://localhost:3000/ws/events");
        let info = wait_idle(&client).await;
        assert_eq!(info.reconnect_attempts, 0, "manual connect restores the budget");
        assert_eq!(info.last_url.as_deref(), Some(server.ws_url().as_str()));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(server.accepted(), 1, "pending reconnect was cancelled");
        assert_eq!(client.connection_state(), ConnectionState::Idle);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn disconnect_reports_status_immediately() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(20)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        client.disconnect();

        assert!(!client.connection_status(), "status drops before the close handshake");
        assert_eq!(client.connection_state(), ConnectionState::Closing);
        assert_eq!(client.reconnect_attempts(), 5);

        assert_eq!(server.recv_client_close().await, Some(1000));
        let info = wait_idle(&client).await;
        assert_eq!(info.reconnect_attempts, 5);
        assert!(!client.connection_status(), "client stays disconnected");
    }

    #[tokio::test]
    async fn disconnect_closes_with_normal_code() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(20)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        client.disconnect();

        assert_eq!(server.recv_client_close().await, Some(1000));
        wait_idle(&client).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.accepted(), 1, "manual disconnect never reconnects");
        assert!(!client.connection_status(), "client reports disconnected");
    }

    #[tokio::test]
    async fn connect_replaces_existing_socket() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(20)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;

        client.connect(&server.ws_url());

        assert_eq!(server.recv_client_close().await, Some(1000));
        wait_connected(&client).await;
        assert_eq!(server.accepted(), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_absorbed() {
        let client = Client::new(config(1, Duration::from_millis(10)));

        // Nothing listens on the discard port
        client.connect("ws://127.0.0.1:9/ws/events");

        let info = wait_for(&client, |info| {
            info.state == ConnectionState::Idle && info.reconnect_attempts == 1
        })
        .await;
        assert_eq!(info.last_url.as_deref(), Some("ws://127.0.0.1:9/ws/events"));
    }

    #[tokio::test]
    async fn stats_logging_stops_on_disconnect() {
        let server = MockWsServer::start().await;
        let client = Client::new(config(5, Duration::from_millis(20)));

        client.connect(&server.ws_url());
        wait_connected(&client).await;
        client.start_stats_logging(Some(Duration::from_millis(20)));
        assert!(client.mqtt_stats().is_connected, "stats see the open socket");

        client.disconnect();

        assert!(!client.is_stats_logging(), "disconnect stops stats logging");
    }
}
