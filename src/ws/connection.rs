#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::config::ReconnectConfig;
use super::error::WsError;
use super::lifecycle::{
    ABNORMAL_CLOSURE, CloseOutcome, ConnectionInfo, ConnectionState, Lifecycle, NO_STATUS_RECEIVED,
    NORMAL_CLOSURE,
};
use super::traits::FrameHandler;
use crate::Result;
use crate::config::validate_endpoint;

/// Payload accepted by [`ConnectionManager::send_message`].
///
/// Anything that is not already text is serialized to JSON before it is put
/// on the wire.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    Text(String),
    Json(Value),
}

impl OutgoingMessage {
    /// Serialize an arbitrary payload into a JSON message.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(payload)?))
    }

    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for OutgoingMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutgoingMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for OutgoingMessage {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug)]
enum Command {
    Connect(String),
    Disconnect,
    Send(String),
}

#[derive(Debug)]
enum SocketEvent {
    Opened,
    Frame(String),
    Error(WsError),
    Closed { code: u16 },
}

#[derive(Debug)]
enum Internal {
    Socket { generation: u64, event: SocketEvent },
    ReconnectDue { generation: u64 },
}

/// State shared between the handles and the driver task.
struct Shared {
    info_tx: watch::Sender<ConnectionInfo>,
    /// Disconnects already published by a handle but not yet handled by the
    /// driver. While non-zero the driver must not publish.
    pending_disconnects: AtomicUsize,
}

/// Manages the WebSocket lifecycle: connecting, reconnecting with linear
/// backoff, manual disconnects and delivering inbound frames.
///
/// All socket callbacks and timer expiries are funnelled into one driver task
/// which handles them one at a time, so the [`FrameHandler`] and the
/// reconnect state never observe interleaved events.
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(ReconnectConfig::default(), handler);
/// connection.connect("ws://localhost:3000/ws/events");
///
/// let mut info = connection.state_receiver();
/// while info.changed().await.is_ok() {
///     println!("state: {}", info.borrow().state);
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    /// Commands for the driver task
    command_tx: mpsc::UnboundedSender<Command>,
    /// Latest published connection snapshot
    info_rx: watch::Receiver<ConnectionInfo>,
    shared: Arc<Shared>,
}

impl Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("info", &*self.info_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a new connection manager and start its driver task.
    ///
    /// Must be called from within a Tokio runtime. No connection is opened
    /// until [`Self::connect`] is called. The driver stops once every clone of
    /// the manager has been dropped.
    pub fn new<H: FrameHandler>(config: ReconnectConfig, handler: H) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let lifecycle = Lifecycle::new(config);
        let (info_tx, info_rx) = watch::channel(lifecycle.info());
        let shared = Arc::new(Shared {
            info_tx,
            pending_disconnects: AtomicUsize::new(0),
        });

        let driver = Driver {
            lifecycle,
            handler,
            shared: Arc::clone(&shared),
            internal_tx,
            socket: None,
            reconnect_timer: None,
        };

        tokio::spawn(driver.run(command_rx, internal_rx));

        Self {
            command_tx,
            info_rx,
            shared,
        }
    }

    /// Open a connection to `url`, replacing any socket or pending reconnect.
    ///
    /// Resets the reconnect budget. Failures are never returned; they surface
    /// through [`Self::state`] and the log.
    pub fn connect(&self, url: &str) {
        self.command(Command::Connect(url.to_owned()));
    }

    /// Close the connection with code 1000 and stop any further reconnects.
    ///
    /// The state reported by [`Self::state`] is no longer connected once this
    /// returns; the close handshake itself completes in the background.
    pub fn disconnect(&self) {
        self.shared.info_tx.send_if_modified(|info| {
            self.shared.pending_disconnects.fetch_add(1, Ordering::SeqCst);
            info.disconnect()
        });
        self.command(Command::Disconnect);
    }

    /// Send a message if the connection is open; otherwise the message is
    /// dropped with a warning.
    pub fn send_message<M: Into<OutgoingMessage>>(&self, message: M) {
        if !self.is_connected() {
            #[cfg(feature = "tracing")]
            tracing::warn!("WebSocket is not connected, dropping outgoing message");
            return;
        }

        let text = message.into().into_text();
        #[cfg(feature = "tracing")]
        tracing::debug!(%text, "Sending WebSocket message");
        self.command(Command::Send(text));
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.info_rx.borrow().state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the latest connection snapshot.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        self.info_rx.borrow().clone()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionInfo> {
        self.info_rx.clone()
    }

    fn command(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!("Connection driver has stopped");
        }
    }
}

struct ActiveSocket {
    generation: u64,
    outgoing_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

struct Driver<H> {
    lifecycle: Lifecycle,
    handler: H,
    shared: Arc<Shared>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    socket: Option<ActiveSocket>,
    reconnect_timer: Option<CancellationToken>,
}

impl<H: FrameHandler> Driver<H> {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle_command(command);
                }
                Some(internal) = internal_rx.recv() => {
                    self.handle_internal(internal);
                }
            }
        }

        // Every handle is gone
        self.cancel_reconnect_timer();
        self.close_socket();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(url) => {
                self.cancel_reconnect_timer();

                if let Err(e) = validate_endpoint(&url) {
                    #[cfg(feature = "tracing")]
                    tracing::error!(%url, error = %e, "Failed to create WebSocket connection");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    self.lifecycle.reject_connect();
                } else {
                    self.close_socket();

                    let generation = self.lifecycle.connect(&url);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%url, generation, "Connecting");
                    self.spawn_socket(url, generation);
                }
            }
            Command::Disconnect => {
                self.shared.pending_disconnects.fetch_sub(1, Ordering::SeqCst);
                self.cancel_reconnect_timer();
                if self.lifecycle.disconnect() {
                    self.close_socket();
                    #[cfg(feature = "tracing")]
                    tracing::info!("WebSocket disconnected manually");
                }
            }
            Command::Send(text) => match &self.socket {
                Some(socket) if self.lifecycle.state().is_connected() => {
                    _ = socket.outgoing_tx.send(text);
                }
                _ => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("WebSocket closed before message could be sent");
                }
            },
        }

        self.publish();
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Socket { generation, event } => self.handle_socket(generation, event),
            Internal::ReconnectDue { generation } => {
                self.reconnect_timer = None;
                if let Some((url, generation)) = self.lifecycle.reconnect_due(generation) {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        attempt = self.lifecycle.reconnect_attempts(),
                        max = self.lifecycle.max_reconnect_attempts(),
                        "Attempting to reconnect"
                    );
                    self.spawn_socket(url, generation);
                }
            }
        }

        self.publish();
    }

    fn handle_socket(&mut self, generation: u64, event: SocketEvent) {
        match event {
            SocketEvent::Opened => {
                if self.lifecycle.on_open(generation) {
                    #[cfg(feature = "tracing")]
                    tracing::info!(url = ?self.lifecycle.last_url(), "WebSocket connected");
                }
            }
            SocketEvent::Frame(text) => {
                if generation == self.lifecycle.generation() && self.lifecycle.state().is_connected()
                {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%text, "Received WebSocket text message");
                    self.handler.on_frame(&text);
                }
            }
            SocketEvent::Error(e) => {
                // The close event that follows drives the state machine
                #[cfg(feature = "tracing")]
                tracing::error!(generation, error = %e, "WebSocket error");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
            SocketEvent::Closed { code } => {
                if self
                    .socket
                    .as_ref()
                    .is_some_and(|socket| socket.generation == generation)
                {
                    self.socket = None;
                }

                match self.lifecycle.on_close(generation, code) {
                    CloseOutcome::Stale => {}
                    CloseOutcome::Closed => {
                        #[cfg(feature = "tracing")]
                        tracing::info!(code, "WebSocket closed normally");
                    }
                    CloseOutcome::Exhausted => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            code,
                            max = self.lifecycle.max_reconnect_attempts(),
                            "Unable to reconnect, reconnect attempts exhausted"
                        );
                    }
                    CloseOutcome::Reconnect { attempt, delay } => {
                        #[cfg(feature = "tracing")]
                        tracing::info!(code, attempt, ?delay, "WebSocket closed unexpectedly");
                        #[cfg(not(feature = "tracing"))]
                        let _ = attempt;
                        self.schedule_reconnect(generation, delay);
                    }
                }
            }
        }
    }

    fn spawn_socket(&mut self, url: String, generation: u64) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(
            url,
            generation,
            self.internal_tx.clone(),
            outgoing_rx,
            cancel.clone(),
        ));

        self.socket = Some(ActiveSocket {
            generation,
            outgoing_tx,
            cancel,
        });
    }

    fn schedule_reconnect(&mut self, generation: u64, delay: Duration) {
        self.cancel_reconnect_timer();

        let token = CancellationToken::new();
        let timer_token = token.clone();
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = timer_token.cancelled() => {}
                () = sleep(delay) => {
                    _ = internal_tx.send(Internal::ReconnectDue { generation });
                }
            }
        });

        self.reconnect_timer = Some(token);
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(token) = self.reconnect_timer.take() {
            token.cancel();
        }
    }

    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.cancel.cancel();
        }
    }

    fn publish(&self) {
        let info = self.lifecycle.info();
        self.shared.info_tx.send_if_modified(|current| {
            // A handle already published a disconnect this driver has not seen
            if self.shared.pending_disconnects.load(Ordering::SeqCst) > 0 || *current == info {
                false
            } else {
                *current = info;
                true
            }
        });
    }
}

/// Drive one socket from handshake to close, reporting every event tagged
/// with `generation`. Always ends with exactly one `Closed` event.
async fn run_socket(
    url: String,
    generation: u64,
    events: mpsc::UnboundedSender<Internal>,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let emit = |event: SocketEvent| {
        _ = events.send(Internal::Socket { generation, event });
    };

    let connected = tokio::select! {
        () = cancel.cancelled() => {
            emit(SocketEvent::Closed { code: NORMAL_CLOSURE });
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            emit(SocketEvent::Error(WsError::Connection(e)));
            emit(SocketEvent::Closed {
                code: ABNORMAL_CLOSURE,
            });
            return;
        }
    };

    emit(SocketEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    let code = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Manual disconnect".into(),
                };
                _ = write.send(Message::Close(Some(frame))).await;
                break NORMAL_CLOSURE;
            }

            // Handle outgoing messages
            Some(text) = outgoing_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    emit(SocketEvent::Error(WsError::Connection(e)));
                    break ABNORMAL_CLOSURE;
                }
            }

            // Handle incoming messages
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(SocketEvent::Frame(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or(NO_STATUS_RECEIVED, |frame| u16::from(frame.code));
                    }
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol; PING is answered by tungstenite.
                    }
                    Some(Err(e)) => {
                        emit(SocketEvent::Error(WsError::Connection(e)));
                        break ABNORMAL_CLOSURE;
                    }
                    None => break ABNORMAL_CLOSURE,
                }
            }
        }
    };

    emit(SocketEvent::Closed { code });
}
