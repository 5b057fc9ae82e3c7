//! WebSocket connection driver implementation.
//!
//! Provides [`WsClient`], [`WsHandle`], and [`WsEvents`]. One background task
//! owns the socket halves, the heartbeat timers and the reconnect timer.
//! Handles send commands and outbound messages over channels and observe the
//! task through a status watch, an event channel and shared buffers.

use std::{
    borrow::Cow,
    future::pending,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt, future::BoxFuture};
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::timeout,
};
use tokio_tungstenite::tungstenite::{
    Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use tracing::{debug, error, info, warn};

use super::{
    config::WsConfig,
    transport::{TungsteniteConnector, WsConnector, WsSink, WsSource},
    types::{SocketMessage, WsClientEvent, WsMessage, WsStatus},
};
use crate::{
    error::{TransportError, TransportResult},
    reconnect::{ReconnectDecision, ReconnectState},
    timer::Timer,
};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Reported for closures that happened without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Upper bound for the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Control commands sent from [`WsHandle`] to the background task.
#[derive(Debug)]
enum WsCommand {
    Connect,
    Disconnect {
        code: u16,
        reason: String,
        ack: oneshot::Sender<()>,
    },
    Reconnect,
    Reset {
        ack: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Shared buffers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WsBuffers {
    messages: Vec<SocketMessage>,
    last_error: Option<Arc<TransportError>>,
    reconnect_attempt: u32,
}

type SharedBuffers = Arc<Mutex<WsBuffers>>;

fn lock(shared: &Mutex<WsBuffers>) -> MutexGuard<'_, WsBuffers> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Public API: WsClient
// ---------------------------------------------------------------------------

/// Entry point for WebSocket connections.
///
/// [`spawn()`](WsClient::spawn) starts an idle background task. Use
/// [`split()`](WsClient::split) to obtain a [`WsHandle`] (for control and
/// sending) and [`WsEvents`] (for notifications), then call
/// [`WsHandle::connect`].
pub struct WsClient {
    handle: WsHandle,
    events: WsEvents,
}

impl WsClient {
    /// Validate `config` and spawn the background task using
    /// [`TungsteniteConnector`].
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn spawn(config: WsConfig) -> TransportResult<Self> {
        Self::spawn_with_connector(config, TungsteniteConnector)
    }

    /// Same as [`spawn()`](WsClient::spawn) with a custom [`WsConnector`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn spawn_with_connector<C: WsConnector>(
        config: WsConfig,
        connector: C,
    ) -> TransportResult<Self> {
        config.validate().map_err(TransportError::config)?;

        let config = Arc::new(config);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_channel_capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(WsStatus::Idle);
        let shared = SharedBuffers::default();

        let driver = WsDriver {
            reconnect: ReconnectState::new(config.reconnect),
            config,
            connector: Arc::new(connector),
            shared: Arc::clone(&shared),
            status_tx,
            event_tx,
            outbound_rx,
            opening: None,
            sink: None,
            source: None,
            ping_timer: Timer::new(),
            heartbeat_timer: Timer::new(),
            reconnect_timer: Timer::new(),
        };
        tokio::spawn(driver.run(cmd_rx));

        Ok(Self {
            handle: WsHandle {
                cmd_tx,
                outbound_tx,
                status_rx,
                shared,
            },
            events: WsEvents { rx: event_rx },
        })
    }

    /// Split the client into a control handle and event stream.
    pub fn split(self) -> (WsHandle, WsEvents) {
        (self.handle, self.events)
    }

    /// Get a reference to the control handle.
    pub fn handle(&self) -> &WsHandle {
        &self.handle
    }
}

impl Stream for WsClient {
    type Item = WsClientEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.events).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// WsHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for controlling a running WebSocket client.
///
/// The background task exits once every handle has been dropped.
#[derive(Clone)]
pub struct WsHandle {
    cmd_tx: mpsc::Sender<WsCommand>,
    outbound_tx: mpsc::Sender<WsMessage>,
    status_rx: watch::Receiver<WsStatus>,
    shared: SharedBuffers,
}

impl WsHandle {
    /// Open the socket. No-op while a socket is open or opening.
    pub async fn connect(&self) {
        self.send_command(WsCommand::Connect).await;
    }

    /// Close the socket with `code` and `reason`, stop the heartbeat and
    /// cancel every timer.
    ///
    /// Returns once the background task has processed the request, so no
    /// further events are produced for the closed connection.
    pub async fn disconnect(&self, code: u16, reason: impl Into<String>) {
        let (ack, done) = oneshot::channel();
        let cmd = WsCommand::Disconnect {
            code,
            reason: reason.into(),
            ack,
        };
        if self.send_command(cmd).await {
            let _ = done.await;
        }
    }

    /// Disconnect normally, then connect again.
    pub async fn reconnect(&self) {
        self.send_command(WsCommand::Reconnect).await;
    }

    /// Clear the message history, the last error and the attempt counter.
    /// A live connection is left untouched.
    pub async fn reset(&self) {
        let (ack, done) = oneshot::channel();
        if self.send_command(WsCommand::Reset { ack }).await {
            let _ = done.await;
        }
    }

    /// Queue `message` for sending.
    ///
    /// Returns `false`, without sending anything, unless the socket is open
    /// and the outbound queue has room.
    pub fn send(&self, message: impl Into<WsMessage>) -> bool {
        if !self.status().is_connected() {
            debug!("WebSocket not connected, message not sent");
            return false;
        }
        match self.outbound_tx.try_send(message.into()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Dropping outbound WebSocket message");
                false
            }
        }
    }

    /// Serialize `value` to JSON text and queue it like [`send`](Self::send).
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        if !self.status().is_connected() {
            debug!("WebSocket not connected, message not sent");
            return false;
        }
        match serde_json::to_string(value) {
            Ok(text) => self.send(WsMessage::Text(text)),
            Err(err) => {
                warn!(error = %err, "Failed to serialize outbound WebSocket message");
                false
            }
        }
    }

    /// Current status.
    pub fn status(&self) -> WsStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the background task has exited.
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&WsStatus) -> bool,
    ) -> Option<WsStatus> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(predicate).await.ok().map(|s| *s)
    }

    /// Every message received since the last reset, in arrival order.
    pub fn messages(&self) -> Vec<SocketMessage> {
        lock(&self.shared).messages.clone()
    }

    /// Most recent transport error.
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        lock(&self.shared).last_error.clone()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        lock(&self.shared).reconnect_attempt
    }

    async fn send_command(&self, cmd: WsCommand) -> bool {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("WebSocket background task shut down, command dropped");
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// WsEvents
// ---------------------------------------------------------------------------

/// Stream of [`WsClientEvent`]s from a WebSocket client.
///
/// Events are buffered without bound, so a slow consumer never loses one.
pub struct WsEvents {
    rx: mpsc::UnboundedReceiver<WsClientEvent>,
}

impl WsEvents {
    /// Receive the next event. `None` once the background task has exited.
    pub async fn next_event(&mut self) -> Option<WsClientEvent> {
        self.rx.recv().await
    }
}

impl Stream for WsEvents {
    type Item = WsClientEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

struct WsDriver {
    config: Arc<WsConfig>,
    connector: Arc<dyn WsConnector>,
    shared: SharedBuffers,
    status_tx: watch::Sender<WsStatus>,
    event_tx: mpsc::UnboundedSender<WsClientEvent>,
    outbound_rx: mpsc::Receiver<WsMessage>,
    reconnect: ReconnectState,
    /// Handshake in flight.
    opening: Option<BoxFuture<'static, TransportResult<(WsSink, WsSource)>>>,
    sink: Option<WsSink>,
    source: Option<WsSource>,
    /// Next heartbeat ping.
    ping_timer: Timer,
    /// Deadline for any inbound frame after a ping.
    heartbeat_timer: Timer,
    reconnect_timer: Timer,
}

impl WsDriver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<WsCommand>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!(url = %self.config.url, "WebSocket handles dropped, driver exiting");
                        self.close_gracefully(CLOSE_NORMAL, "").await;
                        self.teardown_socket();
                        self.reconnect_timer.cancel();
                        return;
                    }
                },

                opened = poll_opening(&mut self.opening) => self.on_opened(opened),

                frame = next_frame(&mut self.source) => self.on_frame(frame).await,

                Some(message) = self.outbound_rx.recv(), if self.sink.is_some() => {
                    self.write(message.into()).await;
                }

                () = self.ping_timer.fired() => self.on_ping_due().await,

                () = self.heartbeat_timer.fired() => self.on_heartbeat_failed(),

                () = self.reconnect_timer.fired() => {
                    // A disconnect cancels the timer; the flag guards the rest.
                    if self.reconnect.should_reconnect() {
                        self.start_connect();
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: WsCommand) {
        match cmd {
            WsCommand::Connect => self.connect(),
            WsCommand::Disconnect { code, reason, ack } => {
                self.disconnect(code, reason).await;
                let _ = ack.send(());
            }
            WsCommand::Reconnect => {
                info!(url = %self.config.url, "WebSocket reconnect requested");
                self.disconnect(CLOSE_NORMAL, String::new()).await;
                self.connect();
            }
            WsCommand::Reset { ack } => {
                self.reconnect.reset();
                {
                    let mut buffers = lock(&self.shared);
                    buffers.messages.clear();
                    buffers.last_error = None;
                    buffers.reconnect_attempt = 0;
                }
                debug!(url = %self.config.url, "WebSocket buffers reset");
                let _ = ack.send(());
            }
        }
    }

    fn connect(&mut self) {
        let status = *self.status_tx.borrow();
        if status.is_active() {
            debug!(%status, "WebSocket connect ignored, already active");
            return;
        }
        self.reconnect.resume();
        self.reconnect_timer.cancel();
        self.start_connect();
    }

    fn start_connect(&mut self) {
        info!(
            url = %self.config.url,
            attempt = self.reconnect.attempt(),
            "WebSocket connecting"
        );
        self.set_status(WsStatus::Connecting);

        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        let protocols = self.config.protocols.clone();
        let connect_timeout = self.config.connect_timeout;
        self.opening = Some(Box::pin(async move {
            timeout(connect_timeout, connector.connect(&url, &protocols))
                .await
                .map_err(|_| TransportError::timeout(connect_timeout))?
        }));
    }

    async fn disconnect(&mut self, code: u16, reason: String) {
        info!(url = %self.config.url, code, reason = %reason, "WebSocket connection closing (requested)");
        self.reconnect.stop();
        self.opening = None;
        self.reconnect_timer.cancel();

        if self.sink.is_some() {
            self.set_status(WsStatus::Closing);
            self.close_gracefully(code, &reason).await;
        }
        self.set_status(WsStatus::Closed);
        self.teardown_socket();
        self.emit(WsClientEvent::Closed {
            code: Some(code),
            reason,
            was_clean: true,
        });
    }

    /// Send a close frame and flush, bounded by [`CLOSE_TIMEOUT`].
    async fn close_gracefully(&mut self, code: u16, reason: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        }));
        let closing = async {
            sink.send(frame).await?;
            sink.close().await
        };
        match timeout(CLOSE_TIMEOUT, closing).await {
            Ok(Ok(())) => debug!(code, "WebSocket close frame sent"),
            Ok(Err(err)) => debug!(error = %err, "WebSocket close handshake failed"),
            Err(_) => debug!("WebSocket close handshake timed out"),
        }
    }

    /// Drop both socket halves and stop the heartbeat.
    ///
    /// Callers publish a non-connected status first so no handle can queue
    /// behind the drain.
    fn teardown_socket(&mut self) {
        self.sink = None;
        self.source = None;
        self.ping_timer.cancel();
        self.heartbeat_timer.cancel();
        self.discard_outbound();
    }

    fn discard_outbound(&mut self) {
        let mut dropped = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded unsent WebSocket messages");
        }
    }

    fn on_opened(&mut self, opened: TransportResult<(WsSink, WsSource)>) {
        match opened {
            Ok((sink, source)) => {
                info!(url = %self.config.url, "WebSocket connection established");
                // A send that raced the previous teardown must not reach this socket.
                self.discard_outbound();
                self.sink = Some(sink);
                self.source = Some(source);
                self.reconnect.on_open();
                {
                    let mut buffers = lock(&self.shared);
                    buffers.reconnect_attempt = 0;
                    buffers.last_error = None;
                }
                if let Some(heartbeat) = &self.config.heartbeat {
                    self.ping_timer.arm(heartbeat.interval);
                }
                self.set_status(WsStatus::Connected);
                self.emit(WsClientEvent::Open);
            }
            Err(err) => {
                error!(url = %self.config.url, error = %err, "WebSocket connection failed");
                self.record_error(err);
                self.set_status(WsStatus::Error);
                self.schedule_reconnect();
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<TransportResult<Message>>) {
        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                warn!(error = %err, "WebSocket read error");
                let reason = err.to_string();
                self.record_error(err);
                self.on_closed(Some(CLOSE_ABNORMAL), reason, false).await;
                return;
            }
            None => {
                warn!(url = %self.config.url, "WebSocket stream ended without a close frame");
                self.on_closed(Some(CLOSE_ABNORMAL), String::new(), false).await;
                return;
            }
        };

        // Any frame proves the peer is alive.
        self.heartbeat_timer.cancel();

        let raw = match message {
            Message::Text(text) => WsMessage::Text(text),
            Message::Binary(data) => WsMessage::Binary(Bytes::from(data)),
            Message::Ping(data) => {
                self.write(Message::Pong(data)).await;
                return;
            }
            Message::Pong(_) => return,
            Message::Close(frame) => {
                let (code, reason) = frame.map_or((None, String::new()), |f| {
                    (Some(u16::from(f.code)), f.reason.into_owned())
                });
                info!(code = ?code, reason = %reason, "WebSocket closed by peer");
                self.on_closed(code, reason, true).await;
                return;
            }
            Message::Frame(_) => return,
        };

        if raw.len() > self.config.max_message_size {
            warn!(
                size = raw.len(),
                max = self.config.max_message_size,
                "Dropping oversized WebSocket message"
            );
            return;
        }

        let message = SocketMessage::new(raw, self.config.parse_json);
        debug!(kind = ?message.kind, size = message.raw.len(), "WebSocket message received");
        lock(&self.shared).messages.push(message.clone());
        self.emit(WsClientEvent::Message(message));
    }

    async fn on_ping_due(&mut self) {
        let Some(heartbeat) = self.config.heartbeat.clone() else {
            return;
        };
        debug!("Sending WebSocket heartbeat ping");
        self.ping_timer.arm(heartbeat.interval);
        // Only the first unanswered ping starts the clock.
        self.heartbeat_timer.arm_if_idle(heartbeat.timeout);
        self.write(heartbeat.ping_message.into()).await;
    }

    fn on_heartbeat_failed(&mut self) {
        let idle = self
            .config
            .heartbeat
            .as_ref()
            .map(|heartbeat| heartbeat.timeout)
            .unwrap_or_default();
        warn!(
            url = %self.config.url,
            timeout_ms = idle.as_millis() as u64,
            "WebSocket heartbeat failed, no frame received"
        );
        self.emit(WsClientEvent::HeartbeatFailed);
        self.record_error(TransportError::stale(idle));

        // The socket is presumed dead; drop it without a closing handshake.
        self.set_status(WsStatus::Closed);
        self.teardown_socket();
        self.emit(WsClientEvent::Closed {
            code: Some(CLOSE_ABNORMAL),
            reason: "heartbeat timeout".to_string(),
            was_clean: false,
        });
        self.schedule_reconnect();
    }

    async fn write(&mut self, message: Message) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(err) = sink.send(message).await {
            warn!(error = %err, "WebSocket write failed");
            let reason = err.to_string();
            self.record_error(err);
            self.on_closed(Some(CLOSE_ABNORMAL), reason, false).await;
        }
    }

    /// The socket closed underneath us. Only abnormal closures reconnect.
    async fn on_closed(&mut self, code: Option<u16>, reason: String, was_clean: bool) {
        if was_clean && self.sink.is_some() {
            // Completes the closing handshake started by the peer.
            self.set_status(WsStatus::Closing);
            if let Some(sink) = self.sink.as_mut() {
                let _ = timeout(CLOSE_TIMEOUT, sink.close()).await;
            }
        }
        self.set_status(WsStatus::Closed);
        self.teardown_socket();
        self.emit(WsClientEvent::Closed {
            code,
            reason,
            was_clean,
        });
        if !was_clean {
            self.schedule_reconnect();
        }
    }

    fn record_error(&mut self, err: TransportError) {
        let err = Arc::new(err);
        lock(&self.shared).last_error = Some(Arc::clone(&err));
        self.emit(WsClientEvent::Error(err));
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.on_failure() {
            ReconnectDecision::Retry { attempt, delay } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "WebSocket reconnecting after backoff"
                );
                lock(&self.shared).reconnect_attempt = attempt;
                self.set_status(WsStatus::Reconnecting { attempt, delay });
                self.emit(WsClientEvent::Reconnecting { attempt, delay });
                self.reconnect_timer.arm(delay);
            }
            ReconnectDecision::Exhausted => {
                error!(
                    attempts = self.reconnect.attempt(),
                    "Max WebSocket reconnect attempts exceeded"
                );
                self.emit(WsClientEvent::MaxReconnectAttemptsReached);
            }
            ReconnectDecision::Stopped => {
                debug!("WebSocket reconnection disabled");
            }
        }
    }

    fn set_status(&self, status: WsStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(%status, "WebSocket status changed");
            self.emit(WsClientEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: WsClientEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn poll_opening(
    opening: &mut Option<BoxFuture<'static, TransportResult<(WsSink, WsSource)>>>,
) -> TransportResult<(WsSink, WsSource)> {
    match opening.as_mut() {
        Some(fut) => {
            let result = fut.await;
            *opening = None;
            result
        }
        None => pending().await,
    }
}

async fn next_frame(source: &mut Option<WsSource>) -> Option<TransportResult<Message>> {
    match source.as_mut() {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}
