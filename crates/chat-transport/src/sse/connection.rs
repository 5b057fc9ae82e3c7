//! SSE connection driver implementation.
//!
//! Provides [`SseClient`], [`SseHandle`], and [`SseEvents`]. One background
//! task owns the HTTP stream, the parser, the staleness timer and the
//! reconnect timer; handles talk to it over a command channel and observe it
//! through a status watch, an event channel and shared buffers.

use std::{
    future::pending,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future::BoxFuture};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{
    config::SseConfig,
    parse::{SseFrame, SseParser},
    transport::{ByteStream, ReqwestSseTransport, SseRequest, SseTransport},
    types::{SseClientEvent, SseStatus, StreamEvent},
};
use crate::{
    error::{TransportError, TransportResult},
    reconnect::{ReconnectDecision, ReconnectState},
    timer::Timer,
};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Control commands sent from [`SseHandle`] to the background task.
#[derive(Debug)]
enum SseCommand {
    Connect,
    Disconnect { ack: oneshot::Sender<()> },
    Reconnect,
    Reset { ack: oneshot::Sender<()> },
}

// ---------------------------------------------------------------------------
// Shared buffers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SseBuffers {
    events: Vec<StreamEvent>,
    transcript: String,
    last_event_id: Option<String>,
    last_error: Option<Arc<TransportError>>,
    reconnect_attempt: u32,
}

type SharedBuffers = Arc<Mutex<SseBuffers>>;

fn lock(shared: &Mutex<SseBuffers>) -> MutexGuard<'_, SseBuffers> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Public API: SseClient
// ---------------------------------------------------------------------------

/// Entry point for SSE connections.
///
/// [`spawn()`](SseClient::spawn) starts an idle background task. Use
/// [`split()`](SseClient::split) to obtain a [`SseHandle`] (for control) and
/// [`SseEvents`] (for notifications), then call [`SseHandle::connect`].
pub struct SseClient {
    handle: SseHandle,
    events: SseEvents,
}

impl SseClient {
    /// Validate `config` and spawn the background task using
    /// [`ReqwestSseTransport`].
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or the HTTP client
    /// cannot be built.
    pub fn spawn(config: SseConfig) -> TransportResult<Self> {
        config.validate().map_err(TransportError::config)?;
        let transport = ReqwestSseTransport::new(&config)?;
        Self::spawn_with_transport(config, transport)
    }

    /// Same as [`spawn()`](SseClient::spawn) with a custom [`SseTransport`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn spawn_with_transport<T: SseTransport>(
        config: SseConfig,
        transport: T,
    ) -> TransportResult<Self> {
        config.validate().map_err(TransportError::config)?;

        let config = Arc::new(config);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SseStatus::Idle);
        let shared = SharedBuffers::default();

        let driver = SseDriver {
            reconnect: ReconnectState::new(config.reconnect),
            config,
            transport: Arc::new(transport),
            shared: Arc::clone(&shared),
            status_tx,
            event_tx,
            parser: SseParser::new(),
            opening: None,
            body: None,
            stale_timer: Timer::new(),
            reconnect_timer: Timer::new(),
        };
        tokio::spawn(driver.run(cmd_rx));

        Ok(Self {
            handle: SseHandle {
                cmd_tx,
                status_rx,
                shared,
            },
            events: SseEvents { rx: event_rx },
        })
    }

    /// Split the client into a control handle and event stream.
    pub fn split(self) -> (SseHandle, SseEvents) {
        (self.handle, self.events)
    }

    /// Get a reference to the control handle.
    pub fn handle(&self) -> &SseHandle {
        &self.handle
    }
}

impl Stream for SseClient {
    type Item = SseClientEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.events).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// SseHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for controlling a running SSE client.
///
/// The background task exits once every handle has been dropped.
#[derive(Clone)]
pub struct SseHandle {
    cmd_tx: mpsc::Sender<SseCommand>,
    status_rx: watch::Receiver<SseStatus>,
    shared: SharedBuffers,
}

impl SseHandle {
    /// Open the stream. No-op while connecting, connected or streaming.
    pub async fn connect(&self) {
        self.send_command(SseCommand::Connect).await;
    }

    /// Abort the stream, cancel every timer and move to `Closed`.
    ///
    /// Returns once the background task has processed the request, so no
    /// further events are produced for the aborted attempt.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self.send_command(SseCommand::Disconnect { ack }).await {
            let _ = done.await;
        }
    }

    /// Disconnect, then connect again.
    pub async fn reconnect(&self) {
        self.send_command(SseCommand::Reconnect).await;
    }

    /// Clear buffered events, the transcript, the last error and the attempt
    /// counter. A live connection is left untouched.
    pub async fn reset(&self) {
        let (ack, done) = oneshot::channel();
        if self.send_command(SseCommand::Reset { ack }).await {
            let _ = done.await;
        }
    }

    /// Current status.
    pub fn status(&self) -> SseStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the background task has exited.
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&SseStatus) -> bool,
    ) -> Option<SseStatus> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(predicate).await.ok().map(|s| *s)
    }

    /// Every event received since the last reset, in arrival order.
    pub fn events(&self) -> Vec<StreamEvent> {
        lock(&self.shared).events.clone()
    }

    /// Concatenated raw data of every event since the last reset.
    pub fn transcript(&self) -> String {
        lock(&self.shared).transcript.clone()
    }

    /// Most recent resumption token seen on the stream.
    pub fn last_event_id(&self) -> Option<String> {
        lock(&self.shared).last_event_id.clone()
    }

    /// Most recent transport or staleness error.
    pub fn last_error(&self) -> Option<Arc<TransportError>> {
        lock(&self.shared).last_error.clone()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        lock(&self.shared).reconnect_attempt
    }

    async fn send_command(&self, cmd: SseCommand) -> bool {
        if self.cmd_tx.send(cmd).await.is_err() {
            warn!("SSE background task shut down, command dropped");
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// SseEvents
// ---------------------------------------------------------------------------

/// Stream of [`SseClientEvent`]s from an SSE client.
///
/// Implements [`Stream`] for use with `StreamExt` combinators. Events are
/// buffered without bound, so a slow consumer never loses one.
pub struct SseEvents {
    rx: mpsc::UnboundedReceiver<SseClientEvent>,
}

impl SseEvents {
    /// Receive the next event. `None` once the background task has exited.
    pub async fn next_event(&mut self) -> Option<SseClientEvent> {
        self.rx.recv().await
    }
}

impl Stream for SseEvents {
    type Item = SseClientEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

/// The long-lived background task that drives one SSE client.
struct SseDriver {
    config: Arc<SseConfig>,
    transport: Arc<dyn SseTransport>,
    shared: SharedBuffers,
    status_tx: watch::Sender<SseStatus>,
    event_tx: mpsc::UnboundedSender<SseClientEvent>,
    reconnect: ReconnectState,
    parser: SseParser,
    /// In-flight request, until the response head arrives.
    opening: Option<BoxFuture<'static, TransportResult<ByteStream>>>,
    /// Response body of the live connection.
    body: Option<ByteStream>,
    stale_timer: Timer,
    reconnect_timer: Timer,
}

impl SseDriver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SseCommand>) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(url = %self.config.url, "SSE handles dropped, driver exiting");
                        self.abort_io();
                        self.reconnect_timer.cancel();
                        return;
                    }
                },

                opened = poll_opening(&mut self.opening) => self.on_opened(opened),

                chunk = next_chunk(&mut self.body) => self.on_chunk(chunk),

                () = self.stale_timer.fired() => self.on_stale(),

                () = self.reconnect_timer.fired() => {
                    // A disconnect cancels the timer; the flag guards the rest.
                    if self.reconnect.should_reconnect() {
                        self.start_connect();
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: SseCommand) {
        match cmd {
            SseCommand::Connect => self.connect(),
            SseCommand::Disconnect { ack } => {
                self.disconnect();
                let _ = ack.send(());
            }
            SseCommand::Reconnect => {
                info!(url = %self.config.url, "SSE reconnect requested");
                self.disconnect();
                self.connect();
            }
            SseCommand::Reset { ack } => {
                self.reconnect.reset();
                {
                    let mut buffers = lock(&self.shared);
                    buffers.events.clear();
                    buffers.transcript.clear();
                    buffers.last_error = None;
                    buffers.reconnect_attempt = 0;
                }
                debug!(url = %self.config.url, "SSE buffers reset");
                let _ = ack.send(());
            }
        }
    }

    fn connect(&mut self) {
        let status = *self.status_tx.borrow();
        if status.is_active() {
            debug!(%status, "SSE connect ignored, already active");
            return;
        }
        self.reconnect.resume();
        self.reconnect_timer.cancel();
        self.start_connect();
    }

    fn start_connect(&mut self) {
        let last_event_id = lock(&self.shared).last_event_id.clone();
        let request = SseRequest::from_config(&self.config, last_event_id.as_deref());
        info!(
            url = %self.config.url,
            attempt = self.reconnect.attempt(),
            last_event_id = ?last_event_id,
            "SSE connecting"
        );

        self.body = None;
        self.parser = SseParser::new();
        self.set_status(SseStatus::Connecting);

        let transport = Arc::clone(&self.transport);
        self.opening = Some(Box::pin(async move { transport.open(request).await }));
        if let Some(idle) = self.config.heartbeat_timeout {
            self.stale_timer.arm(idle);
        }
    }

    fn disconnect(&mut self) {
        info!(url = %self.config.url, "SSE connection closing (requested)");
        self.reconnect.stop();
        self.abort_io();
        self.reconnect_timer.cancel();
        self.set_status(SseStatus::Closed);
        self.emit(SseClientEvent::Closed);
    }

    /// Drop the in-flight request or body; dropping is the abort.
    fn abort_io(&mut self) {
        self.opening = None;
        self.body = None;
        self.parser.finish();
        self.stale_timer.cancel();
    }

    fn on_opened(&mut self, opened: TransportResult<ByteStream>) {
        match opened {
            Ok(body) => {
                info!(url = %self.config.url, "SSE connection established");
                self.body = Some(body);
                self.reconnect.on_open();
                {
                    let mut buffers = lock(&self.shared);
                    buffers.reconnect_attempt = 0;
                    buffers.last_error = None;
                }
                self.set_status(SseStatus::Connected);
                self.emit(SseClientEvent::Open);
            }
            Err(err) => {
                error!(url = %self.config.url, error = %err, "SSE connection failed");
                self.fail(err);
            }
        }
    }

    fn on_chunk(&mut self, chunk: Option<TransportResult<Bytes>>) {
        match chunk {
            Some(Ok(bytes)) => {
                if let Some(idle) = self.config.heartbeat_timeout {
                    self.stale_timer.arm(idle);
                }
                self.set_status(SseStatus::Streaming);
                for frame in self.parser.feed(&bytes) {
                    self.on_frame(frame);
                }
            }
            Some(Err(err)) => {
                error!(url = %self.config.url, error = %err, "SSE stream error");
                self.fail(err);
            }
            None => {
                // Normal end of stream: no reconnection.
                info!(url = %self.config.url, "SSE stream ended");
                self.abort_io();
                self.set_status(SseStatus::Closed);
                self.emit(SseClientEvent::Closed);
            }
        }
    }

    fn on_frame(&mut self, frame: SseFrame) {
        match frame {
            SseFrame::LastEventId(id) => {
                lock(&self.shared).last_event_id = (!id.is_empty()).then_some(id);
            }
            SseFrame::Retry(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "SSE server set retry delay");
                self.reconnect.override_base_delay(delay);
            }
            SseFrame::Event(record) => {
                let event = StreamEvent::from_record(record, self.config.parse_json);
                debug!(
                    event_type = %event.event_type,
                    id = ?event.id,
                    "SSE event received",
                );
                {
                    let mut buffers = lock(&self.shared);
                    buffers.transcript.push_str(&event.raw);
                    buffers.events.push(event.clone());
                }
                self.emit(SseClientEvent::Message(event));
            }
        }
    }

    fn on_stale(&mut self) {
        let idle = self.config.heartbeat_timeout.unwrap_or_default();
        warn!(
            url = %self.config.url,
            idle_ms = idle.as_millis() as u64,
            "SSE stream stale, no data received"
        );
        self.fail(TransportError::stale(idle));
    }

    /// Record a qualifying failure and hand off to the reconnect policy.
    fn fail(&mut self, err: TransportError) {
        self.abort_io();

        let err = Arc::new(err);
        lock(&self.shared).last_error = Some(Arc::clone(&err));
        self.set_status(SseStatus::Error);
        self.emit(SseClientEvent::Error(err));

        match self.reconnect.on_failure() {
            ReconnectDecision::Retry { attempt, delay } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "SSE reconnecting after backoff"
                );
                lock(&self.shared).reconnect_attempt = attempt;
                self.set_status(SseStatus::Reconnecting { attempt, delay });
                self.emit(SseClientEvent::Reconnecting { attempt, delay });
                self.reconnect_timer.arm(delay);
            }
            ReconnectDecision::Exhausted => {
                error!(
                    attempts = self.reconnect.attempt(),
                    "Max SSE reconnect attempts exceeded"
                );
                self.emit(SseClientEvent::MaxReconnectAttemptsReached);
            }
            ReconnectDecision::Stopped => {
                debug!("SSE reconnection disabled, staying in error state");
            }
        }
    }

    fn set_status(&self, status: SseStatus) {
        let changed = self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!(%status, "SSE status changed");
            self.emit(SseClientEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: SseClientEvent) {
        // A dropped receiver is fine: handles can still read the buffers.
        let _ = self.event_tx.send(event);
    }
}

async fn poll_opening(
    opening: &mut Option<BoxFuture<'static, TransportResult<ByteStream>>>,
) -> TransportResult<ByteStream> {
    match opening.as_mut() {
        Some(fut) => {
            let result = fut.await;
            *opening = None;
            result
        }
        None => pending().await,
    }
}

async fn next_chunk(body: &mut Option<ByteStream>) -> Option<TransportResult<Bytes>> {
    match body.as_mut() {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, time::Duration};

    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::time::{Instant, sleep, timeout};

    use super::*;
    use crate::payload::Payload;

    enum Scripted {
        /// Yield the chunks, then end the stream.
        Body(Vec<TransportResult<Bytes>>),
        /// Forward chunks from the channel, staying open while it is.
        Feed(mpsc::UnboundedReceiver<TransportResult<Bytes>>),
        /// Never answer.
        Hang,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        requests: Arc<Mutex<Vec<SseRequest>>>,
    }

    impl MockTransport {
        fn with(script: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<SseRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl SseTransport for MockTransport {
        async fn open(&self, request: SseRequest) -> TransportResult<ByteStream> {
            self.requests.lock().expect("lock").push(request);
            let next = self.script.lock().expect("lock").pop_front();
            match next {
                Some(Scripted::Body(chunks)) => Ok(stream::iter(chunks).boxed()),
                Some(Scripted::Feed(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed()),
                Some(Scripted::Hang) => pending().await,
                None => Err(TransportError::connection_closed(Some(
                    "connection refused".to_string(),
                ))),
            }
        }
    }

    fn chunk(text: &'static str) -> TransportResult<Bytes> {
        Ok(Bytes::from_static(text.as_bytes()))
    }

    fn reset_by_peer() -> TransportResult<Bytes> {
        Err(TransportError::connection_closed(Some("reset by peer".to_string())))
    }

    fn config() -> SseConfig {
        SseConfig::new("http://chat.test/stream")
    }

    fn spawn(transport: &MockTransport, config: SseConfig) -> (SseHandle, SseEvents) {
        SseClient::spawn_with_transport(config, transport.clone())
            .expect("valid config")
            .split()
    }

    async fn next(events: &mut SseEvents) -> SseClientEvent {
        timeout(Duration::from_secs(600), events.next_event())
            .await
            .expect("event before timeout")
            .expect("driver alive")
    }

    /// Next event that is not a status change.
    async fn next_notable(events: &mut SseEvents) -> SseClientEvent {
        loop {
            match next(events).await {
                SseClientEvent::StatusChanged(_) => continue,
                other => return other,
            }
        }
    }

    async fn assert_quiet(events: &mut SseEvents) {
        let extra = timeout(Duration::from_secs(600), events.next_event()).await;
        assert!(extra.is_err(), "unexpected event: {extra:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn single_event_then_end_closes_without_reconnect() {
        let transport = MockTransport::with(vec![Scripted::Body(vec![chunk("data: hello\n\n")])]);
        let (handle, mut events) = spawn(&transport, config());
        assert_eq!(handle.status(), SseStatus::Idle);

        handle.connect().await;

        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Connecting)
        ));
        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Connected)
        ));
        assert!(matches!(next(&mut events).await, SseClientEvent::Open));
        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Streaming)
        ));
        match next(&mut events).await {
            SseClientEvent::Message(event) => {
                assert_eq!(event.event_type, "message");
                assert_eq!(event.data, Payload::Text("hello".to_string()));
                assert_eq!(event.raw, "hello");
            }
            other => panic!("expected message, got {other:?}"),
        }
        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Closed)
        ));
        assert!(matches!(next(&mut events).await, SseClientEvent::Closed));

        assert_quiet(&mut events).await;
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(handle.status(), SseStatus::Closed);
        assert_eq!(handle.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_and_transcript_accumulate_until_reset() {
        let transport = MockTransport::with(vec![Scripted::Body(vec![
            chunk("data: Hel"),
            chunk("lo\n\nevent: delta\ndata: {\"a\":1}\n\n"),
        ])]);
        let (handle, _events) = spawn(&transport, config());

        handle.connect().await;
        handle
            .wait_for_status(|s| *s == SseStatus::Closed)
            .await
            .expect("driver alive");

        let received = handle.events();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].raw, "Hello");
        assert_eq!(received[1].event_type, "delta");
        assert_eq!(received[1].data, Payload::Json(serde_json::json!({"a": 1})));
        assert_eq!(handle.transcript(), "Hello{\"a\":1}");

        handle.reset().await;
        assert!(handle.events().is_empty());
        assert!(handle.transcript().is_empty());
        assert!(handle.last_error().is_none());
        assert_eq!(handle.status(), SseStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_until_attempts_are_exhausted() {
        let transport = MockTransport::default();
        let (handle, mut events) = spawn(
            &transport,
            config().heartbeat_timeout(None).max_reconnect_attempts(3),
        );
        let start = Instant::now();

        handle.connect().await;

        let mut errors = 0;
        let mut scheduled = Vec::new();
        loop {
            match next_notable(&mut events).await {
                SseClientEvent::Error(_) => errors += 1,
                SseClientEvent::Reconnecting { attempt, delay } => {
                    scheduled.push((attempt, delay.as_millis() as u64));
                }
                SseClientEvent::MaxReconnectAttemptsReached => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }

        assert_eq!(scheduled, vec![(1, 1000), (2, 2000), (3, 4000)]);
        assert_eq!(errors, 4);
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert!(start.elapsed() < Duration::from_secs(8));

        assert_quiet(&mut events).await;
        assert_eq!(transport.requests().len(), 4);
        assert_eq!(handle.status(), SseStatus::Error);
        assert_eq!(handle.reconnect_attempt(), 3);
        assert!(handle.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_after_exhaustion_starts_over() {
        let transport = MockTransport::default();
        let (handle, mut events) = spawn(
            &transport,
            config().heartbeat_timeout(None).max_reconnect_attempts(1),
        );

        handle.connect().await;
        while !matches!(
            next_notable(&mut events).await,
            SseClientEvent::MaxReconnectAttemptsReached
        ) {}

        handle.connect().await;
        loop {
            if let SseClientEvent::Reconnecting { attempt, delay } = next_notable(&mut events).await {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(1));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let transport = MockTransport::default();
        let (handle, mut events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;
        while !matches!(
            next_notable(&mut events).await,
            SseClientEvent::Reconnecting { .. }
        ) {}

        handle.disconnect().await;
        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Closed)
        ));
        assert!(matches!(next(&mut events).await, SseClientEvent::Closed));

        assert_quiet(&mut events).await;
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(handle.status(), SseStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_from_idle_closes() {
        let transport = MockTransport::default();
        let (handle, mut events) = spawn(&transport, config());

        handle.disconnect().await;

        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Closed)
        ));
        assert!(matches!(next(&mut events).await, SseClientEvent::Closed));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn server_retry_overrides_next_delay() {
        let transport = MockTransport::with(vec![Scripted::Body(vec![
            chunk("retry: 5000\ndata: x\n\n"),
            reset_by_peer(),
        ])]);
        let (handle, mut events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;

        loop {
            if let SseClientEvent::Reconnecting { attempt, delay } = next_notable(&mut events).await {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(5000));
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempts() {
        let transport = MockTransport::with(vec![
            Scripted::Body(vec![reset_by_peer()]),
            Scripted::Body(vec![reset_by_peer()]),
        ]);
        let (handle, mut events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;

        let mut scheduled = Vec::new();
        while scheduled.len() < 3 {
            if let SseClientEvent::Reconnecting { attempt, delay } = next_notable(&mut events).await {
                scheduled.push((attempt, delay.as_millis() as u64));
            }
        }
        // Both scripted bodies open before failing; the third request is refused.
        assert_eq!(scheduled, vec![(1, 1000), (1, 1000), (2, 2000)]);
        handle.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silence_is_treated_as_stale() {
        let (feed, rx) = mpsc::unbounded_channel();
        let transport = MockTransport::with(vec![Scripted::Feed(rx)]);
        let (handle, mut events) = spawn(&transport, config());
        let start = Instant::now();

        handle.connect().await;
        assert!(matches!(next_notable(&mut events).await, SseClientEvent::Open));

        // Any chunk counts as liveness, even a lone comment line.
        for _ in 0..3 {
            sleep(Duration::from_secs(20)).await;
            feed.send(chunk(": keep-alive\n")).expect("driver reading");
        }
        assert_eq!(handle.status(), SseStatus::Streaming);

        match next_notable(&mut events).await {
            SseClientEvent::Error(err) => assert!(err.is_staleness()),
            other => panic!("expected stale error, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(90));
        assert!(matches!(
            next_notable(&mut events).await,
            SseClientEvent::Reconnecting { attempt: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_staleness_window_survives_rearming() {
        let transport = MockTransport::with(vec![Scripted::Body(vec![
            chunk("data: a\n\n"),
            chunk("data: b\n\n"),
        ])]);
        let (handle, mut events) = spawn(
            &transport,
            config().heartbeat_timeout(Some(Duration::MAX)),
        );

        handle.connect().await;

        let mut raw = Vec::new();
        loop {
            match next_notable(&mut events).await {
                SseClientEvent::Open => {}
                SseClientEvent::Message(event) => raw.push(event.raw),
                SseClientEvent::Closed => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(raw, vec!["a", "b"]);
        assert_eq!(handle.status(), SseStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn last_event_id_is_sent_on_reconnect() {
        let transport = MockTransport::with(vec![Scripted::Body(vec![
            chunk("id: 42\ndata: a\n\n"),
            reset_by_peer(),
        ])]);
        let (handle, mut events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;
        let mut errors = 0;
        while errors < 2 {
            if let SseClientEvent::Error(_) = next_notable(&mut events).await {
                errors += 1;
            }
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].headers.get("last-event-id").is_none());
        assert_eq!(
            requests[1].headers.get("last-event-id").map(|v| v.as_bytes()),
            Some(b"42".as_slice())
        );
        assert_eq!(handle.last_event_id().as_deref(), Some("42"));

        // Reset keeps the resumption token.
        handle.reset().await;
        assert_eq!(handle.last_event_id().as_deref(), Some("42"));
        assert_eq!(handle.reconnect_attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_while_active() {
        let transport = MockTransport::with(vec![Scripted::Hang]);
        let (handle, _events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;
        handle.connect().await;
        sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.requests().len(), 1);
        assert_eq!(handle.status(), SseStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_restarts_a_live_stream() {
        let (_feed, rx) = mpsc::unbounded_channel();
        let transport = MockTransport::with(vec![Scripted::Feed(rx), Scripted::Hang]);
        let (handle, mut events) = spawn(&transport, config().heartbeat_timeout(None));

        handle.connect().await;
        assert!(matches!(next_notable(&mut events).await, SseClientEvent::Open));

        handle.reconnect().await;
        assert!(matches!(next_notable(&mut events).await, SseClientEvent::Closed));
        assert!(matches!(
            next(&mut events).await,
            SseClientEvent::StatusChanged(SseStatus::Connecting)
        ));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn spawn_rejects_invalid_config() {
        let result = SseClient::spawn_with_transport(SseConfig::default(), MockTransport::default());
        assert!(matches!(result, Err(TransportError::Config { .. })));
    }
}
