//! Session lifecycle: connect, supervise background work, tear down.
//!
//! # Disconnect protocol
//!
//! Any number of callers may trigger a disconnect at once: the user, the
//! heartbeat, the relay, the supervisor. The state cell arbitrates, and it
//! carries the attempt generation so a trigger aimed at one attempt can never
//! land on the next:
//!
//! 1. `(generation, Connecting | Connected) → (generation, Disconnecting)`.
//!    Anything else means someone else already won.
//! 2. Exactly one caller wins the exchange. Only the winner writes the
//!    disconnect record and cancels the attempt.
//! 3. Cleanup runs once both the record is written and, for a supervised
//!    attempt, every background task has stopped. Ownership flags on the
//!    attempt, flipped with atomic bit operations, pick who runs it: the
//!    winner or the supervisor.
//! 4. Callers that wait (winner or not) wait on the attempt's teardown latch,
//!    which cleanup releases as its very last step.
//!
//! No transition takes a lock. Two short `parking_lot` mutexes publish the
//! current attempt and hold the disconnect record; neither is held across an
//! `.await` or while a transition is decided.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use uuid::Uuid;

use crate::error::{CapturedError, Error, Result};
use crate::transport::{BackgroundTask, InboundSender, RawMessage, Transport};

use super::builder::SessionBuilder;
use super::cancellation::CancellationHierarchy;
use super::events::{EventBus, LogEvent, SessionEvent};
use super::handler::SessionHandler;
use super::heartbeat::Heartbeat;
use super::options::SessionOptions;
use super::record::DisconnectRecord;
use super::signal::{ConnectedSignal, TeardownLatch};
use super::state::{AtomicSessionState, SessionState};
use super::supervisor::TaskGroup;

// ============================================================================
// Types
// ============================================================================

/// Whether a disconnect caller waits for teardown to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// Return only after cleanup has completed.
    Teardown,
    /// Return as soon as the trigger is recorded. Used by the supervisor,
    /// which is itself the teardown.
    Skip,
}

/// `start` is running or ran for this attempt.
const STARTED: u8 = 1;
/// A supervisor owns the background tasks.
const SUPERVISED: u8 = 1 << 1;
/// The transition winner wrote the disconnect record.
const RECORDED: u8 = 1 << 2;
/// The supervisor saw every background task stop.
const DRAINED: u8 = 1 << 3;

/// Bookkeeping for one connect attempt.
struct Attempt {
    /// Generation stamped into the state cell for this attempt.
    generation: u64,
    /// Host passed to `connect`.
    host: String,
    /// Cancellation for every task of this attempt.
    hierarchy: CancellationHierarchy,
    /// Released when cleanup of this attempt finishes.
    latch: TeardownLatch,
    /// Ownership flags.
    flags: AtomicU8,
}

impl Attempt {
    fn new(generation: u64, host: &str, hierarchy: CancellationHierarchy) -> Self {
        Self {
            generation,
            host: host.to_owned(),
            hierarchy,
            latch: TeardownLatch::new(),
            flags: AtomicU8::new(0),
        }
    }

    /// Claims the single `start` of this attempt.
    fn claim_start(&self) -> bool {
        self.flags.fetch_or(STARTED, Ordering::AcqRel) & STARTED == 0
    }

    /// Hands the attempt to a supervisor unless teardown already began.
    fn claim_supervision(&self) -> bool {
        self.flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                (flags & RECORDED == 0).then_some(flags | SUPERVISED)
            })
            .is_ok()
    }

    /// Marks the record written. Returns `true` if the caller runs cleanup.
    fn mark_recorded(&self) -> bool {
        let flags = self.flags.fetch_or(RECORDED, Ordering::AcqRel);
        flags & SUPERVISED == 0 || flags & DRAINED != 0
    }

    /// Marks the tasks drained. Returns `true` if the caller runs cleanup.
    fn mark_drained(&self) -> bool {
        self.flags.fetch_or(DRAINED, Ordering::AcqRel) & RECORDED != 0
    }
}

// ============================================================================
// Session
// ============================================================================

/// A reconnectable session over a [`Transport`].
///
/// Cheap to clone; clones share the same session.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use socket_session::{Session, WebSocketTransport};
/// use tokio_util::sync::CancellationToken;
///
/// let shutdown = CancellationToken::new();
/// let session = Session::builder()
///     .transport(Arc::new(WebSocketTransport::new()))
///     .handler(Arc::new(MyHandler))
///     .cancellation(shutdown.clone())
///     .build()?;
///
/// session.open("ws://127.0.0.1:9001").await?;
/// session.send(RawMessage::text("hello"))?;
///
/// session.disconnect().await;
/// session.take_error()?;
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Shared state behind a [`Session`].
struct SessionInner {
    /// Session identifier for logs.
    id: Uuid,
    /// Link capability.
    transport: Arc<dyn Transport>,
    /// Application hooks.
    handler: Arc<dyn SessionHandler>,
    /// Timing and buffering.
    options: SessionOptions,
    /// Current lifecycle state and attempt generation.
    state: AtomicSessionState,
    /// Caller-level cancellation every attempt links to.
    parent: Mutex<Option<CancellationToken>>,
    /// Most recently published attempt.
    attempt: Mutex<Option<Arc<Attempt>>>,
    /// Why the current teardown is happening.
    record: Mutex<DisconnectRecord>,
    /// Open while connected.
    connected: ConnectedSignal,
    /// Lifecycle and log fan-out.
    events: EventBus,
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Assembles a session from validated parts.
    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn SessionHandler>,
        options: SessionOptions,
        parent: Option<CancellationToken>,
    ) -> Self {
        let id = Uuid::new_v4();
        let events = EventBus::new(id, options.log_capacity);

        Self {
            inner: Arc::new(SessionInner {
                id,
                transport,
                handler,
                options,
                state: AtomicSessionState::new(),
                parent: Mutex::new(parent),
                attempt: Mutex::new(None),
                record: Mutex::new(DisconnectRecord::default()),
                connected: ConnectedSignal::new(),
                events,
            }),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// Returns `true` while `Connected`.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Returns the session options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Sets the caller-level token every following attempt links to.
    ///
    /// Cancelling it tears down the running attempt.
    pub fn set_parent_cancellation(&self, token: CancellationToken) {
        *self.inner.parent.lock() = Some(token);
    }

    /// Subscribes to lifecycle events.
    ///
    /// Every event published after this call is delivered; none are dropped.
    #[inline]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Subscribes to log lines, including every inbound and outbound frame
    /// at DEBUG.
    ///
    /// Buffers [`SessionOptions::log_capacity`] lines; a lagging subscriber
    /// misses the oldest.
    #[inline]
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.events.subscribe_logs()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Begins a connect attempt to `host`.
    ///
    /// A session that is not `Disconnected` is fully disconnected first.
    /// Leaves the session `Connecting`; follow with [`start`](Self::start)
    /// and [`finish_connect`](Self::finish_connect), or use
    /// [`open`](Self::open).
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no parent cancellation token is set or `host`
    ///   is empty
    /// - [`Error::InvalidState`] if another caller began an attempt
    ///   concurrently
    pub async fn connect(&self, host: &str) -> Result<()> {
        self.inner.connect(host).await
    }

    /// Connects the transport and launches the background tasks.
    ///
    /// Does not wait for the background tasks.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the session is not `Connecting` or the
    ///   attempt was already started
    /// - [`Error::Cancelled`] if the attempt was torn down while the
    ///   transport connected
    /// - The transport's error, after the attempt has been torn down
    pub async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    /// Marks the session `Connected` and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the session is not `Connecting`,
    /// e.g. because the attempt was torn down in the meantime.
    pub fn finish_connect(&self) -> Result<()> {
        self.inner.finish_connect()
    }

    /// Runs [`connect`](Self::connect), [`start`](Self::start) and
    /// [`finish_connect`](Self::finish_connect).
    ///
    /// # Errors
    ///
    /// The first error of the three steps.
    pub async fn open(&self, host: &str) -> Result<()> {
        self.connect(host).await?;
        self.start().await?;
        self.finish_connect()
    }

    /// Disconnects and waits until teardown has finished.
    ///
    /// A no-op when already `Disconnected`. Concurrent calls share a single
    /// teardown.
    pub async fn disconnect(&self) {
        self.inner.disconnect_current(true, Wait::Teardown).await;
    }

    /// Queues a frame for sending.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless `Connecting` or `Connected`
    /// - The transport's enqueue error
    pub fn send(&self, message: RawMessage) -> Result<()> {
        let state = self.state();
        if !matches!(state, SessionState::Connecting | SessionState::Connected) {
            return Err(Error::not_connected(state));
        }
        self.inner.enqueue(message)
    }

    /// Waits until the session is `Connected`.
    pub async fn wait_until_connected(&self) {
        self.inner.connected.wait().await;
    }

    /// Waits until the session is `Connected`, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if `limit` elapses first.
    pub async fn wait_until_connected_timeout(&self, limit: Duration) -> Result<()> {
        timeout(limit, self.wait_until_connected())
            .await
            .map_err(|_| Error::connection_timeout_after(limit))
    }

    /// Re-raises the cause of the last unexpected disconnect, consuming it.
    ///
    /// # Errors
    ///
    /// The captured failure, once. `Ok(())` when nothing is pending.
    pub fn take_error(&self) -> Result<()> {
        let pending = self.inner.record.lock().take_pending();
        match pending {
            Some(captured) => captured.rethrow(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionInner - Connect
// ============================================================================

impl SessionInner {
    async fn connect(self: &Arc<Self>, host: &str) -> Result<()> {
        if host.trim().is_empty() {
            return Err(Error::config("Host must not be empty"));
        }

        let parent = self.parent.lock().clone().ok_or_else(|| {
            Error::config(
                "Parent cancellation token is required before connect. \
                 Use .cancellation() on the builder or set_parent_cancellation()",
            )
        })?;

        if self.state.load() != SessionState::Disconnected {
            self.events
                .log(Level::INFO, "Reconnect requested, tearing down current attempt");
            self.disconnect_current(true, Wait::Teardown).await;
        }

        let (previous, state) = self.state.snapshot();
        if state != SessionState::Disconnected {
            return Err(Error::invalid_state(
                "connect",
                SessionState::Disconnected,
                state,
            ));
        }

        let hierarchy = CancellationHierarchy::new(&parent);
        let generation = self.state.open_attempt(previous).map_err(|(_, actual)| {
            Error::invalid_state("connect", SessionState::Disconnected, actual)
        })?;
        *self.attempt.lock() = Some(Arc::new(Attempt::new(generation, host, hierarchy)));

        self.events
            .log(Level::INFO, format!("Connecting to {host} (attempt {generation})"));
        Ok(())
    }

    async fn start(self: &Arc<Self>) -> Result<()> {
        let (generation, state) = self.state.snapshot();
        let attempt = self
            .published(generation)
            .filter(|_| state == SessionState::Connecting)
            .filter(|attempt| attempt.claim_start())
            .ok_or_else(|| Error::invalid_state("start", SessionState::Connecting, state))?;
        let token = attempt.hierarchy.token();

        if let Err(error) = self.transport.connect(&attempt.host, token.clone()).await {
            return Err(self.fail_attempt(&attempt, error).await);
        }

        let (inbound, inbound_rx) = InboundSender::channel();
        let transport_tasks = self.transport.background_tasks(token, inbound);

        if !attempt.claim_supervision() {
            // Torn down while the link came up. The link may have been stored
            // after that teardown disconnected the transport.
            drop(transport_tasks);
            if self.state.snapshot().0 == attempt.generation {
                self.transport.disconnect().await;
            }
            self.events
                .log(Level::DEBUG, "Attempt cancelled during transport connect");
            return Err(Error::Cancelled);
        }

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor
                .supervise(attempt, transport_tasks, inbound_rx)
                .await;
        });

        Ok(())
    }

    fn finish_connect(&self) -> Result<()> {
        let generation = self
            .state
            .transition(SessionState::Connecting, SessionState::Connected)
            .map_err(|actual| {
                Error::invalid_state("finish_connect", SessionState::Connecting, actual)
            })?;

        let announced = self.connected.open(generation, || {
            self.events.log(Level::INFO, "Connected");
            self.events.emit(SessionEvent::Connected);
        });
        if !announced {
            self.events
                .log(Level::DEBUG, "Attempt torn down before it was announced");
        }
        Ok(())
    }

    /// Tears a failed attempt down and returns the error for the caller.
    async fn fail_attempt(self: &Arc<Self>, attempt: &Arc<Attempt>, error: Error) -> Error {
        let captured = CapturedError::capture(error);
        self.events
            .log(Level::WARN, format!("Connect attempt failed: {captured}"));

        self.tear_down(attempt, false, Some(captured.clone()), Wait::Teardown)
            .await;

        Error::Captured(captured)
    }

    /// Logs and hands a frame to the transport.
    fn enqueue(&self, message: RawMessage) -> Result<()> {
        self.events.log(Level::DEBUG, format!("outbound: {message}"));
        self.transport.enqueue(message)
    }

    /// Returns the published attempt if it belongs to `generation`.
    fn published(&self, generation: u64) -> Option<Arc<Attempt>> {
        self.attempt
            .lock()
            .as_ref()
            .filter(|attempt| attempt.generation == generation)
            .cloned()
    }
}

// ============================================================================
// SessionInner - Background Tasks
// ============================================================================

impl SessionInner {
    /// Runs one attempt's background tasks to completion, then cleans up
    /// unless the transition winner still has to write the record.
    async fn supervise(
        self: Arc<Self>,
        attempt: Arc<Attempt>,
        transport_tasks: Vec<BackgroundTask>,
        inbound_rx: mpsc::UnboundedReceiver<RawMessage>,
    ) {
        let token = attempt.hierarchy.token();
        let mut group = TaskGroup::new();
        group.spawn(self.heartbeat_task(token.clone()));
        group.spawn(self.relay_task(inbound_rx, token));
        for task in transport_tasks {
            group.spawn(task);
        }

        self.events.log(
            Level::DEBUG,
            format!("Supervising {} background tasks", group.len()),
        );

        match group.first().await {
            Err(error) if !error.is_cancelled() => {
                self.events
                    .log(Level::WARN, format!("Background task failed: {error}"));
                let cause = CapturedError::capture(error);
                self.tear_down(&attempt, false, Some(cause), Wait::Skip)
                    .await;
            }
            _ => {}
        }

        // Make sure every sibling sees cancellation. An outer shutdown
        // counts as a requested disconnect.
        let requested = attempt.hierarchy.parent_cancelled();
        self.tear_down(&attempt, requested, None, Wait::Skip).await;

        for error in group.join_remaining().await {
            if !error.is_cancelled() {
                self.events.log(
                    Level::DEBUG,
                    format!("Suppressed background failure: {error}"),
                );
            }
        }

        if attempt.mark_drained() {
            self.cleanup(&attempt).await;
        }
    }

    /// Keep-alive loop for one attempt.
    fn heartbeat_task(self: &Arc<Self>, cancel: CancellationToken) -> BackgroundTask {
        let heartbeat = Heartbeat {
            interval: self.options.heartbeat_interval,
            poll_interval: self.options.poll_interval,
        };
        let session = Arc::clone(self);
        let beat = Arc::clone(self);

        async move {
            heartbeat
                .run(
                    move || session.state.load() == SessionState::Connected,
                    move || {
                        let payload = beat.handler.keep_alive()?;
                        beat.enqueue(payload)
                    },
                    cancel,
                )
                .await
        }
        .boxed()
    }

    /// Inbound relay for one attempt.
    fn relay_task(
        self: &Arc<Self>,
        inbound_rx: mpsc::UnboundedReceiver<RawMessage>,
        cancel: CancellationToken,
    ) -> BackgroundTask {
        Arc::clone(self).relay(inbound_rx, cancel).boxed()
    }

    /// Relays inbound frames to the handler, one at a time.
    async fn relay(
        self: Arc<Self>,
        mut inbound_rx: mpsc::UnboundedReceiver<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                message = inbound_rx.recv() => match message {
                    Some(message) => message,
                    None => return Ok(()),
                },
            };

            self.events.log(Level::DEBUG, format!("inbound: {message}"));

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                result = self.handler.dispatch(message) => result?,
            }
        }
    }
}

// ============================================================================
// SessionInner - Teardown
// ============================================================================

impl SessionInner {
    /// Triggers a disconnect of whatever attempt is current.
    async fn disconnect_current(self: &Arc<Self>, requested: bool, wait: Wait) {
        loop {
            let (generation, state) = self.state.snapshot();
            if state == SessionState::Disconnected {
                return;
            }
            match self.published(generation) {
                Some(attempt) => {
                    return self.tear_down(&attempt, requested, None, wait).await;
                }
                // `connect` won its transition and is about to publish.
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// Triggers a disconnect of `attempt`. A no-op once it is torn down.
    async fn tear_down(
        self: &Arc<Self>,
        attempt: &Arc<Attempt>,
        requested: bool,
        cause: Option<CapturedError>,
        wait: Wait,
    ) {
        if let Ok(previous) = self.state.begin_teardown(attempt.generation) {
            self.record.lock().begin(previous, requested, cause);
            attempt.hierarchy.cancel();
            self.events.log(
                Level::INFO,
                format!("Disconnecting from {previous} (requested: {requested})"),
            );

            if attempt.mark_recorded() {
                self.cleanup(attempt).await;
            }
        }

        if wait == Wait::Teardown {
            attempt.latch.waiter().wait().await;
        }
    }

    /// Finishes `attempt`. Runs exactly once per attempt.
    async fn cleanup(&self, attempt: &Attempt) {
        let teardown = self.record.lock().finish();

        self.transport.disconnect().await;

        self.connected.close(attempt.generation);
        let left = self.state.transition_at(
            attempt.generation,
            SessionState::Disconnecting,
            SessionState::Disconnected,
        );
        debug_assert!(left.is_ok(), "cleanup outside Disconnecting: {left:?}");

        let unexpected = teardown.unexpected();
        match &teardown.cause {
            Some(cause) if unexpected => self
                .events
                .log(Level::WARN, format!("Disconnected unexpectedly: {cause}")),
            Some(cause) => self
                .events
                .log(Level::INFO, format!("Disconnected after failure: {cause}")),
            None => self.events.log(
                Level::INFO,
                format!("Disconnected (unexpected: {unexpected})"),
            ),
        }

        self.events.emit(SessionEvent::Disconnected {
            unexpected,
            cause: teardown.cause,
        });

        {
            let mut published = self.attempt.lock();
            if published
                .as_ref()
                .is_some_and(|current| current.generation == attempt.generation)
            {
                published.take();
            }
        }
        attempt.latch.release();
    }
}

// ============================================================================
// Tests
// ============================================================================
