//! In-process loopback transport.
//!
//! Records what the session does to it and lets a test drive the remote end:
//! push inbound frames, fail the link, or close it. Connect can be scripted to
//! fail, to stall until cancelled, or to stall and then come up regardless of
//! cancellation the way a handshake already on the wire does.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use socket_session::MemoryTransport;
//!
//! let transport = Arc::new(MemoryTransport::new());
//! // ... build and open a session over `transport` ...
//! transport.inject(RawMessage::text("hello"))?;
//! assert_eq!(transport.sent().len(), 0);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

use super::{BackgroundTask, InboundSender, RawMessage, Transport};

// ============================================================================
// Types
// ============================================================================

/// Instruction from the test side to the pump task.
enum Feed {
    /// Deliver an inbound frame.
    Message(RawMessage),
    /// Fail the link with an error.
    Fail(Error),
    /// Close the link from the remote side.
    Close,
}

/// How the next `connect` behaves.
#[derive(Debug, Clone, Default)]
enum ConnectScript {
    /// Succeed immediately.
    #[default]
    Succeed,
    /// Fail with a connection error carrying this message.
    Fail(String),
    /// Wait this long (or until cancelled) before succeeding.
    Delay(Duration),
    /// Wait this long, then succeed even if cancelled meanwhile.
    Stall(Duration),
}

#[derive(Default)]
struct MemoryState {
    connected: bool,
    script: ConnectScript,
    hosts: Vec<String>,
    sent: Vec<RawMessage>,
    connects: usize,
    disconnects: usize,
    feed: Option<mpsc::UnboundedSender<Feed>>,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// [`Transport`] that loops back inside the process.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

// ============================================================================
// MemoryTransport - Scripting
// ============================================================================

impl MemoryTransport {
    /// Creates a transport whose connects succeed.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following connect fail with a connection error.
    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().script = ConnectScript::Fail(message.into());
    }

    /// Makes every following connect wait `delay`, or until cancelled.
    pub fn delay_connect(&self, delay: Duration) {
        self.state.lock().script = ConnectScript::Delay(delay);
    }

    /// Makes every following connect wait `delay` and then bring the link
    /// up, ignoring cancellation.
    pub fn stall_connect(&self, delay: Duration) {
        self.state.lock().script = ConnectScript::Stall(delay);
    }

    /// Restores immediate successful connects.
    pub fn succeed_connect(&self) {
        self.state.lock().script = ConnectScript::Succeed;
    }

    /// Pushes an inbound frame to the running session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when no link is being pumped.
    pub fn inject(&self, message: RawMessage) -> Result<()> {
        self.push(Feed::Message(message))
    }

    /// Fails the running link with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when no link is being pumped.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.push(Feed::Fail(error))
    }

    /// Closes the running link from the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when no link is being pumped.
    pub fn close_remote(&self) -> Result<()> {
        self.push(Feed::Close)
    }

    fn push(&self, feed: Feed) -> Result<()> {
        let state = self.state.lock();
        let tx = state.feed.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(feed).map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// MemoryTransport - Inspection
// ============================================================================

impl MemoryTransport {
    /// Returns `true` between a successful connect and the next disconnect.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Returns every frame enqueued so far.
    #[must_use]
    pub fn sent(&self) -> Vec<RawMessage> {
        self.state.lock().sent.clone()
    }

    /// Returns the hosts passed to connect, in order.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        self.state.lock().hosts.clone()
    }

    /// Returns the number of connect calls.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Returns the number of disconnect calls.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Pump task: feed → session.
    async fn run_pump(
        mut feed_rx: mpsc::UnboundedReceiver<Feed>,
        inbound: InboundSender,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return Ok(()),

                feed = feed_rx.recv() => match feed {
                    Some(Feed::Message(message)) => inbound.deliver(message)?,
                    Some(Feed::Fail(error)) => return Err(error),
                    Some(Feed::Close) | None => return Err(Error::ConnectionClosed),
                },
            }
        }
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, host: &str, cancel: CancellationToken) -> Result<()> {
        let script = {
            let mut state = self.state.lock();
            state.connects += 1;
            state.hosts.push(host.to_owned());
            state.script.clone()
        };

        let stubborn = matches!(script, ConnectScript::Stall(_));
        match script {
            ConnectScript::Succeed => {}
            ConnectScript::Fail(message) => return Err(Error::connection(message)),
            ConnectScript::Delay(delay) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            ConnectScript::Stall(delay) => tokio::time::sleep(delay).await,
        }

        if cancel.is_cancelled() && !stubborn {
            return Err(Error::Cancelled);
        }

        self.state.lock().connected = true;
        debug!(host, "Memory link connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        state.feed = None;
    }

    fn enqueue(&self, message: RawMessage) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::ConnectionClosed);
        }
        state.sent.push(message);
        Ok(())
    }

    fn background_tasks(
        &self,
        cancel: CancellationToken,
        inbound: InboundSender,
    ) -> Vec<BackgroundTask> {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        self.state.lock().feed = Some(feed_tx);

        vec![Self::run_pump(feed_rx, inbound, cancel).boxed()]
    }
}

// ============================================================================
// Tests
// ============================================================================
