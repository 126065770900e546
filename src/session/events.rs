//! Observability events emitted by a session.
//!
//! Two independent streams:
//!
//! - Lifecycle ([`SessionEvent`]): one unbounded queue per subscriber.
//!   Nothing is ever dropped, however slowly a subscriber reads.
//! - Logs ([`LogEvent`]): a bounded [`broadcast`] channel. Subscribers that
//!   lag miss old lines. Every line is also emitted through `tracing` at the
//!   same level, so a subscriber is optional.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{Level, debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::CapturedError;

// ============================================================================
// SessionEvent
// ============================================================================

/// Lifecycle notification published by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session reached `Connected`.
    Connected,

    /// An attempt finished tearing down.
    Disconnected {
        /// `true` when a live session went down without being asked to.
        unexpected: bool,
        /// Failure that caused the teardown, if any.
        cause: Option<CapturedError>,
    },
}

impl SessionEvent {
    /// Returns `true` for [`SessionEvent::Disconnected`].
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

// ============================================================================
// LogEvent
// ============================================================================

/// Diagnostic line: raw payloads at DEBUG, lifecycle at INFO and above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Severity.
    pub level: Level,
    /// Text.
    pub message: String,
}

// ============================================================================
// EventBus
// ============================================================================

/// Publishes lifecycle events and log lines.
#[derive(Debug)]
pub(crate) struct EventBus {
    session: Uuid,
    lifecycle: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    logs: broadcast::Sender<LogEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `log_capacity` log lines per subscriber.
    pub(crate) fn new(session: Uuid, log_capacity: usize) -> Self {
        let (logs, _rx) = broadcast::channel(log_capacity.max(1));
        Self {
            session,
            lifecycle: Mutex::new(Vec::new()),
            logs,
        }
    }

    /// Returns a receiver for every following lifecycle event.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lifecycle.lock().push(tx);
        rx
    }

    /// Returns a receiver for log lines.
    #[inline]
    pub(crate) fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.logs.subscribe()
    }

    /// Publishes a lifecycle event, forgetting dropped subscribers.
    pub(crate) fn emit(&self, event: SessionEvent) {
        self.lifecycle
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emits a log line to `tracing` and to log subscribers.
    pub(crate) fn log(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        let session = self.session;

        match level {
            Level::ERROR => error!(%session, "{message}"),
            Level::WARN => warn!(%session, "{message}"),
            Level::INFO => info!(%session, "{message}"),
            Level::DEBUG => debug!(%session, "{message}"),
            _ => trace!(%session, "{message}"),
        }

        let _ = self.logs.send(LogEvent { level, message });
    }
}

// ============================================================================
// Tests
// ============================================================================
