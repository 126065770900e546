//! Error types for socket sessions.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socket_session::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.open("ws://127.0.0.1:9001").await?;
//!     session.disconnect().await;
//!     session.take_error()
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Lifecycle | [`Error::InvalidState`], [`Error::NotConnected`], [`Error::Cancelled`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Background | [`Error::Heartbeat`], [`Error::Dispatch`], [`Error::TaskPanicked`], [`Error::Captured`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session::SessionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a session is built or connected with missing or invalid
    /// configuration, e.g. no parent cancellation token.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation called out of order.
    ///
    /// Returned when a lifecycle step runs in a state that does not allow it,
    /// e.g. `start()` while not `Connecting`.
    #[error("Invalid state for {operation}: expected {expected}, found {actual}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// State the operation requires.
        expected: SessionState,
        /// State the session was actually in.
        actual: SessionState,
    },

    /// Session is not connected.
    ///
    /// Returned when sending while the session is down.
    #[error("Session not connected (state: {state})")]
    NotConnected {
        /// State the session was in.
        state: SessionState,
    },

    /// Operation cancelled.
    ///
    /// Returned by transports when the attempt's cancellation token fires
    /// while connecting. Background loops never surface this.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    ///
    /// Returned when the link cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    ///
    /// Returned when the link or the connected signal does not come up in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    ///
    /// Returned when the remote end closes the link during operation.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Background Errors
    // ========================================================================
    /// Keep-alive failure.
    ///
    /// Returned by the heartbeat loop or a keep-alive provider.
    #[error("Heartbeat failed: {message}")]
    Heartbeat {
        /// Description of the heartbeat failure.
        message: String,
    },

    /// Inbound message handling failure.
    ///
    /// Returned by a session handler that could not process a message.
    #[error("Dispatch failed: {message}")]
    Dispatch {
        /// Description of the dispatch failure.
        message: String,
    },

    /// Background task panicked.
    #[error("Background task panicked: {message}")]
    TaskPanicked {
        /// Panic payload or join error text.
        message: String,
    },

    /// A previously captured failure, re-raised.
    ///
    /// Displays exactly as the original error.
    #[error(transparent)]
    Captured(CapturedError),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation.
    ///
    /// Returned for malformed endpoints or frames.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(
        operation: &'static str,
        expected: SessionState,
        actual: SessionState,
    ) -> Self {
        Self::InvalidState {
            operation,
            expected,
            actual,
        }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(state: SessionState) -> Self {
        Self::NotConnected { state }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a connection timeout error for `limit`, saturating at
    /// `u64::MAX` milliseconds.
    #[inline]
    pub fn connection_timeout_after(limit: Duration) -> Self {
        Self::connection_timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
    }

    /// Creates a heartbeat error.
    #[inline]
    pub fn heartbeat(message: impl Into<String>) -> Self {
        Self::Heartbeat {
            message: message.into(),
        }
    }

    /// Creates a dispatch error.
    #[inline]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Creates a task panicked error.
    #[inline]
    pub fn task_panicked(message: impl Into<String>) -> Self {
        Self::TaskPanicked {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the original error behind any [`Error::Captured`] wrapper.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Self::Captured(captured) => captured.error().root(),
            other => other,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a cancellation.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.root(),
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on reconnect.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Heartbeat { .. }
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// CapturedError
// ============================================================================

/// A failure captured on one task and re-raised on another.
///
/// Holds the original [`Error`] together with the backtrace taken when it was
/// captured, so a background failure keeps its context across the suspension
/// boundary between the task that failed and the caller that inspects it.
/// Cheap to clone: the disconnect event and the pending-error slot share it.
#[derive(Clone)]
pub struct CapturedError {
    inner: Arc<CapturedInner>,
}

struct CapturedInner {
    error: Error,
    backtrace: Backtrace,
}

impl CapturedError {
    /// Captures an error, recording the current backtrace.
    ///
    /// An error that is already captured is unwrapped rather than nested, so
    /// the original capture site is preserved.
    #[must_use]
    pub fn capture(error: Error) -> Self {
        match error {
            Error::Captured(captured) => captured,
            error => Self {
                inner: Arc::new(CapturedInner {
                    error,
                    backtrace: Backtrace::capture(),
                }),
            },
        }
    }

    /// Returns the original error.
    #[inline]
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.inner.error
    }

    /// Returns the backtrace recorded at capture time.
    #[inline]
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }

    /// Returns `true` if both values share the same capture.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Re-raises the captured failure.
    #[inline]
    pub fn rethrow<T>(self) -> Result<T> {
        Err(Error::Captured(self))
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.error, f)
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CapturedError");
        debug.field("error", &self.inner.error);
        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            debug.field("backtrace", &self.inner.backtrace);
        }
        debug.finish()
    }
}

impl std::error::Error for CapturedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.inner.error)
    }
}

impl From<CapturedError> for Error {
    fn from(captured: CapturedError) -> Self {
        Self::Captured(captured)
    }
}

// ============================================================================
// Tests
// ============================================================================
