//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use socket_session::{Session, WebSocketTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! let session = Session::builder()
//!     .transport(Arc::new(WebSocketTransport::new()))
//!     .handler(Arc::new(MyHandler))
//!     .heartbeat_interval(Duration::from_secs(15))
//!     .cancellation(CancellationToken::new())
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::core::Session;
use super::handler::SessionHandler;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`].
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct SessionBuilder {
    /// Link capability.
    transport: Option<Arc<dyn Transport>>,
    /// Application hooks.
    handler: Option<Arc<dyn SessionHandler>>,
    /// Timing and buffering.
    options: SessionOptions,
    /// Caller-level cancellation.
    cancellation: Option<CancellationToken>,
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a builder with default options and nothing else set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the application handler.
    #[inline]
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the keep-alive interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.options.heartbeat_interval = interval;
        self
    }

    /// Sets the state poll interval used before the session is connected.
    #[inline]
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Sets the per-subscriber log buffer.
    #[inline]
    #[must_use]
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.options.log_capacity = capacity;
        self
    }

    /// Sets the caller-level cancellation token.
    ///
    /// Can also be set later with [`Session::set_parent_cancellation`].
    #[inline]
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if transport or handler is not set
    /// - [`Error::Config`] if an option is out of range
    pub fn build(self) -> Result<Session> {
        let transport = self.transport.ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: Session::builder().transport(Arc::new(WebSocketTransport::new()))",
            )
        })?;

        let handler = self.handler.ok_or_else(|| {
            Error::config("Handler is required. Use .handler() to set it.")
        })?;

        self.options.validate()?;

        Ok(Session::from_parts(
            transport,
            handler,
            self.options,
            self.cancellation,
        ))
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("transport", &self.transport.is_some())
            .field("handler", &self.handler.is_some())
            .field("options", &self.options)
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::session::SessionState;
    use crate::transport::{MemoryTransport, RawMessage};

    struct Quiet;

    #[async_trait]
    impl SessionHandler for Quiet {
        fn keep_alive(&self) -> Result<RawMessage> {
            Ok(RawMessage::text("ping"))
        }

        async fn dispatch(&self, _message: RawMessage) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = SessionBuilder::new();
        assert!(builder.transport.is_none());
        assert!(builder.handler.is_none());
        assert!(builder.cancellation.is_none());
        assert_eq!(builder.options, SessionOptions::default());
    }

    #[test]
    fn test_timing_setters() {
        let builder = SessionBuilder::new()
            .heartbeat_interval(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(20))
            .log_capacity(8);

        assert_eq!(builder.options.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(builder.options.poll_interval, Duration::from_millis(20));
        assert_eq!(builder.options.log_capacity, 8);
    }

    #[test]
    fn test_build_fails_without_transport() {
        let err = SessionBuilder::new()
            .handler(Arc::new(Quiet))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Transport"));
    }

    #[test]
    fn test_build_fails_without_handler() {
        let err = SessionBuilder::new()
            .transport(Arc::new(MemoryTransport::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Handler"));
    }

    #[test]
    fn test_build_rejects_zero_interval() {
        let result = SessionBuilder::new()
            .transport(Arc::new(MemoryTransport::new()))
            .handler(Arc::new(Quiet))
            .heartbeat_interval(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_rejects_oversized_log_capacity() {
        let result = SessionBuilder::new()
            .transport(Arc::new(MemoryTransport::new()))
            .handler(Arc::new(Quiet))
            .log_capacity(usize::MAX)
            .build();

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_starts_disconnected() {
        let session = SessionBuilder::new()
            .transport(Arc::new(MemoryTransport::new()))
            .handler(Arc::new(Quiet))
            .build()
            .unwrap();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn test_debug_hides_components() {
        let builder = SessionBuilder::new().transport(Arc::new(MemoryTransport::new()));
        let debug = format!("{builder:?}");
        assert!(debug.contains("transport: true"));
        assert!(debug.contains("handler: false"));
    }
}
