//! Connection session lifecycle.
//!
//! A [`Session`] drives one connect attempt at a time over a
//! [`Transport`](crate::transport::Transport): it connects, runs the
//! heartbeat and inbound relay next to the transport's own I/O tasks, and
//! tears everything down exactly once when the user, a failing task or an
//! outer cancellation asks for it.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Lifecycle owner |
//! | [`SessionBuilder`] | Fluent configuration builder |
//! | [`SessionOptions`] | Heartbeat timing and log buffering |
//! | [`SessionHandler`] | Keep-alive payload and inbound dispatch |
//! | [`SessionState`] | `Disconnected → Connecting → Connected → Disconnecting` |
//! | [`SessionEvent`] | Lifecycle notifications, never dropped |
//! | [`LogEvent`] | Diagnostic lines, including every frame at DEBUG |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use socket_session::{Session, SessionEvent, WebSocketTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! let session = Session::builder()
//!     .transport(Arc::new(WebSocketTransport::new()))
//!     .handler(Arc::new(MyHandler))
//!     .cancellation(CancellationToken::new())
//!     .build()?;
//!
//! let mut events = session.subscribe();
//! session.open("ws://127.0.0.1:9001").await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Disconnected { unexpected: true, .. } = event {
//!         session.take_error()?;
//!     }
//! }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for sessions.
pub mod builder;

/// Linked cancellation for one attempt.
mod cancellation;

/// Session lifecycle implementation.
pub mod core;

/// Lifecycle and log fan-out.
pub mod events;

/// Application hooks.
pub mod handler;

/// Keep-alive loop.
mod heartbeat;

/// Session configuration.
pub mod options;

/// Disconnect bookkeeping.
mod record;

/// Connected gate and teardown latch.
mod signal;

/// Lifecycle states.
pub mod state;

/// Background task group.
mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use core::Session;
pub use events::{LogEvent, SessionEvent};
pub use handler::SessionHandler;
pub use options::SessionOptions;
pub use state::SessionState;
