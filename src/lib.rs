//! Socket Session - Reconnectable connection lifecycle over any transport.
//!
//! This library manages the lifecycle of one long-lived client connection:
//! connecting, keeping it alive, relaying inbound frames to application
//! code, and tearing it down exactly once no matter who asks.
//!
//! # Architecture
//!
//! Each connect attempt owns a small set of background tasks:
//!
//! - **Heartbeat**: sends the handler's keep-alive payload while connected
//! - **Relay**: hands inbound frames to the handler, one at a time
//! - **Transport tasks**: whatever I/O pumps the transport contributes
//!
//! Key design principles:
//!
//! - A single atomic state cell decides which caller performs a disconnect
//! - The first background task to finish or fail ends the attempt
//! - A failure that ends a connected session is kept and re-raised once by
//!   [`Session::take_error`]
//! - Cancellation flows from a caller-level token into every attempt
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use socket_session::{RawMessage, Result, Session, SessionHandler, WebSocketTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl SessionHandler for Echo {
//!     fn keep_alive(&self) -> Result<RawMessage> {
//!         Ok(RawMessage::text("ping"))
//!     }
//!
//!     async fn dispatch(&self, message: RawMessage) -> Result<()> {
//!         println!("received {message}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let shutdown = CancellationToken::new();
//!     let session = Session::builder()
//!         .transport(Arc::new(WebSocketTransport::new()))
//!         .handler(Arc::new(Echo))
//!         .cancellation(shutdown.clone())
//!         .build()?;
//!
//!     session.open("ws://127.0.0.1:9001").await?;
//!     session.send(RawMessage::text("hello"))?;
//!
//!     session.disconnect().await;
//!     session.take_error()
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`session`] | Session lifecycle, options and events |
//! | [`transport`] | Transport capability and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Session lifecycle.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Transport capability and implementations.
///
/// [`WebSocketTransport`] for real links, [`MemoryTransport`] for tests.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{CapturedError, Error, Result};

// Session types
pub use session::{
    LogEvent, Session, SessionBuilder, SessionEvent, SessionHandler, SessionOptions,
    SessionState,
};

// Transport types
pub use transport::{
    BackgroundTask, InboundSender, MemoryTransport, RawMessage, Transport, WebSocketTransport,
};
