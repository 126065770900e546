//! Transport capability consumed by a session.
//!
//! A transport owns the actual link: it connects, disconnects, queues
//! outbound frames and contributes the background tasks that pump its own
//! I/O. Inbound frames are pushed into an [`InboundSender`] as they arrive;
//! the session relays them to its handler.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  enqueue(RawMessage)   ┌─────────────────────┐
//! │                  │ ─────────────────────► │                     │
//! │     Session      │                        │      Transport      │
//! │  relay task  ◄───┼──── InboundSender ──── │  background tasks   │
//! │                  │                        │  (reader / writer)  │
//! └──────────────────┘                        └─────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process loopback transport with fault injection |
//! | `message` | Raw frame type |
//! | `websocket` | WebSocket client transport |

// ============================================================================
// Submodules
// ============================================================================

/// In-process loopback transport.
pub mod memory;

/// Raw frame type.
pub mod message;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryTransport;
pub use message::RawMessage;
pub use websocket::WebSocketTransport;

// ============================================================================
// Types
// ============================================================================

/// A transport-contributed background task.
///
/// Runs until its cancellation token fires (returning `Ok`) or its I/O fails.
pub type BackgroundTask = BoxFuture<'static, Result<()>>;

// ============================================================================
// InboundSender
// ============================================================================

/// Delivers inbound frames to the session's relay task.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<RawMessage>,
}

impl InboundSender {
    /// Creates a sender/receiver pair.
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<RawMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hands a frame to the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the relay has stopped.
    #[inline]
    pub fn deliver(&self, message: RawMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::ConnectionClosed)
    }

    /// Returns `true` once the relay has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Link capability a session drives.
///
/// Implementations must be safe to call from any task. `disconnect` may be
/// called without a prior successful `connect` and must tolerate it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes the link to `host`.
    ///
    /// Should return [`Error::Cancelled`] promptly when `cancel` fires.
    async fn connect(&self, host: &str, cancel: CancellationToken) -> Result<()>;

    /// Tears the link down.
    async fn disconnect(&self);

    /// Queues a frame for sending without waiting for it to be written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when there is no link.
    fn enqueue(&self, message: RawMessage) -> Result<()>;

    /// Returns the tasks that pump this link's I/O for one connection.
    ///
    /// Called once per successful `connect`. Every task must observe `cancel`.
    fn background_tasks(
        &self,
        cancel: CancellationToken,
        inbound: InboundSender,
    ) -> Vec<BackgroundTask>;
}

// ============================================================================
// Tests
// ============================================================================
