//! Application hooks a session calls into.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::transport::RawMessage;

// ============================================================================
// SessionHandler
// ============================================================================

/// Application side of a session.
///
/// The session owns the lifecycle; the handler only supplies the keep-alive
/// payload and interprets inbound frames.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Returns the keep-alive payload for the current heartbeat tick.
    ///
    /// # Errors
    ///
    /// An error here fails the heartbeat task and tears the session down.
    fn keep_alive(&self) -> Result<RawMessage>;

    /// Handles one inbound frame.
    ///
    /// # Errors
    ///
    /// An error here fails the relay task and tears the session down.
    async fn dispatch(&self, message: RawMessage) -> Result<()>;
}
