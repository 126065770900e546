//! Per-attempt cancellation hierarchy.
//!
//! Each connect attempt composes the caller's parent token with a token the
//! session owns. The derived token fires when either side fires, so an outer
//! shutdown cascades into in-flight sessions while the session can still stop
//! a single attempt without touching the parent.

// ============================================================================
// Imports
// ============================================================================

use tokio_util::sync::CancellationToken;

// ============================================================================
// CancellationHierarchy
// ============================================================================

/// Session-owned cancellation linked to a caller-supplied parent.
///
/// Built fresh for every connect attempt and dropped by cleanup.
#[derive(Debug)]
pub(crate) struct CancellationHierarchy {
    /// Caller-level token. Never cancelled by the session.
    parent: CancellationToken,
    /// Derived token handed to every background task of the attempt.
    token: CancellationToken,
}

impl CancellationHierarchy {
    /// Links a new session-owned source to `parent`.
    pub(crate) fn new(parent: &CancellationToken) -> Self {
        Self {
            parent: parent.clone(),
            token: parent.child_token(),
        }
    }

    /// Returns the effective token for this attempt.
    #[inline]
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signals the session-owned side.
    #[inline]
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if the parent fired.
    #[inline]
    pub(crate) fn parent_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }
}

// ============================================================================
// Tests
// ============================================================================
