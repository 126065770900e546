//! Disconnect record: why the current teardown is happening.

// ============================================================================
// Imports
// ============================================================================

use crate::error::CapturedError;

use super::SessionState;

// ============================================================================
// Teardown
// ============================================================================

/// Snapshot of a disconnect record taken by cleanup.
#[derive(Debug, Clone)]
pub(crate) struct Teardown {
    /// State active when the disconnect began.
    pub previous: SessionState,
    /// Whether the caller asked for the disconnect.
    pub requested: bool,
    /// Failure that caused the disconnect, if any.
    pub cause: Option<CapturedError>,
}

impl Teardown {
    /// A teardown is unexpected when a live session went down on its own.
    #[inline]
    pub(crate) fn unexpected(&self) -> bool {
        !self.requested && self.previous == SessionState::Connected
    }
}

// ============================================================================
// DisconnectRecord
// ============================================================================

/// Written once per teardown by the transition winner, read by cleanup.
///
/// The cause of an unexpected teardown outlives cleanup in `pending` until
/// [`take_pending`](Self::take_pending) consumes it.
#[derive(Debug, Default)]
pub(crate) struct DisconnectRecord {
    previous: Option<SessionState>,
    requested: bool,
    cause: Option<CapturedError>,
    pending: Option<CapturedError>,
}

impl DisconnectRecord {
    /// Overwrites the record at the start of a disconnect sequence.
    pub(crate) fn begin(
        &mut self,
        previous: SessionState,
        requested: bool,
        cause: Option<CapturedError>,
    ) {
        self.previous = Some(previous);
        self.requested = requested;
        self.cause = cause;
    }

    /// Snapshots and clears the record for cleanup.
    pub(crate) fn finish(&mut self) -> Teardown {
        let teardown = Teardown {
            previous: self.previous.take().unwrap_or_default(),
            requested: std::mem::take(&mut self.requested),
            cause: self.cause.take(),
        };

        if teardown.unexpected()
            && let Some(cause) = &teardown.cause
        {
            self.pending = Some(cause.clone());
        }

        teardown
    }

    /// Consumes the retained cause of the last unexpected teardown.
    #[inline]
    pub(crate) fn take_pending(&mut self) -> Option<CapturedError> {
        self.pending.take()
    }
}

// ============================================================================
// Tests
// ============================================================================
