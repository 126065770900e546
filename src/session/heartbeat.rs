//! Keep-alive loop.
//!
//! Runs for the lifetime of one connect attempt. Before the session is
//! connected it only re-checks the state every poll interval; once connected
//! it sends one keep-alive per heartbeat interval.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

// ============================================================================
// Heartbeat
// ============================================================================

/// Timing of the keep-alive loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Heartbeat {
    /// Interval between keep-alives while connected.
    pub interval: Duration,
    /// Interval between state checks while not connected.
    pub poll_interval: Duration,
}

impl Heartbeat {
    /// Runs until `cancel` fires or `beat` fails.
    ///
    /// A keep-alive is only sent when the session was connected for the whole
    /// wait that precedes it. Cancellation is a clean exit.
    pub(crate) async fn run<P, B>(
        self,
        is_connected: P,
        mut beat: B,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        P: Fn() -> bool,
        B: FnMut() -> Result<()>,
    {
        loop {
            let connected = is_connected();
            let wait = if connected {
                self.interval
            } else {
                self.poll_interval
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                () = time::sleep(wait) => {}
            }

            if connected && is_connected() {
                beat()?;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
