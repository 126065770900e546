//! Session timing and buffering options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use socket_session::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_heartbeat_interval(Duration::from_secs(15))
//!     .with_log_capacity(1024);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default keep-alive interval while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default poll interval while waiting to become connected.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default per-subscriber log buffer.
pub const DEFAULT_LOG_CAPACITY: usize = 256;

/// Largest accepted per-subscriber log buffer.
pub const MAX_LOG_CAPACITY: usize = 1 << 20;

// ============================================================================
// SessionOptions
// ============================================================================

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Interval between keep-alive payloads while connected.
    pub heartbeat_interval: Duration,

    /// Interval at which the heartbeat loop re-checks the state before the
    /// session is connected.
    pub poll_interval: Duration,

    /// Log lines buffered per subscriber before the oldest are dropped.
    /// Lifecycle events are never dropped.
    pub log_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the keep-alive interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the pre-connect poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-subscriber log buffer.
    #[inline]
    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionOptions {
    /// Checks that every interval and buffer is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero intervals or a log capacity outside
    /// `1..=MAX_LOG_CAPACITY`.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("Heartbeat interval must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("Poll interval must be greater than zero"));
        }
        if self.log_capacity == 0 {
            return Err(Error::config("Log capacity must be greater than zero"));
        }
        if self.log_capacity > MAX_LOG_CAPACITY {
            return Err(Error::config(format!(
                "Log capacity {} exceeds the maximum of {MAX_LOG_CAPACITY}",
                self.log_capacity
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
