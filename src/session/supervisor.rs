//! Fan-in task group for one attempt's background work.
//!
//! All tasks start together. The first one to finish, cleanly or not, ends
//! the group: the caller cancels the siblings and then joins them with
//! [`TaskGroup::join_remaining`]. Only the first outcome matters; failures
//! among the siblings are handed back for logging and otherwise dropped.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;

use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};
use crate::transport::BackgroundTask;

// ============================================================================
// TaskGroup
// ============================================================================

/// Background tasks of one attempt.
///
/// Dropping the group aborts whatever is still running.
#[derive(Default)]
pub(crate) struct TaskGroup {
    set: JoinSet<Result<()>>,
}

impl TaskGroup {
    /// Creates an empty group.
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns a task into the group.
    #[inline]
    pub(crate) fn spawn(&mut self, task: BackgroundTask) {
        self.set.spawn(task);
    }

    /// Returns the number of tasks not yet joined.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }

    /// Waits for the first task to finish and returns its outcome.
    ///
    /// An empty group finishes immediately with `Ok`. A panic is reported as
    /// [`Error::TaskPanicked`].
    pub(crate) async fn first(&mut self) -> Result<()> {
        match self.set.join_next().await {
            None => Ok(()),
            Some(Ok(outcome)) => outcome,
            Some(Err(join_error)) => Err(panic_error(join_error)),
        }
    }

    /// Joins every remaining task, returning the failures it suppressed.
    pub(crate) async fn join_remaining(&mut self) -> Vec<Error> {
        let mut suppressed = Vec::new();
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => suppressed.push(error),
                Err(join_error) => suppressed.push(panic_error(join_error)),
            }
        }
        suppressed
    }
}

/// Converts a join failure into a crate error.
fn panic_error(join_error: JoinError) -> Error {
    if join_error.is_panic() {
        Error::task_panicked(panic_message(join_error.into_panic()))
    } else {
        Error::task_panicked(join_error.to_string())
    }
}

/// Extracts the text of a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ============================================================================
// Tests
// ============================================================================
