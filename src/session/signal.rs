//! Gates observers wait on: the connected signal and the teardown latch.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::watch;

// ============================================================================
// ConnectedSignal
// ============================================================================

/// Gate position, stamped with the attempt that last moved it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Gate {
    generation: u64,
    open: bool,
}

/// Manually-resettable gate, open while the session is `Connected`.
///
/// Each attempt opens it at most once and closes it once. A close always
/// wins over a late open of the same attempt, so a stale open can never
/// leave the gate up after teardown.
#[derive(Debug)]
pub(crate) struct ConnectedSignal {
    tx: watch::Sender<Gate>,
}

impl ConnectedSignal {
    /// Creates a closed gate.
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Gate::default());
        Self { tx }
    }

    /// Opens the gate for `generation`, waking every waiter.
    ///
    /// `announce` runs inside the update, ordered against any close. Returns
    /// `false`, without running it, once that attempt has been closed.
    pub(crate) fn open(&self, generation: u64, announce: impl FnOnce()) -> bool {
        self.tx.send_if_modified(|gate| {
            if gate.generation >= generation {
                return false;
            }
            *gate = Gate {
                generation,
                open: true,
            };
            announce();
            true
        })
    }

    /// Closes the gate for `generation`. Any later open of that attempt is
    /// ignored.
    pub(crate) fn close(&self, generation: u64) {
        self.tx.send_if_modified(|gate| {
            let was_open = gate.open;
            *gate = Gate {
                generation: gate.generation.max(generation),
                open: false,
            };
            was_open
        });
    }

    /// Waits until the gate is open. Returns immediately if it already is.
    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|gate| gate.open).await;
    }
}

// ============================================================================
// TeardownLatch
// ============================================================================

/// One-shot gate released when an attempt's cleanup has fully finished.
///
/// Created with the attempt, before its `Disconnected → Connecting`
/// transition, so every disconnect caller of that attempt has something to
/// wait on, whether or not background tasks were ever started.
#[derive(Debug)]
pub(crate) struct TeardownLatch {
    tx: watch::Sender<bool>,
}

impl TeardownLatch {
    /// Creates an unreleased latch.
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a handle that resolves once the latch is released.
    #[inline]
    pub(crate) fn waiter(&self) -> TeardownWaiter {
        TeardownWaiter {
            rx: self.tx.subscribe(),
        }
    }

    /// Releases every current and future waiter.
    #[inline]
    pub(crate) fn release(&self) {
        self.tx.send_replace(true);
    }
}

/// Waits for a [`TeardownLatch`] release.
#[derive(Debug)]
pub(crate) struct TeardownWaiter {
    rx: watch::Receiver<bool>,
}

impl TeardownWaiter {
    /// Resolves when the latch is released or dropped.
    pub(crate) async fn wait(mut self) {
        let _ = self.rx.wait_for(|released| *released).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn test_signal_wait_returns_when_open() {
        let signal = ConnectedSignal::new();
        assert!(signal.open(1, || {}));

        timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("open gate should not block");
    }

    #[tokio::test]
    async fn test_signal_wakes_waiter() {
        let signal = Arc::new(ConnectedSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        signal.open(1, || {});
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[test]
    fn test_signal_resets() {
        let signal = ConnectedSignal::new();
        signal.open(1, || {});
        assert!(signal.tx.borrow().open);
        signal.close(1);
        assert!(!signal.tx.borrow().open);

        assert!(signal.open(2, || {}));
        assert!(signal.tx.borrow().open);
    }

    #[test]
    fn test_late_open_after_close_is_ignored() {
        let signal = ConnectedSignal::new();
        let mut announced = false;

        signal.close(3);
        let opened = signal.open(3, || announced = true);

        assert!(!opened);
        assert!(!announced);
        assert!(!signal.tx.borrow().open);
    }

    #[tokio::test]
    async fn test_latch_releases_all_waiters() {
        let latch = TeardownLatch::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| tokio::spawn(latch.waiter().wait()))
            .collect();

        latch.release();

        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_waiter_after_release_returns_immediately() {
        let latch = TeardownLatch::new();
        latch.release();

        timeout(Duration::from_millis(100), latch.waiter().wait())
            .await
            .expect("released latch should not block");
    }

    #[tokio::test]
    async fn test_dropped_latch_does_not_hang() {
        let latch = TeardownLatch::new();
        let waiter = latch.waiter();
        drop(latch);

        timeout(Duration::from_millis(100), waiter.wait())
            .await
            .expect("dropped latch should not block");
    }
}
