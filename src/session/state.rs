//! Session state and its atomic cell.
//!
//! ```text
//!                 connect              start + finish_connect
//! Disconnected ───────────► Connecting ───────────────────────► Connected
//!      ▲                        │                                   │
//!      │ cleanup                │ disconnect                        │ disconnect
//!      │                        ▼                                   │
//!      └──────────────────  Disconnecting ◄─────────────────────────┘
//! ```
//!
//! Transitions are compare-and-swap only. The cell packs the attempt
//! generation next to the state, so a transition aimed at one attempt can
//! never land on the next one. No lock guards the state, so a disconnect
//! triggered from inside a background task can never deadlock against the
//! teardown that waits for that task.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    /// Idle. Terminal state of every attempt and start of the next.
    #[default]
    Disconnected = 0,
    /// Connect requested; transport link not yet confirmed.
    Connecting = 1,
    /// Link up, background tasks running.
    Connected = 2,
    /// Teardown in flight.
    Disconnecting = 3,
}

impl SessionState {
    /// Decodes a state from its stored representation.
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }

    /// Returns `true` if `self → next` is an edge of the state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Disconnecting)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AtomicSessionState
// ============================================================================

/// Bits holding the state; the generation sits above them.
const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

#[inline]
const fn pack(generation: u64, state: SessionState) -> u64 {
    (generation << STATE_BITS) | state as u64
}

#[inline]
const fn unpack(raw: u64) -> (u64, SessionState) {
    (raw >> STATE_BITS, SessionState::from_u8((raw & STATE_MASK) as u8))
}

/// Atomic cell holding a [`SessionState`] stamped with its attempt generation.
///
/// Generation 0 is the idle session before its first attempt.
#[derive(Debug, Default)]
pub(crate) struct AtomicSessionState {
    raw: AtomicU64,
}

impl AtomicSessionState {
    /// Creates a cell in the `Disconnected` state.
    #[inline]
    pub(crate) const fn new() -> Self {
        Self {
            raw: AtomicU64::new(pack(0, SessionState::Disconnected)),
        }
    }

    /// Returns the current state.
    #[inline]
    pub(crate) fn load(&self) -> SessionState {
        self.snapshot().1
    }

    /// Returns the current generation and state.
    #[inline]
    pub(crate) fn snapshot(&self) -> (u64, SessionState) {
        unpack(self.raw.load(Ordering::Acquire))
    }

    /// Moves `(generation, Disconnected) → (generation + 1, Connecting)`.
    ///
    /// Returns the observed generation and state as `Err` on a mismatch.
    pub(crate) fn open_attempt(&self, generation: u64) -> Result<u64, (u64, SessionState)> {
        let next = generation + 1;
        self.raw
            .compare_exchange(
                pack(generation, SessionState::Disconnected),
                pack(next, SessionState::Connecting),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| next)
            .map_err(unpack)
    }

    /// Moves `current → new` within the current generation, whichever it is.
    ///
    /// Returns the generation on success, the observed state as `Err`.
    pub(crate) fn transition(
        &self,
        current: SessionState,
        new: SessionState,
    ) -> Result<u64, SessionState> {
        debug_assert!(current.can_transition_to(new));
        let mut observed = self.raw.load(Ordering::Acquire);
        loop {
            let (generation, state) = unpack(observed);
            if state != current {
                return Err(state);
            }
            match self.raw.compare_exchange_weak(
                observed,
                pack(generation, new),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(generation),
                Err(actual) => observed = actual,
            }
        }
    }

    /// Moves `generation` from `current → new`.
    ///
    /// Fails if the state differs or another attempt is current.
    pub(crate) fn transition_at(
        &self,
        generation: u64,
        current: SessionState,
        new: SessionState,
    ) -> Result<(), (u64, SessionState)> {
        debug_assert!(current.can_transition_to(new));
        self.raw
            .compare_exchange(
                pack(generation, current),
                pack(generation, new),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(unpack)
    }

    /// Moves a live `generation` (`Connecting` or `Connected`) to
    /// `Disconnecting`.
    ///
    /// Exactly one caller per attempt gets `Ok`, carrying the state it left.
    /// Everyone else gets the observed generation and state.
    pub(crate) fn begin_teardown(
        &self,
        generation: u64,
    ) -> Result<SessionState, (u64, SessionState)> {
        let mut observed = self.raw.load(Ordering::Acquire);
        loop {
            let (current, state) = unpack(observed);
            let live = matches!(state, SessionState::Connecting | SessionState::Connected);
            if current != generation || !live {
                return Err((current, state));
            }
            match self.raw.compare_exchange_weak(
                observed,
                pack(generation, SessionState::Disconnecting),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(state),
                Err(actual) => observed = actual,
            }
        }
    }
}


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use proptest::prelude::*;

    const ALL: [SessionState; 4] = [
        SessionState::Disconnected,
        SessionState::Connecting,
        SessionState::Connected,
        SessionState::Disconnecting,
    ];

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(SessionState::default(), SessionState::Disconnected);
        assert_eq!(AtomicSessionState::new().load(), SessionState::Disconnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Disconnecting.to_string(), "Disconnecting");
    }

    #[test]
    fn test_transition_success_and_failure() {
        let cell = AtomicSessionState::new();

        assert_eq!(cell.open_attempt(0), Ok(1));
        assert_eq!(
            cell.transition(SessionState::Connected, SessionState::Disconnecting),
            Err(SessionState::Connecting)
        );
        assert_eq!(
            cell.transition(SessionState::Connecting, SessionState::Connected),
            Ok(1)
        );
        assert_eq!(cell.snapshot(), (1, SessionState::Connected));
    }

    #[test]
    fn test_open_attempt_requires_current_generation() {
        let cell = AtomicSessionState::new();
        assert_eq!(cell.open_attempt(0), Ok(1));
        assert_eq!(cell.open_attempt(0), Err((1, SessionState::Connecting)));

        assert_eq!(cell.begin_teardown(1), Ok(SessionState::Connecting));
        assert_eq!(
            cell.transition_at(1, SessionState::Disconnecting, SessionState::Disconnected),
            Ok(())
        );
        assert_eq!(cell.open_attempt(1), Ok(2));
    }

    #[test]
    fn test_stale_generation_cannot_tear_down() {
        let cell = AtomicSessionState::new();
        cell.open_attempt(0).unwrap();
        cell.begin_teardown(1).unwrap();
        cell.transition_at(1, SessionState::Disconnecting, SessionState::Disconnected)
            .unwrap();
        cell.open_attempt(1).unwrap();

        assert_eq!(cell.begin_teardown(1), Err((2, SessionState::Connecting)));
        assert_eq!(
            cell.transition_at(1, SessionState::Connecting, SessionState::Connected),
            Err((2, SessionState::Connecting))
        );
        assert_eq!(cell.snapshot(), (2, SessionState::Connecting));
    }

    #[test]
    fn test_exactly_one_thread_wins() {
        let cell = Arc::new(AtomicSessionState::new());
        cell.open_attempt(0).unwrap();
        cell.transition(SessionState::Connecting, SessionState::Connected)
            .unwrap();
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if cell.begin_teardown(1).is_ok() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(cell.load(), SessionState::Disconnecting);
    }

    #[test]
    fn test_one_winner_while_connect_completes() {
        for _ in 0..200 {
            let cell = Arc::new(AtomicSessionState::new());
            cell.open_attempt(0).unwrap();
            let wins = Arc::new(AtomicUsize::new(0));

            let finisher = {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    let _ = cell.transition(SessionState::Connecting, SessionState::Connected);
                })
            };
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let cell = Arc::clone(&cell);
                    let wins = Arc::clone(&wins);
                    std::thread::spawn(move || {
                        if cell.begin_teardown(1).is_ok() {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            finisher.join().unwrap();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert_eq!(cell.snapshot(), (1, SessionState::Disconnecting));
        }
    }

    proptest! {
        #[test]
        fn prop_pack_preserves_generation_and_state(
            generation in 0u64..(1 << 40),
            state in 0usize..4,
        ) {
            let state = ALL[state];
            prop_assert_eq!(unpack(pack(generation, state)), (generation, state));
        }
    }

    proptest! {
        #[test]
        fn prop_disconnected_edges_are_exclusive(
            from in 0usize..4,
            to in 0usize..4,
        ) {
            let (from, to) = (ALL[from], ALL[to]);
            if from == SessionState::Disconnected {
                prop_assert_eq!(from.can_transition_to(to), to == SessionState::Connecting);
            }
            if to == SessionState::Disconnected {
                prop_assert_eq!(from.can_transition_to(to), from == SessionState::Disconnecting);
            }
            prop_assert!(!from.can_transition_to(from));
        }
    }
}
