//! Connection state cell and transition table
//!
//! The state lives in an `AtomicU8` so observers read it without locking. Only
//! the ingestion worker calls [`StateCell::transition`], which rejects edges
//! that are not in the table below.
//!
//! | From | To |
//! |------|----|
//! | Idle | Discovering |
//! | Discovering | Connecting, Failed |
//! | Connecting | Streaming, Failed, Disconnected (reconnect retry) |
//! | Streaming | Stale, Disconnected |
//! | Stale | Streaming, Disconnected |
//! | Disconnected | Connecting |
//! | any | Idle |

use crate::core::types::ConnectionState;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU8, Ordering};

/// One applied state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Whether `from -> to` is a legal edge
pub fn is_legal(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    match (from, to) {
        (_, Idle) => from != Idle,
        (Idle, Discovering) => true,
        (Discovering, Connecting | Failed) => true,
        (Connecting, Streaming | Failed | Disconnected) => true,
        (Streaming, Stale | Disconnected) => true,
        (Stale, Streaming | Disconnected) => true,
        (Disconnected, Connecting) => true,
        _ => false,
    }
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Idle => 0,
        ConnectionState::Discovering => 1,
        ConnectionState::Connecting => 2,
        ConnectionState::Streaming => 3,
        ConnectionState::Stale => 4,
        ConnectionState::Disconnected => 5,
        ConnectionState::Failed => 6,
    }
}

fn decode(raw: u8) -> ConnectionState {
    match raw {
        1 => ConnectionState::Discovering,
        2 => ConnectionState::Connecting,
        3 => ConnectionState::Streaming,
        4 => ConnectionState::Stale,
        5 => ConnectionState::Disconnected,
        6 => ConnectionState::Failed,
        _ => ConnectionState::Idle,
    }
}

/// Lock-free connection state
#[derive(Debug, Default)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        decode(self.raw.load(Ordering::Acquire))
    }

    /// Apply a legal transition
    pub fn transition(&self, to: ConnectionState) -> Result<Transition> {
        let from = self.get();
        if !is_legal(from, to) {
            return Err(Error::InvalidTransition { from, to });
        }
        self.raw.store(encode(to), Ordering::Release);
        Ok(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 7] = [
        Idle,
        Discovering,
        Connecting,
        Streaming,
        Stale,
        Disconnected,
        Failed,
    ];

    #[test]
    fn test_encode_roundtrip() {
        for state in ALL {
            assert_eq!(decode(encode(state)), state);
        }
    }

    #[test]
    fn test_happy_path() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), Idle);
        for next in [Discovering, Connecting, Streaming, Stale, Streaming] {
            cell.transition(next).unwrap();
        }
        assert_eq!(cell.get(), Streaming);
    }

    #[test]
    fn test_reconnect_cycle() {
        let cell = StateCell::new();
        for next in [
            Discovering,
            Connecting,
            Streaming,
            Disconnected,
            Connecting,
            Disconnected,
            Connecting,
            Failed,
        ] {
            cell.transition(next).unwrap();
        }
        assert_eq!(cell.get(), Failed);
    }

    #[test]
    fn test_any_state_returns_to_idle() {
        for state in ALL {
            if state != Idle {
                assert!(is_legal(state, Idle), "{:?} -> Idle", state);
            }
        }
        assert!(!is_legal(Idle, Idle));
    }

    #[test]
    fn test_illegal_edges_rejected() {
        let cell = StateCell::new();
        let err = cell.transition(Streaming).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Idle,
                to: Streaming
            }
        ));
        assert_eq!(cell.get(), Idle);

        assert!(!is_legal(Failed, Connecting));
        assert!(!is_legal(Stale, Stale));
        assert!(!is_legal(Disconnected, Streaming));
        assert!(!is_legal(Discovering, Streaming));
    }
}
