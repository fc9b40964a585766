//! Observable status surface: phase, status line and error text.
//!
//! Every change is stored under one lock and broadcast as a [`StatusEvent`],
//! the same way the host reads a snapshot or follows the stream.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::ipc::events::{SessionPhase, StatusEvent};

/// Broadcast channel capacity: status updates buffered for slow subscribers.
const BROADCAST_CAP: usize = 64;

#[derive(Debug)]
struct StatusState {
    phase: SessionPhase,
    status: String,
    error: String,
}

#[derive(Debug)]
pub struct StatusBoard {
    state: Mutex<StatusState>,
    seq: AtomicU64,
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            state: Mutex::new(StatusState {
                phase: SessionPhase::Uninitialized,
                status: String::new(),
                error: String::new(),
            }),
            seq: AtomicU64::new(0),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusEvent {
        let state = self.state.lock();
        StatusEvent {
            seq: self.seq.load(Ordering::Relaxed),
            phase: state.phase,
            status: state.status.clone(),
            error: state.error.clone(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        info!(status = %status, "status");
        self.update(|s| s.status = status);
    }

    pub fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        warn!(error = %error, "session error");
        self.update(|s| s.error = error);
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.update(|s| s.phase = phase);
    }

    /// Move to `to` with a new status line, only if the current phase is
    /// `from`. One event carries both; nothing is broadcast when it does not move.
    pub fn advance(&self, from: SessionPhase, to: SessionPhase, status: impl Into<String>) -> bool {
        let status = status.into();
        let moved = self.update_if(|s| {
            if s.phase != from {
                return false;
            }
            s.phase = to;
            s.status = status;
            true
        });
        if moved {
            info!(phase = ?to, "phase advanced");
        }
        moved
    }

    fn update(&self, apply: impl FnOnce(&mut StatusState)) {
        self.update_if(|s| {
            apply(s);
            true
        });
    }

    fn update_if(&self, apply: impl FnOnce(&mut StatusState) -> bool) -> bool {
        let event = {
            let mut state = self.state.lock();
            if !apply(&mut state) {
                return false;
            }
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            StatusEvent {
                seq,
                phase: state.phase,
                status: state.status.clone(),
                error: state.error.clone(),
            }
        };
        // No subscribers is fine.
        let _ = self.tx.send(event);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_are_broadcast_in_order() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();

        board.set_phase(SessionPhase::Connecting);
        board.set_status("Opened");
        board.set_error("socket reset");

        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        let c = rx.try_recv().unwrap();
        assert_eq!(a.phase, SessionPhase::Connecting);
        assert_eq!(b.status, "Opened");
        assert_eq!(c.display_text(), "socket reset");
        assert!(a.seq < b.seq && b.seq < c.seq);
        assert_eq!(board.snapshot(), c);
    }

    #[test]
    fn advance_only_moves_from_expected_phase() {
        let board = StatusBoard::new();
        let mut rx = board.subscribe();
        assert!(!board.advance(SessionPhase::Connecting, SessionPhase::Open, "Opened"));
        assert!(rx.try_recv().is_err(), "a refused advance is silent");
        assert_ne!(board.snapshot().status, "Opened");

        board.set_phase(SessionPhase::Connecting);
        board.set_status("Connecting...");
        assert!(board.advance(SessionPhase::Connecting, SessionPhase::Open, "Opened"));
        assert_eq!(board.phase(), SessionPhase::Open);

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert_eq!(last.phase, SessionPhase::Open);
        assert_eq!(last.status, "Opened", "phase and status land in one event");
    }
}
