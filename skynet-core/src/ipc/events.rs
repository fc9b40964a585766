//! Status events broadcast by the session lifecycle manager.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Constructed, no contexts opened yet.
    Uninitialized,
    /// Audio contexts open, waiting for the transport to signal open.
    Connecting,
    /// Transport open; audio may flow both ways.
    Open,
    /// Closed remotely or by teardown.
    Closed,
    /// Transport reported an error. Not retried.
    Errored,
}

impl SessionPhase {
    /// `true` once the session can no longer carry audio.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Closed | SessionPhase::Errored)
    }
}

/// Snapshot of the observable status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub phase: SessionPhase,
    /// Latest status line, e.g. `"Opened"`.
    pub status: String,
    /// Latest error text; empty when none.
    pub error: String,
}

impl StatusEvent {
    /// Text a UI should show: the error if any, otherwise the status.
    pub fn display_text(&self) -> &str {
        if self.error.is_empty() {
            &self.status
        } else {
            &self.error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_phase() {
        let event = StatusEvent {
            seq: 4,
            phase: SessionPhase::Errored,
            status: "Opened".into(),
            error: "socket reset".into(),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["phase"], "errored");
        assert_eq!(json["status"], "Opened");
        assert_eq!(json["error"], "socket reset");

        let round_trip: StatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn error_text_takes_precedence() {
        let mut event = StatusEvent {
            seq: 0,
            phase: SessionPhase::Open,
            status: "Opened".into(),
            error: String::new(),
        };
        assert_eq!(event.display_text(), "Opened");
        event.error = "boom".into();
        assert_eq!(event.display_text(), "boom");
    }

    #[test]
    fn phase_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<SessionPhase>(r#""Open""#).is_err());
        assert!(SessionPhase::Closed.is_terminal());
        assert!(!SessionPhase::Connecting.is_terminal());
    }
}
