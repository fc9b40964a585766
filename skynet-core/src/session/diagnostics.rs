use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Counters shared by the capture worker and the message path.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub frames_captured: AtomicUsize,
    pub frames_dropped: AtomicUsize,
    pub chunks_sent: AtomicUsize,
    pub send_failures: AtomicUsize,
    pub messages_received: AtomicUsize,
    pub segments_scheduled: AtomicUsize,
    pub decode_errors: AtomicUsize,
    pub interruptions: AtomicUsize,
    pub segments_stopped: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            segments_scheduled: self.segments_scheduled.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
            segments_stopped: self.segments_stopped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_captured: usize,
    /// Frames that reached the frame callback while not recording.
    pub frames_dropped: usize,
    pub chunks_sent: usize,
    pub send_failures: usize,
    pub messages_received: usize,
    pub segments_scheduled: usize,
    pub decode_errors: usize,
    pub interruptions: usize,
    pub segments_stopped: usize,
}
