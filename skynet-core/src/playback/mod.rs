//! Playback scheduling of model audio.
//!
//! ## Algorithm (per inbound segment)
//!
//! ```text
//! 1. base64 → PCM16 → PlayableBuffer at 24 kHz mono
//! 2. resample to the mixer rate if the device runs at another rate
//! 3. startAt = max(clock, device current time)        (under the mixer lock)
//! 4. voice added to the mixer's active set at startAt  (stoppable handle)
//! 5. clock = startAt + duration
//! ```
//!
//! Interruption drains the active set in one step and resets the clock to 0,
//! so the next segment starts from the live device time. Steps 3–5 and the
//! interruption sweep run under the same scheduler lock: a segment can never
//! be scheduled halfway through a sweep and survive it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        mixer::{Mixer, PlaybackHandle},
        resample::resample_block,
    },
    codec::{self, PlayableBuffer},
    error::{Result, SkynetError},
    ipc::live::LiveServerMessage,
};

/// A segment placed on the output timeline.
#[derive(Debug, Clone)]
pub struct ScheduledSegment {
    pub handle: PlaybackHandle,
    /// Device time (seconds) at which the segment begins.
    pub start_at: f64,
    /// Length of the device-ready buffer in seconds.
    pub duration: f64,
}

/// What one inbound message did to playback.
#[derive(Debug, Default)]
pub struct MessageOutcome {
    pub scheduled: Option<ScheduledSegment>,
    /// Set when the audio payload was present but dropped.
    pub dropped: Option<SkynetError>,
    /// Number of segments cut short by an interruption, if one was signalled.
    pub interrupted: Option<usize>,
}

#[derive(Debug, Default)]
struct ClockState {
    /// Next available start time on the device timeline.
    next_start: f64,
    closed: bool,
}

/// Turns inbound segments into gap-free, non-overlapping playback.
#[derive(Debug)]
pub struct PlaybackScheduler {
    mixer: Arc<Mixer>,
    source_rate: u32,
    state: Mutex<ClockState>,
}

impl PlaybackScheduler {
    /// `source_rate` is the wire rate of inbound audio (24 kHz).
    pub fn new(mixer: Arc<Mixer>, source_rate: u32) -> Self {
        Self {
            mixer,
            source_rate,
            state: Mutex::new(ClockState::default()),
        }
    }

    /// Apply one inbound message: schedule its audio (first part only), then
    /// honour an interruption flag. Never fails; a bad chunk is reported in
    /// the outcome and playback carries on.
    pub fn handle_message(&self, msg: &LiveServerMessage) -> MessageOutcome {
        let mut outcome = MessageOutcome::default();

        if let Some(data) = msg.audio_data() {
            match self.enqueue_base64(data) {
                Ok(segment) => outcome.scheduled = Some(segment),
                Err(e) => {
                    warn!("dropping inbound audio chunk: {e}");
                    outcome.dropped = Some(e);
                }
            }
        }

        if msg.is_interrupted() {
            outcome.interrupted = Some(self.interrupt());
        }

        outcome
    }

    /// Decode a base64 PCM16 mono chunk at the source rate and schedule it.
    ///
    /// # Errors
    /// `SkynetError::Decode` for malformed payloads, `SkynetError::TornDown`
    /// after [`close`](Self::close).
    pub fn enqueue_base64(&self, data: &str) -> Result<ScheduledSegment> {
        let raw = codec::decode(data)?;
        let buffer = codec::decode_to_playable_buffer(&raw, self.source_rate, 1)?;
        self.schedule(buffer)
    }

    /// Schedule an already-decoded buffer right after everything queued so far.
    pub fn schedule(&self, buffer: PlayableBuffer) -> Result<ScheduledSegment> {
        let device_rate = self.mixer.sample_rate();
        let source_rate = buffer.sample_rate();
        let samples = resample_block(&buffer.into_mono(), source_rate, device_rate)?;
        let duration = samples.len() as f64 / device_rate as f64;

        let mut state = self.state.lock();
        if state.closed {
            return Err(SkynetError::TornDown);
        }
        let (id, start_at) = self.mixer.schedule(samples.into(), state.next_start);
        state.next_start = start_at + duration;
        drop(state);

        debug!(id, start_at, duration, "segment scheduled");
        Ok(ScheduledSegment {
            handle: PlaybackHandle::new(id, &self.mixer),
            start_at,
            duration,
        })
    }

    /// Stop every active segment and reset the clock. Returns how many were stopped.
    pub fn interrupt(&self) -> usize {
        let mut state = self.state.lock();
        let stopped = self.mixer.stop_all();
        state.next_start = 0.0;
        drop(state);

        info!(stopped = stopped.len(), "playback interrupted");
        stopped.len()
    }

    /// Interrupt and refuse further segments.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.mixer.stop_all();
        state.next_start = 0.0;
    }

    /// Current value of the playback clock (seconds).
    pub fn clock(&self) -> f64 {
        self.state.lock().next_start
    }

    pub fn active_count(&self) -> usize {
        self.mixer.active_count()
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use approx::assert_abs_diff_eq;

    const RATE: u32 = 24_000;

    fn scheduler() -> PlaybackScheduler {
        PlaybackScheduler::new(Arc::new(Mixer::new(RATE)), RATE)
    }

    fn seconds_of_tone(secs: f64) -> String {
        let len = (secs * RATE as f64) as usize;
        encode(&vec![0.25f32; len], RATE).data
    }

    fn advance(scheduler: &PlaybackScheduler, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        scheduler.mixer().render(&mut out);
        out
    }

    #[test]
    fn consecutive_one_second_segments_are_contiguous() {
        let s = scheduler();
        let first = s.enqueue_base64(&seconds_of_tone(1.0)).unwrap();
        let second = s.enqueue_base64(&seconds_of_tone(1.0)).unwrap();
        assert_abs_diff_eq!(first.start_at, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(second.start_at, first.start_at + 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.clock(), 2.0, epsilon = 1e-12);
        assert_eq!(s.active_count(), 2);
    }

    #[test]
    fn start_times_sum_previous_durations_from_device_time() {
        let s = scheduler();
        advance(&s, 2_400); // device clock at 0.1 s

        let durations = [0.25, 0.5, 0.125, 1.0];
        let mut expected = 0.1;
        for d in durations {
            let segment = s.enqueue_base64(&seconds_of_tone(d)).unwrap();
            assert_abs_diff_eq!(segment.start_at, expected, epsilon = 1e-9);
            assert_abs_diff_eq!(segment.duration, d, epsilon = 1e-9);
            expected += d;
        }
    }

    #[test]
    fn clock_behind_device_time_restarts_from_now() {
        let s = scheduler();
        s.enqueue_base64(&seconds_of_tone(0.1)).unwrap();
        advance(&s, 12_000); // 0.5 s; first segment long finished
        let next = s.enqueue_base64(&seconds_of_tone(0.1)).unwrap();
        assert_abs_diff_eq!(next.start_at, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn playback_is_gap_free_across_segments() {
        let s = scheduler();
        s.enqueue_base64(&seconds_of_tone(0.01)).unwrap();
        s.enqueue_base64(&seconds_of_tone(0.01)).unwrap();
        let out = advance(&s, 480);
        assert!(out.iter().all(|x| (*x - 0.25).abs() < 1e-4));
        assert_eq!(s.active_count(), 0);
    }

    #[test]
    fn interruption_clears_set_and_resets_clock() {
        let s = scheduler();
        let a = s.enqueue_base64(&seconds_of_tone(1.0)).unwrap();
        s.enqueue_base64(&seconds_of_tone(1.0)).unwrap();
        advance(&s, 240);

        let outcome = s.handle_message(&LiveServerMessage::interruption());
        assert_eq!(outcome.interrupted, Some(2));
        assert_eq!(s.active_count(), 0);
        assert!(!a.handle.is_playing());
        assert_eq!(s.clock(), 0.0);

        let out = advance(&s, 2_400);
        assert!(out.iter().all(|x| *x == 0.0), "nothing audible after interruption");

        let next = s.enqueue_base64(&seconds_of_tone(0.5)).unwrap();
        assert_abs_diff_eq!(next.start_at, s.mixer().current_time(), epsilon = 1e-9);
        assert_abs_diff_eq!(next.start_at, 0.11, epsilon = 1e-9);
    }

    #[test]
    fn malformed_chunk_does_not_block_the_next_one() {
        let s = scheduler();
        let bad = s.handle_message(&LiveServerMessage::audio("AAE"));
        assert!(bad.scheduled.is_none());
        assert!(matches!(bad.dropped, Some(SkynetError::Decode(_))));

        let odd = s.handle_message(&LiveServerMessage::audio("AAAA")); // 3 bytes
        assert!(matches!(odd.dropped, Some(SkynetError::Decode(_))));

        let good = s.handle_message(&LiveServerMessage::audio(seconds_of_tone(0.2)));
        let segment = good.scheduled.expect("next chunk is scheduled");
        assert_abs_diff_eq!(segment.start_at, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn message_without_audio_schedules_nothing() {
        let s = scheduler();
        let outcome = s.handle_message(&LiveServerMessage::default());
        assert!(outcome.scheduled.is_none());
        assert!(outcome.dropped.is_none());
        assert!(outcome.interrupted.is_none());
        assert_eq!(s.active_count(), 0);
    }

    #[test]
    fn audio_and_interrupt_in_one_message_ends_silent() {
        let s = scheduler();
        let mut msg = LiveServerMessage::audio(seconds_of_tone(0.2));
        if let Some(content) = msg.server_content.as_mut() {
            content.interrupted = true;
        }
        let outcome = s.handle_message(&msg);
        assert!(outcome.scheduled.is_some());
        assert_eq!(outcome.interrupted, Some(1));
        assert_eq!(s.active_count(), 0);
    }

    #[test]
    fn resamples_to_device_rate() {
        let mixer = Arc::new(Mixer::new(48_000));
        let s = PlaybackScheduler::new(Arc::clone(&mixer), RATE);
        let segment = s.enqueue_base64(&seconds_of_tone(0.5)).unwrap();
        assert!((segment.duration - 0.5).abs() < 0.001, "{}", segment.duration);
        assert_abs_diff_eq!(s.clock(), segment.duration, epsilon = 1e-12);
    }

    #[test]
    fn segment_scheduled_during_a_sweep_never_survives_it() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let s = scheduler();
        let chunk = seconds_of_tone(0.01);
        let scheduled: Mutex<Vec<ScheduledSegment>> = Mutex::new(Vec::new());
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let segment = s.enqueue_base64(&chunk).unwrap();
                    scheduled.lock().push(segment);
                    std::thread::sleep(std::time::Duration::from_micros(20));
                }
            });

            for _ in 0..200 {
                advance(&s, 48);
                let before = scheduled.lock().len();
                let now = s.mixer().current_time();
                s.interrupt();

                let segments = scheduled.lock().clone();
                for segment in &segments[..before] {
                    assert!(!segment.handle.is_playing(), "pre-sweep segment survived");
                }

                // Survivors were scheduled after the sweep: a contiguous run from device time.
                let survivors: Vec<_> = segments
                    .iter()
                    .filter(|seg| seg.handle.is_playing())
                    .collect();
                if let Some(first) = survivors.first() {
                    assert_abs_diff_eq!(first.start_at, now, epsilon = 1e-9);
                }
                for pair in survivors.windows(2) {
                    assert_abs_diff_eq!(
                        pair[1].start_at,
                        pair[0].start_at + pair[0].duration,
                        epsilon = 1e-9
                    );
                }
                scheduled.lock().retain(|seg| seg.handle.is_playing());
            }
            done.store(true, Ordering::Release);
        });

        s.interrupt();
        let next = s.enqueue_base64(&chunk).unwrap();
        assert_abs_diff_eq!(next.start_at, s.mixer().current_time(), epsilon = 1e-9);
    }

    #[test]
    fn closed_scheduler_refuses_segments() {
        let s = scheduler();
        s.enqueue_base64(&seconds_of_tone(0.2)).unwrap();
        s.close();
        assert_eq!(s.active_count(), 0);
        assert!(matches!(
            s.enqueue_base64(&seconds_of_tone(0.2)),
            Err(SkynetError::TornDown)
        ));
    }
}
