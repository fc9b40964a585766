//! Output timeline: the set of scheduled voices and the device clock.
//!
//! The mixer is shared between the playback scheduler (which adds and stops
//! voices) and the output device callback (which renders them). Both sides
//! go through one `parking_lot::Mutex`; the render path holds it for a single
//! block, does not allocate, and is the only place the device clock advances.
//!
//! A voice that has played to its end leaves the active set in the render
//! pass that finishes it, but its samples are only moved aside there. They
//! are freed by the next `schedule` or `stop_all`, outside the lock, so the
//! device callback never releases a buffer.

use std::sync::{
    atomic::{AtomicU16, AtomicU32, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;

use super::level::LevelMeter;

/// Identifier of one scheduled voice, unique within a mixer.
pub type VoiceId = u64;

#[derive(Debug)]
struct Voice {
    id: VoiceId,
    samples: Arc<[f32]>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

#[derive(Debug, Default)]
struct MixerState {
    /// Active Segment Set: scheduled, not yet finished or stopped.
    voices: Vec<Voice>,
    /// Frames rendered since the device started. Defines `current_time`.
    frames_rendered: u64,
    next_id: VoiceId,
    /// Finished voices awaiting release off the render path. Capacity is
    /// reserved by `schedule`, so pushing here never reallocates.
    retired: Vec<Voice>,
}

/// Mono voice mixer rendering onto an interleaved device buffer.
#[derive(Debug)]
pub struct Mixer {
    state: Mutex<MixerState>,
    sample_rate: AtomicU32,
    channels: AtomicU16,
    level: LevelMeter,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Mutex::new(MixerState::default()),
            sample_rate: AtomicU32::new(sample_rate.max(1)),
            channels: AtomicU16::new(1),
            level: LevelMeter::new(),
        }
    }

    /// Adopt the device's actual format. Called by the host before the
    /// output stream starts.
    pub fn configure(&self, sample_rate: u32, channels: u16) {
        self.sample_rate.store(sample_rate.max(1), Ordering::Release);
        self.channels.store(channels.max(1), Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn channels(&self) -> u16 {
        self.channels.load(Ordering::Acquire)
    }

    /// Device clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.state.lock().frames_rendered as f64 / self.sample_rate() as f64
    }

    /// Output-side level tap.
    pub fn level(&self) -> LevelMeter {
        self.level.clone()
    }

    /// Place `samples` (at the mixer rate) on the timeline no earlier than
    /// `not_before` seconds and no earlier than the device clock.
    ///
    /// Returns the voice id and the start time actually used, both computed
    /// under the same lock the render path advances the clock with.
    pub fn schedule(&self, samples: Arc<[f32]>, not_before: f64) -> (VoiceId, f64) {
        let rate = self.sample_rate() as f64;
        let requested = (not_before.max(0.0) * rate).round() as u64;

        let mut state = self.state.lock();
        let start_frame = requested.max(state.frames_rendered);
        let id = state.next_id;
        state.next_id += 1;
        if !samples.is_empty() {
            state.voices.push(Voice {
                id,
                samples,
                start_frame,
            });
        }
        let capacity = state.voices.len();
        let finished = std::mem::replace(&mut state.retired, Vec::with_capacity(capacity));
        drop(state);
        drop(finished);
        (id, start_frame as f64 / rate)
    }

    /// Stop one voice. Returns `false` if it had already finished or been stopped.
    pub fn stop(&self, id: VoiceId) -> bool {
        let mut state = self.state.lock();
        let before = state.voices.len();
        state.voices.retain(|v| v.id != id);
        state.voices.len() != before
    }

    /// Stop every active voice. The set is taken as a whole before any
    /// voice is dropped.
    pub fn stop_all(&self) -> Vec<VoiceId> {
        let (stopped, finished) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.voices),
                std::mem::take(&mut state.retired),
            )
        };
        drop(finished);
        stopped.into_iter().map(|v| v.id).collect()
    }

    pub fn is_active(&self, id: VoiceId) -> bool {
        self.state.lock().voices.iter().any(|v| v.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Render one interleaved block and advance the device clock by its frame count.
    pub fn render(&self, out: &mut [f32]) {
        let channels = self.channels() as usize;
        let frames = out.len() / channels;
        out.fill(0.0);

        let mut state = self.state.lock();
        let block_start = state.frames_rendered;
        let block_end = block_start + frames as u64;

        for voice in &state.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            for t in from..to {
                let sample = voice.samples[(t - voice.start_frame) as usize];
                let base = (t - block_start) as usize * channels;
                for slot in &mut out[base..base + channels] {
                    *slot += sample;
                }
            }
        }

        let mut i = 0;
        while i < state.voices.len() {
            if state.voices[i].end_frame() <= block_end {
                let finished = state.voices.swap_remove(i);
                state.retired.push(finished);
            } else {
                i += 1;
            }
        }
        state.frames_rendered = block_end;
        drop(state);

        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        self.level.update(out);
    }
}

/// Stoppable reference to one scheduled voice.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: VoiceId,
    mixer: Weak<Mixer>,
}

impl PlaybackHandle {
    pub(crate) fn new(id: VoiceId, mixer: &Arc<Mixer>) -> Self {
        Self {
            id,
            mixer: Arc::downgrade(mixer),
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Cut the voice short. No-op once it has finished.
    pub fn stop(&self) -> bool {
        self.mixer.upgrade().is_some_and(|m| m.stop(self.id))
    }

    pub fn is_playing(&self) -> bool {
        self.mixer.upgrade().is_some_and(|m| m.is_active(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tone(len: usize, value: f32) -> Arc<[f32]> {
        vec![value; len].into()
    }

    #[test]
    fn renders_scheduled_voice_at_its_start_frame() {
        let mixer = Mixer::new(100);
        let (_, start) = mixer.schedule(tone(5, 0.5), 0.03);
        assert_abs_diff_eq!(start, 0.03, epsilon = 1e-12);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert_eq!(&out[..3], &[0.0; 3]);
        assert_eq!(&out[3..8], &[0.5; 5]);
        assert_eq!(&out[8..], &[0.0; 2]);
        assert_eq!(mixer.active_count(), 0, "finished voice is pruned");
        assert_abs_diff_eq!(mixer.current_time(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn finished_samples_are_released_by_the_next_schedule() {
        let mixer = Mixer::new(100);
        let samples = tone(5, 0.5);
        let (id, _) = mixer.schedule(Arc::clone(&samples), 0.0);

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(!mixer.is_active(id));
        assert_eq!(Arc::strong_count(&samples), 2, "render only moves it aside");

        mixer.schedule(tone(5, 0.1), 0.0);
        assert_eq!(Arc::strong_count(&samples), 1);
    }

    #[test]
    fn stop_all_releases_finished_samples_too() {
        let mixer = Mixer::new(100);
        let samples = tone(5, 0.5);
        mixer.schedule(Arc::clone(&samples), 0.0);
        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert_eq!(Arc::strong_count(&samples), 2);

        assert!(mixer.stop_all().is_empty());
        assert_eq!(Arc::strong_count(&samples), 1);
    }

    #[test]
    fn schedule_never_lands_in_the_past() {
        let mixer = Mixer::new(100);
        let mut out = vec![0.0; 50];
        mixer.render(&mut out);
        let (_, start) = mixer.schedule(tone(10, 0.1), 0.0);
        assert_abs_diff_eq!(start, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn voice_spanning_blocks_stays_active_until_done() {
        let mixer = Mixer::new(100);
        let (id, _) = mixer.schedule(tone(15, 0.2), 0.0);
        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(mixer.is_active(id));
        mixer.render(&mut out);
        assert_eq!(&out[..5], &[0.2; 5]);
        assert_eq!(&out[5..], &[0.0; 5]);
        assert!(!mixer.is_active(id));
    }

    #[test]
    fn stereo_output_duplicates_mono_voice_and_clamps() {
        let mixer = Mixer::new(100);
        mixer.configure(100, 2);
        mixer.schedule(tone(2, 0.75), 0.0);
        mixer.schedule(tone(2, 0.75), 0.0);
        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(mixer.level().level().peak, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn handle_stops_voice() {
        let mixer = Arc::new(Mixer::new(100));
        let (id, _) = mixer.schedule(tone(100, 0.3), 0.0);
        let handle = PlaybackHandle::new(id, &mixer);
        assert!(handle.is_playing());
        assert!(handle.stop());
        assert!(!handle.is_playing());
        assert!(!handle.stop());

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn stop_all_empties_the_set() {
        let mixer = Mixer::new(100);
        mixer.schedule(tone(10, 0.1), 0.0);
        mixer.schedule(tone(10, 0.1), 0.1);
        let stopped = mixer.stop_all();
        assert_eq!(stopped.len(), 2);
        assert_eq!(mixer.active_count(), 0);
    }
}
