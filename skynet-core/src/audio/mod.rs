//! Audio device seam.
//!
//! # Design constraints
//!
//! Device callbacks run on OS audio threads at elevated priority. They
//! **must not** allocate, block on I/O, or panic. The input side satisfies
//! this by writing into an SPSC ring buffer; the output side by rendering
//! from the [`Mixer`](mixer::Mixer), whose critical sections are short and
//! allocation-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). [`AudioHost`] implementations are therefore always called on the
//! thread that will also drop the returned [`StreamGuard`]. The capture
//! worker and [`OutputContext`](output::OutputContext) each own such a thread.

pub mod device;
pub mod level;
pub mod mixer;
pub mod output;
pub mod resample;

#[cfg(feature = "audio-cpal")]
pub mod cpal_host;

use std::any::Any;
use std::sync::{atomic::AtomicBool, Arc};

use crate::buffering::AudioProducer;
use crate::error::Result;
use mixer::Mixer;

/// Keeps an open device stream alive. Dropping it releases the device.
///
/// **Not `Send`**: drop it on the thread that created it.
pub struct StreamGuard {
    /// Rate the device actually runs at (Hz).
    pub sample_rate: u32,
    _stream: Box<dyn Any>,
}

impl StreamGuard {
    pub fn new<S: Any>(sample_rate: u32, stream: S) -> Self {
        Self {
            sample_rate,
            _stream: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGuard")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

/// Platform audio backend.
pub trait AudioHost: Send + Sync + 'static {
    /// Open a microphone and push mono f32 samples (channel 0) into `producer`
    /// for as long as the guard lives. The callback must no-op while
    /// `running` is `false`.
    ///
    /// # Errors
    /// `SkynetError::Permission` when access is denied or no input device exists.
    fn open_input(
        &self,
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device: Option<&str>,
    ) -> Result<StreamGuard>;

    /// Open the speaker and render `mixer` into it for as long as the guard
    /// lives. Implementations call [`Mixer::configure`] with the device's
    /// actual rate and channel count before the stream starts.
    fn open_output(&self, mixer: Arc<Mixer>) -> Result<StreamGuard>;
}
