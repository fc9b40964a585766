//! Passive signal-level taps for the visualizer.
//!
//! Writers (capture worker, output callback) publish the RMS and peak of
//! each block they process; readers poll [`LevelMeter::level`] once per
//! render frame. Values are stored as `f32` bits in atomics so neither side
//! ever waits on the other.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use serde::Serialize;

/// Instantaneous level of the most recent block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalLevel {
    /// Root-mean-square level in [0.0, 1.0].
    pub rms: f32,
    /// Largest absolute sample in [0.0, 1.0].
    pub peak: f32,
}

#[derive(Debug, Default)]
struct LevelCells {
    rms: AtomicU32,
    peak: AtomicU32,
}

/// Cloneable handle to one gain stage's level. Clones share the same cells.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    cells: Arc<LevelCells>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the level of `samples`. Allocation-free; safe on a device thread.
    pub fn update(&self, samples: &[f32]) {
        let (rms, peak) = measure(samples);
        self.cells.rms.store(rms.to_bits(), Ordering::Relaxed);
        self.cells.peak.store(peak.to_bits(), Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.cells.rms.store(0f32.to_bits(), Ordering::Relaxed);
        self.cells.peak.store(0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> SignalLevel {
        SignalLevel {
            rms: f32::from_bits(self.cells.rms.load(Ordering::Relaxed)),
            peak: f32::from_bits(self.cells.peak.load(Ordering::Relaxed)),
        }
    }
}

fn measure(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut sum_sq = 0f32;
    let mut peak = 0f32;
    for &s in samples {
        sum_sq += s * s;
        peak = peak.max(s.abs());
    }
    ((sum_sq / samples.len() as f32).sqrt().min(1.0), peak.min(1.0))
}
