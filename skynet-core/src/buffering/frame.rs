//! Fixed-size capture frames.

/// One block of mono samples at the capture rate.
///
/// Only lives for the duration of a single frame callback.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: &'a [f32],
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame<'_> {
    /// Duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Regroups an arbitrary sample stream into fixed `block_size` frames.
///
/// Samples that do not fill a whole block are held until the next push.
#[derive(Debug)]
pub struct FrameAccumulator {
    block_size: usize,
    pending: Vec<f32>,
}

impl FrameAccumulator {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 4),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Append samples and call `on_frame` once per completed block, in order.
    pub fn push(&mut self, samples: &[f32], mut on_frame: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        let full = self.pending.len() / self.block_size * self.block_size;
        for block in self.pending[..full].chunks_exact(self.block_size) {
            on_frame(block);
        }
        self.pending.drain(..full);
    }

    /// Samples waiting for a full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_full_blocks_in_order() {
        let mut acc = FrameAccumulator::new(4);
        let mut frames = Vec::new();
        acc.push(&[1.0, 2.0, 3.0], |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        assert_eq!(acc.pending(), 3);

        acc.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f.to_vec()));
        assert_eq!(
            frames,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn clear_drops_partial_block() {
        let mut acc = FrameAccumulator::new(256);
        acc.push(&[0.1; 100], |_| panic!("no full block yet"));
        acc.clear();
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn frame_duration() {
        let samples = [0.0f32; 256];
        let frame = AudioFrame {
            samples: &samples,
            sample_rate: 16_000,
        };
        assert!((frame.duration_secs() - 0.016).abs() < 1e-9);
        assert!(!frame.is_empty());
    }
}
