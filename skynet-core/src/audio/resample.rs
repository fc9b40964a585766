//! Sample-rate conversion with rubato's `FastFixedIn`.
//!
//! Two shapes are needed:
//!
//! - [`RateConverter`] is streaming: the capture worker feeds it whatever
//!   the ring yielded and gets 16 kHz audio back, with partial chunks carried
//!   over between calls.
//! - [`resample_block`] converts one complete playback segment from the
//!   24 kHz wire rate to the output device rate.
//!
//! Equal rates short-circuit to a copy in both cases; no rubato session is
//! created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{Result, SkynetError};

fn build(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0, // fixed ratio
        PolynomialDegree::Cubic,
        chunk_size,
        1, // mono
    )
    .map_err(|e| SkynetError::AudioDevice(format!("resampler init: {e}")))
}

/// Streaming mono converter from a device rate to a fixed target rate.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    input_buf: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `SkynetError::AudioDevice` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let resampler = build(from_rate, to_rate, chunk_size)?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
        debug!(from_rate, to_rate, chunk_size, "capture resampler ready");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    /// Feed samples and append whatever full chunks produce to `out`.
    pub fn process_into(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(samples);
            return;
        };

        self.input_buf.extend_from_slice(samples);
        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    out.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("capture resampler error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert one complete mono block between rates.
///
/// # Errors
/// `SkynetError::AudioDevice` if rubato fails.
pub fn resample_block(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = build(from_rate, to_rate, samples.len())?;
    let mut out = resampler
        .process(&[samples], None)
        .map_err(|e| SkynetError::AudioDevice(format!("resample: {e}")))?;
    Ok(out.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let mut out = Vec::new();
        rc.process_into(&samples, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn downsamples_48k_to_16k() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(!rc.is_passthrough());
        let mut out = Vec::new();
        rc.process_into(&vec![0.0f32; 960], &mut out);
        assert!(
            (out.len() as isize - 320).unsigned_abs() <= 10,
            "output len={}",
            out.len()
        );
    }

    #[test]
    fn partial_chunks_accumulate() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let mut out = Vec::new();
        rc.process_into(&vec![0.0f32; 500], &mut out);
        assert!(out.is_empty());
        rc.process_into(&vec![0.0f32; 500], &mut out);
        assert!(!out.is_empty(), "second push should complete a chunk");
    }

    #[test]
    fn block_24k_to_48k_doubles_length() {
        let out = resample_block(&vec![0.1f32; 2400], 24_000, 48_000).unwrap();
        assert!(
            (out.len() as isize - 4800).unsigned_abs() <= 10,
            "output len={}",
            out.len()
        );
    }

    #[test]
    fn block_same_rate_is_copy() {
        let input = vec![0.25f32; 10];
        assert_eq!(resample_block(&input, 24_000, 24_000).unwrap(), input);
    }
}
