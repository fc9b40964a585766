//! 16-bit PCM wire codec.
//!
//! Outbound frames travel as base64 text of little-endian `i16` samples
//! because the session envelope is JSON. Inbound model audio arrives the same
//! way and is turned back into de-interleaved `f32` channels here.
//!
//! Everything in this module is pure and allocation is bounded by the input
//! size.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SkynetError};

/// Scale between `f32` samples in [-1, 1] and `i16` PCM.
const PCM_SCALE: f32 = 32768.0;

/// A base64-encoded block of 16-bit LE PCM tagged with its MIME descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    /// Base64 text of the raw PCM bytes.
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

impl EncodedChunk {
    /// Number of PCM bytes this chunk decodes to, without decoding it.
    pub fn pcm_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        ((self.data.len() / 4) * 3).saturating_sub(padding)
    }
}

/// MIME descriptor for mono 16-bit PCM at `sample_rate`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Quantise one sample. Full-scale positive input saturates at `i16::MAX`.
#[inline]
fn quantize(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * PCM_SCALE).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert a frame to raw 16-bit little-endian PCM bytes.
pub fn encode_pcm16(frame: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.len() * 2);
    for &sample in frame {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    bytes
}

/// Encode a capture frame for transport.
///
/// NaN or infinite samples are a caller error; the result for them is unspecified.
pub fn encode(frame: &[f32], sample_rate: u32) -> EncodedChunk {
    EncodedChunk {
        data: STANDARD.encode(encode_pcm16(frame)),
        mime_type: pcm_mime_type(sample_rate),
    }
}

/// Undo the textual transport encoding. Does not interpret the bytes.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| SkynetError::Decode(format!("base64: {e}")))
}

/// De-interleaved `f32` audio ready to be scheduled on an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PlayableBuffer {
    /// Mono buffer from samples already in device format.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Collapse to a single channel by averaging. Mono buffers are returned as-is.
    pub fn into_mono(mut self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels.pop().unwrap_or_default();
        }
        let count = self.channels.len() as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f32>() / count)
            .collect()
    }
}

/// Interpret `raw` as interleaved 16-bit LE PCM and split it into channels.
///
/// # Errors
/// `SkynetError::Decode` unless `raw.len()` is a positive multiple of
/// `channel_count * 2`.
pub fn decode_to_playable_buffer(
    raw: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> Result<PlayableBuffer> {
    if channel_count == 0 {
        return Err(SkynetError::Decode("channel count must be positive".into()));
    }
    let stride = channel_count * 2;
    if raw.is_empty() || raw.len() % stride != 0 {
        return Err(SkynetError::Decode(format!(
            "{} bytes is not a positive multiple of {stride}",
            raw.len()
        )));
    }

    let frames = raw.len() / stride;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for (i, pair) in raw.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM_SCALE;
        channels[i % channel_count].push(sample);
    }

    Ok(PlayableBuffer {
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_only_payload_has_no_pcm() {
        for data in ["=", "==", "===="] {
            let chunk = EncodedChunk {
                data: data.into(),
                mime_type: pcm_mime_type(16_000),
            };
            assert_eq!(chunk.pcm_len(), 0, "{data}");
        }
    }

    #[test]
    fn silent_frame_is_512_zero_bytes() {
        let frame = [0.0f32; 256];
        let pcm = encode_pcm16(&frame);
        assert_eq!(pcm.len(), 512);
        assert!(pcm.iter().all(|b| *b == 0));

        let chunk = encode(&frame, 16_000);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.pcm_len(), 512);
        assert_eq!(decode(&chunk.data).unwrap(), pcm);
    }

    #[test]
    fn quantisation_is_little_endian_and_saturates() {
        let pcm = encode_pcm16(&[0.5, -1.0, 1.0, 2.0, -3.0]);
        let values: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![16384, -32768, 32767, 32767, -32768]);
    }

    #[test]
    fn round_trip_within_one_step() {
        let samples: Vec<f32> = (0..1000)
            .map(|i| ((i as f32) * 0.0123).sin() * 0.999)
            .chain([1.0, -1.0, 0.0])
            .collect();
        let chunk = encode(&samples, 16_000);
        let raw = decode(&chunk.data).unwrap();
        let buffer = decode_to_playable_buffer(&raw, 16_000, 1).unwrap();
        let back = buffer.channel(0).unwrap();
        assert_eq!(back.len(), samples.len());
        for (a, b) in samples.iter().zip(back) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn stereo_is_deinterleaved() {
        let raw = encode_pcm16(&[0.25, -0.25, 0.5, -0.5]);
        let buffer = decode_to_playable_buffer(&raw, 24_000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0).unwrap(), &[0.25, 0.5]);
        assert_eq!(buffer.channel(1).unwrap(), &[-0.25, -0.5]);
        assert_eq!(buffer.into_mono(), vec![0.0, 0.0]);
    }

    #[test]
    fn duration_follows_sample_rate() {
        let raw = vec![0u8; 48_000];
        let buffer = decode_to_playable_buffer(&raw, 24_000, 1).unwrap();
        assert_eq!(buffer.frames(), 24_000);
        assert!((buffer.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_odd_or_empty_payloads() {
        assert!(matches!(
            decode_to_playable_buffer(&[], 24_000, 1),
            Err(SkynetError::Decode(_))
        ));
        assert!(matches!(
            decode_to_playable_buffer(&[1, 2, 3], 24_000, 1),
            Err(SkynetError::Decode(_))
        ));
        assert!(matches!(
            decode_to_playable_buffer(&[0, 0, 0, 0, 0, 0], 24_000, 2),
            Err(SkynetError::Decode(_))
        ));
        assert!(matches!(
            decode_to_playable_buffer(&[0, 0], 24_000, 0),
            Err(SkynetError::Decode(_))
        ));
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(matches!(decode("not base64!!"), Err(SkynetError::Decode(_))));
    }

    #[test]
    fn chunk_serializes_with_camel_case_mime_type() {
        let chunk = encode(&[0.0; 4], 16_000);
        let json = serde_json::to_value(&chunk).expect("serialize chunk");
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["data"], "AAAAAAAAAAA=");
    }
}
