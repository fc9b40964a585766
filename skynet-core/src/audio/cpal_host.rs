//! `cpal` implementation of [`AudioHost`].
//!
//! The input callback takes channel 0 of each interleaved frame, converts it
//! to f32 and pushes it into the ring; the output callback asks the mixer to
//! render straight into the device buffer (or into a scratch buffer for
//! integer formats). Neither callback performs I/O, and the scratch buffers
//! only grow when the device hands over a larger block than before.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BuildStreamError, Device, SampleFormat, SampleRate, StreamConfig,
};
use tracing::{error, info, warn};

use super::{mixer::Mixer, AudioHost, StreamGuard};
use crate::{
    buffering::{AudioProducer, Producer},
    error::{Result, SkynetError},
};

/// Wire rate of model audio; used when the output device supports it.
const PREFERRED_OUTPUT_RATE: u32 = 24_000;

/// System audio through the platform default `cpal` host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

fn permission_from_build(e: BuildStreamError) -> SkynetError {
    match e {
        BuildStreamError::DeviceNotAvailable => {
            SkynetError::Permission("input device not available".into())
        }
        other => SkynetError::Permission(other.to_string()),
    }
}

fn select_input(preferred: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(found) =
                    devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
                {
                    return Ok(found);
                }
                warn!(preferred = name, "preferred input device not found, falling back");
            }
            Err(e) => warn!("failed to list input devices: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }
    let mut devices = host
        .input_devices()
        .map_err(|e| SkynetError::Permission(e.to_string()))?;
    let fallback = devices
        .next()
        .ok_or_else(|| SkynetError::Permission("no microphone found".into()))?;
    warn!("no default input device, using first available");
    Ok(fallback)
}

impl AudioHost for CpalHost {
    fn open_input(
        &self,
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device: Option<&str>,
    ) -> Result<StreamGuard> {
        let device = select_input(preferred_device)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SkynetError::Permission(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(sample_rate, channels, "input config selected");

        let err_fn = |err: cpal::StreamError| error!("input stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut mono: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        mono.clear();
                        mono.extend(data.iter().step_by(channels).copied());
                        push_or_warn(&mut producer, &mono);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut mono: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        mono.clear();
                        mono.extend(
                            data.iter()
                                .step_by(channels)
                                .map(|s| *s as f32 / 32768.0),
                        );
                        push_or_warn(&mut producer, &mono);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U8 => {
                let mut mono: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        mono.clear();
                        mono.extend(
                            data.iter()
                                .step_by(channels)
                                .map(|s| (*s as f32 - 128.0) / 128.0),
                        );
                        push_or_warn(&mut producer, &mono);
                    },
                    err_fn,
                    None,
                )
            }
            fmt => {
                return Err(SkynetError::AudioStream(format!(
                    "unsupported input sample format: {fmt:?}"
                )))
            }
        }
        .map_err(permission_from_build)?;

        stream
            .play()
            .map_err(|e| SkynetError::Permission(e.to_string()))?;

        Ok(StreamGuard::new(sample_rate, stream))
    }

    fn open_output(&self, mixer: Arc<Mixer>) -> Result<StreamGuard> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(SkynetError::NoDefaultOutputDevice)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let default = device
            .default_output_config()
            .map_err(|e| SkynetError::AudioDevice(e.to_string()))?;

        let default_format = default.sample_format();

        // Run at the wire rate when the device allows it, so segments need no resampling.
        let supported = device
            .supported_output_configs()
            .ok()
            .and_then(|mut ranges| {
                ranges.find(|r| {
                    r.sample_format() == default_format
                        && r.min_sample_rate().0 <= PREFERRED_OUTPUT_RATE
                        && r.max_sample_rate().0 >= PREFERRED_OUTPUT_RATE
                })
            })
            .map(|r| r.with_sample_rate(SampleRate(PREFERRED_OUTPUT_RATE)))
            .unwrap_or(default);

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        mixer.configure(sample_rate, channels);
        info!(sample_rate, channels, "output config selected");

        let err_fn = |err: cpal::StreamError| error!("output stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _info| mixer.render(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _info| {
                        scratch.resize(data.len(), 0.0);
                        mixer.render(&mut scratch);
                        for (dst, src) in data.iter_mut().zip(&scratch) {
                            *dst = (src * 32767.0) as i16;
                        }
                    },
                    err_fn,
                    None,
                )
            }
            fmt => {
                return Err(SkynetError::AudioStream(format!(
                    "unsupported output sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| SkynetError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SkynetError::AudioStream(e.to_string()))?;

        Ok(StreamGuard::new(sample_rate, stream))
    }
}

fn push_or_warn(producer: &mut AudioProducer, samples: &[f32]) {
    let written = producer.push_slice(samples);
    if written < samples.len() {
        warn!("ring buffer full: dropped {} samples", samples.len() - written);
    }
}
