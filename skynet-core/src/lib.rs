//! # skynet-core
//!
//! Real-time audio core for live voice chat with a remote conversational model.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioHost input → SPSC RingBuffer → capture worker (16 kHz, 256-sample frames)
//!                                                        │
//!                                              codec::encode → LiveSession::send_realtime_input
//!
//! LiveSession callbacks ─► on_message ─► codec::decode ─► PlaybackScheduler
//!                                                              │
//!                                          Mixer (Active Segment Set + device clock)
//!                                                              │
//!                                                 AudioHost output callback → speaker
//! ```
//!
//! The device callbacks neither allocate nor free. Encoding, decoding and resampling
//! happen on the capture worker and on the transport's message task.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod codec;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod session;

// Convenience re-exports for downstream crates
pub use audio::{level::LevelMeter, level::SignalLevel, AudioHost, StreamGuard};
pub use codec::{EncodedChunk, PlayableBuffer};
pub use error::SkynetError;
pub use ipc::events::{SessionPhase, StatusEvent};
pub use ipc::live::{LiveServerMessage, Part, ServerContent};
pub use session::transport::{LiveConnector, LiveSession, SessionCallbacks};
pub use session::{LiveConfig, SessionConfig, VoiceSession};

#[cfg(feature = "audio-cpal")]
pub use audio::cpal_host::CpalHost;
