//! Microphone capture pipeline.
//!
//! ## Stages
//!
//! ```text
//! device callback ──push_slice──► SPSC ring ──► capture worker thread
//!                                                 1. drain ring
//!                                                 2. resample device rate → 16 kHz
//!                                                 3. regroup into 256-sample frames
//!                                                 4. frame callback: recording? → encode → send
//! ```
//!
//! The worker thread opens the device itself and drops it on exit, since
//! device streams cannot change threads. `start()` blocks until the device
//! is confirmed open or refused.
//!
//! `recording` is the only flag the frame callback consults, and it reads it
//! once per frame before doing anything else. `stop()` clears it before
//! touching the worker, so a frame already in flight when `stop()` begins is
//! the last one that can be sent. A `stop()` that lands while `start()` is
//! still waiting for the device wins: `start()` sees the stop and releases
//! the device instead of going live.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{level::LevelMeter, resample::RateConverter, AudioHost},
    buffering::{
        create_audio_ring,
        frame::{AudioFrame, FrameAccumulator},
        AudioConsumer, Consumer,
    },
    codec,
    error::{Result, SkynetError},
    session::{diagnostics::SessionDiagnostics, status::StatusBoard, SessionSlot},
};

/// Samples drained from the ring per worker iteration.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids a busy loop).
const IDLE_SLEEP: Duration = Duration::from_millis(4);

/// Capture parameters. The rate and block size are fixed by the wire contract.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate frames are delivered and encoded at. Default: 16000.
    pub sample_rate: u32,
    /// Samples per frame. Default: 256.
    pub block_size: usize,
    /// Input device name to prefer; `None` uses the system default.
    pub preferred_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            block_size: 256,
            preferred_device: None,
        }
    }
}

/// Everything the frame callback touches. Shared with the worker thread.
struct FrameSink {
    recording: AtomicBool,
    session: SessionSlot,
    board: Arc<StatusBoard>,
    diagnostics: Arc<SessionDiagnostics>,
    level: LevelMeter,
    /// Set after the first failed send so the error is surfaced once per outage.
    send_failing: AtomicBool,
}

impl FrameSink {
    fn process_frame(&self, frame: AudioFrame<'_>) {
        if !self.recording.load(Ordering::Acquire) {
            SessionDiagnostics::bump(&self.diagnostics.frames_dropped);
            return;
        }
        SessionDiagnostics::bump(&self.diagnostics.frames_captured);
        self.level.update(frame.samples);

        let chunk = codec::encode(frame.samples, frame.sample_rate);
        let session = self.session.read().clone();
        let result = match session {
            Some(session) => session.send_realtime_input(&chunk),
            None => Err(SkynetError::Transport("no open session".into())),
        };

        match result {
            Ok(()) => {
                SessionDiagnostics::bump(&self.diagnostics.chunks_sent);
                if self.send_failing.swap(false, Ordering::Relaxed) {
                    info!("realtime input flowing again");
                }
            }
            Err(e) => {
                SessionDiagnostics::bump(&self.diagnostics.send_failures);
                if !self.send_failing.swap(true, Ordering::Relaxed) {
                    self.board.set_error(format!("Failed to send audio: {e}"));
                }
            }
        }
    }
}

struct CaptureWorker {
    alive: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl CaptureWorker {
    /// Stop the worker and wait for it to release the device.
    fn shutdown(self) -> Result<()> {
        self.alive.store(false, Ordering::Release);
        self.thread
            .join()
            .map_err(|_| SkynetError::AudioStream("capture thread panicked".into()))
    }
}

/// Microphone → encoder → session pipeline with start/stop control.
pub struct CapturePipeline {
    host: Arc<dyn AudioHost>,
    config: CaptureConfig,
    sink: Arc<FrameSink>,
    worker: Mutex<Option<CaptureWorker>>,
    /// Bumped by every `stop()`; `start()` only goes live if it is unchanged.
    stops: AtomicU64,
    closed: AtomicBool,
}

impl CapturePipeline {
    pub fn new(
        host: Arc<dyn AudioHost>,
        config: CaptureConfig,
        session: SessionSlot,
        board: Arc<StatusBoard>,
        diagnostics: Arc<SessionDiagnostics>,
    ) -> Self {
        Self {
            host,
            config,
            sink: Arc::new(FrameSink {
                recording: AtomicBool::new(false),
                session,
                board,
                diagnostics,
                level: LevelMeter::new(),
                send_failing: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
            stops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.sink.recording.load(Ordering::Acquire)
    }

    /// Input-side level tap.
    pub fn level(&self) -> LevelMeter {
        self.sink.level.clone()
    }

    /// Frame callback. Exposed so hosts that deliver 16 kHz frames themselves
    /// can bypass the device worker. Never panics and never blocks on the network.
    pub fn on_frame(&self, samples: &[f32]) {
        self.sink.process_frame(AudioFrame {
            samples,
            sample_rate: self.config.sample_rate,
        });
    }

    /// Acquire the microphone and begin streaming frames. No-op while recording.
    ///
    /// # Errors
    /// - `SkynetError::Permission` when the device is refused or missing;
    ///   nothing is left running and `recording` stays `false`.
    /// - `SkynetError::TornDown` after [`close`](Self::close).
    pub fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SkynetError::TornDown);
        }

        let stops_at_start = self.stops.load(Ordering::Acquire);
        let mut worker = self.worker.lock();
        if self.is_recording() {
            return Ok(());
        }
        if let Some(stale) = worker.take() {
            let _ = stale.shutdown();
        }

        let board = &self.sink.board;
        board.set_status("Requesting microphone access...");

        let (producer, consumer) = create_audio_ring();
        let alive = Arc::new(AtomicBool::new(true));
        let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();

        let host = Arc::clone(&self.host);
        let sink = Arc::clone(&self.sink);
        let thread_alive = Arc::clone(&alive);
        let config = self.config.clone();

        let thread = thread::Builder::new()
            .name("skynet-capture".into())
            .spawn(move || {
                let guard = match host.open_input(
                    producer,
                    Arc::clone(&thread_alive),
                    config.preferred_device.as_deref(),
                ) {
                    Ok(guard) => guard,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let converter =
                    match RateConverter::new(guard.sample_rate, config.sample_rate, DRAIN_CHUNK) {
                        Ok(c) => c,
                        Err(e) => {
                            let _ = open_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = open_tx.send(Ok(guard.sample_rate));

                run_worker(consumer, converter, &config, &sink, &thread_alive);

                // Stream drops here, releasing the microphone on this thread.
                drop(guard);
                debug!("capture worker exited");
            })
            .map_err(|e| SkynetError::AudioStream(format!("spawn capture thread: {e}")));

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                board.set_status(format!("Error: {e}"));
                return Err(e);
            }
        };

        match open_rx.recv() {
            Ok(Ok(_)) if self.stops.load(Ordering::Acquire) != stops_at_start => {
                let stale = CaptureWorker { alive, thread };
                let result = stale.shutdown();
                info!("capture stopped before the device finished opening");
                board.set_status("Recording stopped. Click Start to begin again.");
                result
            }
            Ok(Ok(device_rate)) => {
                board.set_status("Microphone access granted. Starting capture...");
                *worker = Some(CaptureWorker { alive, thread });
                self.sink.send_failing.store(false, Ordering::Relaxed);
                self.sink.recording.store(true, Ordering::Release);
                info!(
                    device_rate,
                    rate = self.config.sample_rate,
                    block = self.config.block_size,
                    "capture started"
                );
                board.set_status("🔴 Recording... Capturing PCM chunks.");
                Ok(())
            }
            Ok(Err(e)) => {
                alive.store(false, Ordering::Release);
                let _ = thread.join();
                warn!("microphone unavailable: {e}");
                board.set_status(format!("Error: {e}"));
                Err(e)
            }
            Err(_) => {
                alive.store(false, Ordering::Release);
                let _ = thread.join();
                let e = SkynetError::Permission("capture thread died before opening".into());
                board.set_status(format!("Error: {e}"));
                Err(e)
            }
        }
    }

    /// Stop streaming and release the microphone. Safe to call at any time.
    ///
    /// # Errors
    /// `SkynetError::AudioStream` if the worker thread panicked; the
    /// pipeline is stopped regardless.
    pub fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::AcqRel);
        self.sink.recording.store(false, Ordering::Release);

        let worker = self.worker.lock().take();
        // A racing start() may have gone live while we waited for the lock.
        self.sink.recording.store(false, Ordering::Release);
        let Some(worker) = worker else {
            return Ok(());
        };
        let board = &self.sink.board;
        board.set_status("Stopping recording...");
        let result = worker.shutdown();
        self.sink.level.reset();
        info!("capture stopped");
        board.set_status("Recording stopped. Click Start to begin again.");
        result
    }

    /// Stop and close the input context; later `start()` calls fail.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.stop()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn run_worker(
    mut consumer: AudioConsumer,
    mut converter: RateConverter,
    config: &CaptureConfig,
    sink: &FrameSink,
    alive: &AtomicBool,
) {
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut resampled: Vec<f32> = Vec::with_capacity(DRAIN_CHUNK);
    let mut frames = FrameAccumulator::new(config.block_size);

    while alive.load(Ordering::Acquire) {
        let n = consumer.pop_slice(&mut raw);
        if n == 0 {
            thread::sleep(IDLE_SLEEP);
            continue;
        }

        resampled.clear();
        converter.process_into(&raw[..n], &mut resampled);
        frames.push(&resampled, |block| {
            sink.process_frame(AudioFrame {
                samples: block,
                sample_rate: config.sample_rate,
            })
        });
    }
}
