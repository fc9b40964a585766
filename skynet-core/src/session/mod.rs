//! Session lifecycle manager.
//!
//! `VoiceSession` owns one conversation: the output context (mixer + speaker
//! stream), the capture pipeline and the live session handle. It is built
//! once, driven by `start_recording`/`stop_recording`, and torn down once.
//!
//! ```text
//! uninitialized ──open()──► connecting ──on_open──► open ──on_close──► closed
//!                               │                     │
//!                               └──── connect error ──┴──on_error──► errored
//! teardown() from any phase ─────────────────────────────────────────► closed
//! ```

pub mod diagnostics;
pub mod status;
pub mod transport;

pub use transport::LiveConfig;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{level::LevelMeter, mixer::Mixer, output::OutputContext, AudioHost},
    capture::{CaptureConfig, CapturePipeline},
    error::{Result, SkynetError},
    ipc::{
        events::{SessionPhase, StatusEvent},
        live::LiveServerMessage,
    },
    playback::PlaybackScheduler,
};
use diagnostics::{DiagnosticsSnapshot, SessionDiagnostics};
use status::StatusBoard;
use transport::{LiveConnector, LiveSession, SessionCallbacks};

/// Slot holding the open session handle; empty before connect and after teardown.
pub type SessionSlot = Arc<RwLock<Option<Arc<dyn LiveSession>>>>;

/// Session construction parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capture rate sent on the wire. Default: 16000.
    pub input_sample_rate: u32,
    /// Rate of inbound model audio. Default: 24000.
    pub output_sample_rate: u32,
    /// Capture frame size in samples. Default: 256.
    pub capture_block_size: usize,
    pub preferred_input_device: Option<String>,
    pub live: LiveConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            output_sample_rate: 24_000,
            capture_block_size: 256,
            preferred_input_device: None,
            live: LiveConfig::default(),
        }
    }
}

/// Routes transport callbacks into the status board and the scheduler.
struct CallbackRouter {
    board: Arc<StatusBoard>,
    scheduler: Arc<PlaybackScheduler>,
    diagnostics: Arc<SessionDiagnostics>,
}

impl SessionCallbacks for CallbackRouter {
    fn on_open(&self) {
        if !self
            .board
            .advance(SessionPhase::Connecting, SessionPhase::Open, "Opened")
        {
            debug!(phase = ?self.board.phase(), "on_open after leaving connecting");
        }
    }

    fn on_message(&self, message: LiveServerMessage) {
        SessionDiagnostics::bump(&self.diagnostics.messages_received);
        let outcome = self.scheduler.handle_message(&message);

        if outcome.scheduled.is_some() {
            SessionDiagnostics::bump(&self.diagnostics.segments_scheduled);
        }
        match outcome.dropped {
            Some(SkynetError::TornDown) => debug!("inbound audio after teardown ignored"),
            Some(_) => SessionDiagnostics::bump(&self.diagnostics.decode_errors),
            None => {}
        }
        if let Some(stopped) = outcome.interrupted {
            SessionDiagnostics::bump(&self.diagnostics.interruptions);
            self.diagnostics
                .segments_stopped
                .fetch_add(stopped, Ordering::Relaxed);
        }
    }

    fn on_error(&self, message: String) {
        error!(%message, "live session error");
        self.board.set_phase(SessionPhase::Errored);
        self.board.set_error(message);
    }

    fn on_close(&self, reason: String) {
        info!(%reason, "live session closed");
        self.board.set_phase(SessionPhase::Closed);
        self.board.set_status(format!("Close:{reason}"));
    }
}

/// One live voice conversation.
pub struct VoiceSession {
    board: Arc<StatusBoard>,
    diagnostics: Arc<SessionDiagnostics>,
    session: SessionSlot,
    scheduler: Arc<PlaybackScheduler>,
    capture: CapturePipeline,
    output: Mutex<OutputContext>,
    torn_down: AtomicBool,
}

impl VoiceSession {
    /// Open the output device, prepare capture, and start connecting.
    ///
    /// A failed connection does not fail construction: the phase becomes
    /// `errored` with the failure as error text, and the session can still
    /// be torn down.
    ///
    /// # Errors
    /// Output device failures (`AudioDevice`, `AudioStream`,
    /// `NoDefaultOutputDevice`).
    pub fn open(
        config: SessionConfig,
        host: Arc<dyn AudioHost>,
        connector: &dyn LiveConnector,
    ) -> Result<Self> {
        let board = Arc::new(StatusBoard::new());
        let diagnostics = Arc::new(SessionDiagnostics::default());
        let session: SessionSlot = Arc::new(RwLock::new(None));

        let mixer = Arc::new(Mixer::new(config.output_sample_rate));
        let output = OutputContext::open(Arc::clone(&host), Arc::clone(&mixer))?;
        let scheduler = Arc::new(PlaybackScheduler::new(mixer, config.output_sample_rate));

        let capture = CapturePipeline::new(
            host,
            CaptureConfig {
                sample_rate: config.input_sample_rate,
                block_size: config.capture_block_size,
                preferred_device: config.preferred_input_device.clone(),
            },
            Arc::clone(&session),
            Arc::clone(&board),
            Arc::clone(&diagnostics),
        );

        let router = Arc::new(CallbackRouter {
            board: Arc::clone(&board),
            scheduler: Arc::clone(&scheduler),
            diagnostics: Arc::clone(&diagnostics),
        });

        board.set_phase(SessionPhase::Connecting);
        board.set_status("Connecting...");
        info!(model = %config.live.model, voice = %config.live.voice_name, "connecting live session");

        match connector.connect(&config.live, router) {
            Ok(handle) => *session.write() = Some(handle),
            Err(e) => {
                warn!("live session connect failed: {e}");
                board.set_phase(SessionPhase::Errored);
                board.set_error(e.to_string());
            }
        }

        Ok(Self {
            board,
            diagnostics,
            session,
            scheduler,
            capture,
            output: Mutex::new(output),
            torn_down: AtomicBool::new(false),
        })
    }

    /// [`open`](Self::open) with the system audio devices.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(config: SessionConfig, connector: &dyn LiveConnector) -> Result<Self> {
        Self::open(config, Arc::new(crate::audio::cpal_host::CpalHost::new()), connector)
    }

    /// Begin streaming microphone audio. Blocks until the device opens or is refused.
    pub fn start_recording(&self) -> Result<()> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(SkynetError::TornDown);
        }
        self.capture.start()
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.capture.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn phase(&self) -> SessionPhase {
        self.board.phase()
    }

    /// Latest phase, status line and error text.
    pub fn status(&self) -> StatusEvent {
        self.board.snapshot()
    }

    /// Error text if any, otherwise the status line.
    pub fn display_text(&self) -> String {
        self.board.snapshot().display_text().to_string()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.board.subscribe()
    }

    pub fn input_level(&self) -> LevelMeter {
        self.capture.level()
    }

    pub fn output_level(&self) -> LevelMeter {
        self.scheduler.mixer().level()
    }

    pub fn scheduler(&self) -> &Arc<PlaybackScheduler> {
        &self.scheduler
    }

    /// Frame callback of the capture pipeline, for hosts that deliver frames directly.
    pub fn push_frame(&self, samples: &[f32]) {
        self.capture.on_frame(samples);
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Release everything: stop capture, close the session, close the input
    /// context, close the output context. Every step runs even when an
    /// earlier one fails. A second call is a no-op.
    ///
    /// # Errors
    /// `SkynetError::UnexpectedShutdown` listing each failed step.
    pub fn teardown(&self) -> Result<()> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("tearing down voice session");

        let mut failures: Vec<String> = Vec::new();

        if let Err(e) = self.capture.stop() {
            failures.push(format!("stop capture: {e}"));
        }

        let handle = self.session.write().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.close() {
                failures.push(format!("close session: {e}"));
            }
        }

        if let Err(e) = self.capture.close() {
            failures.push(format!("close input context: {e}"));
        }

        self.scheduler.close();
        if let Err(e) = self.output.lock().close() {
            failures.push(format!("close output context: {e}"));
        }

        self.board.set_phase(SessionPhase::Closed);

        if failures.is_empty() {
            debug!(diagnostics = ?self.diagnostics.snapshot(), "voice session closed");
            Ok(())
        } else {
            let detail = failures.join("; ");
            self.board.set_error(detail.clone());
            Err(SkynetError::UnexpectedShutdown(detail))
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("teardown on drop: {e}");
        }
    }
}
