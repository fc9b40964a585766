//! Output audio context: one speaker stream rendering one [`Mixer`].
//!
//! The stream is opened and dropped on a dedicated thread because device
//! streams are not `Send`. `open` blocks until the host reports success or
//! failure; `close` signals the thread, waits for it to drop the stream, and
//! silences the mixer.

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use tracing::{info, warn};

use super::{mixer::Mixer, AudioHost};
use crate::error::{Result, SkynetError};

pub struct OutputContext {
    mixer: Arc<Mixer>,
    sample_rate: u32,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputContext {
    /// # Errors
    /// Whatever the host reports for the output device, or
    /// `SkynetError::AudioStream` if the device thread cannot be spawned.
    pub fn open(host: Arc<dyn AudioHost>, mixer: Arc<Mixer>) -> Result<Self> {
        let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let thread_mixer = Arc::clone(&mixer);

        let thread = std::thread::Builder::new()
            .name("skynet-output".into())
            .spawn(move || {
                let guard = match host.open_output(thread_mixer) {
                    Ok(guard) => {
                        let _ = open_tx.send(Ok(guard.sample_rate));
                        guard
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                // Park until close() sends or drops the sender.
                let _ = shutdown_rx.recv();
                drop(guard);
            })
            .map_err(|e| SkynetError::AudioStream(format!("spawn output thread: {e}")))?;

        match open_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!(sample_rate, "output context open");
                Ok(Self {
                    mixer,
                    sample_rate,
                    shutdown_tx: Some(shutdown_tx),
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(SkynetError::AudioStream(
                    "output thread died before reporting".into(),
                ))
            }
        }
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_open(&self) -> bool {
        self.thread.is_some()
    }

    /// Release the output device. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let stopped = self.mixer.stop_all();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "stopped voices on output close");
        }
        self.mixer.level().reset();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| {
                warn!("output thread panicked");
                SkynetError::AudioStream("output thread panicked".into())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for OutputContext {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
