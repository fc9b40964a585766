//! Boundary with the live conversational-session provider.
//!
//! The audio core never speaks a wire protocol itself. A [`LiveConnector`]
//! opens the session and hands back a [`LiveSession`] for outbound audio;
//! inbound traffic and lifecycle changes arrive through exactly four
//! [`SessionCallbacks`].

use std::sync::Arc;

use crate::{codec::EncodedChunk, error::Result, ipc::live::LiveServerMessage};

/// Outbound half of an open session.
pub trait LiveSession: Send + Sync + 'static {
    /// Queue one realtime input chunk. Must not block on the network.
    fn send_realtime_input(&self, chunk: &EncodedChunk) -> Result<()>;

    /// Close the session. Called exactly once, on teardown.
    fn close(&self) -> Result<()>;
}

/// Lifecycle and message callbacks a connector must drive.
///
/// Implementations of [`LiveConnector`] call `on_message` sequentially, in
/// arrival order, from a single task.
pub trait SessionCallbacks: Send + Sync + 'static {
    fn on_open(&self);
    fn on_message(&self, message: LiveServerMessage);
    fn on_error(&self, message: String);
    fn on_close(&self, reason: String);
}

/// Fixed model configuration sent when the session is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Model identifier.
    pub model: String,
    /// Persona instructions.
    pub system_instruction: String,
    /// Prebuilt response voice.
    pub voice_name: String,
}

/// Persona the assistant answers with.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "If asked \"Who is the owner of the app?\", \
\"Who designed the app?\", or \"Who created the app?\", you must answer: \"The designer and \
owner of the app is Engineer Islam Badawy\". If you are asked about your name, you must \
answer: \"My name is Skynet, and I was designed by Engineer Islam Badawy.\"";

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-native-audio-dialog".into(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.into(),
            voice_name: "Orus".into(),
        }
    }
}

/// Opens live sessions.
pub trait LiveConnector {
    /// Start connecting and return the session handle immediately.
    ///
    /// `callbacks.on_open` fires once the transport is ready; anything sent
    /// before that may be queued or dropped by the implementation.
    ///
    /// # Errors
    /// `SkynetError::Transport` if the connection cannot even be attempted.
    fn connect(
        &self,
        config: &LiveConfig,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Arc<dyn LiveSession>>;
}
