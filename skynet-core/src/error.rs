use thiserror::Error;

/// All errors produced by skynet-core.
#[derive(Debug, Error)]
pub enum SkynetError {
    /// Microphone access denied or no usable input device. The caller may retry `start()`.
    #[error("microphone access failed: {0}")]
    Permission(String),

    /// An inbound audio chunk could not be decoded. The chunk is dropped.
    #[error("malformed audio chunk: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// One or more teardown steps failed. All steps were still attempted.
    #[error("teardown incomplete: {0}")]
    UnexpectedShutdown(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("voice session has been torn down")]
    TornDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SkynetError>;
