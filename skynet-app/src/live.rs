//! Gemini Live WebSocket transport.
//!
//! One tokio task owns the socket. Outbound chunks reach it through an
//! unbounded channel so the capture worker never waits on the network;
//! inbound frames are parsed and handed to the session callbacks in
//! arrival order from that same task. There is no reconnect: a dropped
//! socket ends the session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use skynet_core::{
    error::Result, EncodedChunk, LiveConfig, LiveConnector, LiveServerMessage, LiveSession,
    SessionCallbacks, SkynetError,
};
use tokio::{runtime::Handle, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Opens live sessions over WebSocket on the given runtime.
pub struct WsConnector {
    runtime: Handle,
    endpoint: String,
    api_key: Option<String>,
}

impl WsConnector {
    pub fn new(runtime: Handle, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            runtime,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

impl LiveConnector for WsConnector {
    fn connect(
        &self,
        config: &LiveConfig,
        callbacks: Arc<dyn SessionCallbacks>,
    ) -> Result<Arc<dyn LiveSession>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            SkynetError::Transport("no API key (set GEMINI_API_KEY or apiKey in settings)".into())
        })?;
        let url = session_url(&self.endpoint, api_key)?;
        let setup = setup_message(config).to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.spawn(run_link(url, setup, rx, callbacks));

        Ok(Arc::new(WsSession {
            tx,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Outbound half: queues frames for the socket task.
pub struct WsSession {
    tx: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl LiveSession for WsSession {
    fn send_realtime_input(&self, chunk: &EncodedChunk) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SkynetError::Transport("session closed".into()));
        }
        self.tx
            .send(Outbound::Text(realtime_input_message(chunk).to_string()))
            .map_err(|_| SkynetError::Transport("connection is gone".into()))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // The task may already have ended on its own.
        let _ = self.tx.send(Outbound::Close);
        Ok(())
    }
}

pub fn session_url(endpoint: &str, api_key: &str) -> Result<Url> {
    Url::parse_with_params(endpoint, &[("key", api_key)])
        .map_err(|e| SkynetError::Transport(format!("bad endpoint {endpoint}: {e}")))
}

/// First frame on the socket: model, AUDIO modality, voice and persona.
pub fn setup_message(config: &LiveConfig) -> Value {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };
    json!({
        "setup": {
            "model": model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": config.voice_name }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{ "text": config.system_instruction }]
            }
        }
    })
}

pub fn realtime_input_message(chunk: &EncodedChunk) -> Value {
    json!({ "realtimeInput": { "mediaChunks": [chunk] } })
}

async fn run_link(
    url: Url,
    setup: String,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    callbacks: Arc<dyn SessionCallbacks>,
) {
    match drive(url, setup, &mut rx, callbacks.as_ref()).await {
        Ok(Some(reason)) => callbacks.on_close(reason),
        Ok(None) => debug!("live link closed locally"),
        Err(e) => {
            warn!("live link failed: {e:#}");
            callbacks.on_error(e.to_string());
        }
    }
}

/// Returns the close reason when the server ends the session, `None` when we did.
async fn drive(
    url: Url,
    setup: String,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    callbacks: &dyn SessionCallbacks,
) -> anyhow::Result<Option<String>> {
    info!(host = url.host_str().unwrap_or_default(), "connecting live session");
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    callbacks.on_open();
    write.send(Message::Text(setup.into())).await?;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch(text.as_str().as_bytes(), callbacks),
                Some(Ok(Message::Binary(data))) => dispatch(&data, callbacks),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default();
                    return Ok(Some(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Some("connection ended".into())),
            },
            cmd = rx.recv() => match cmd {
                Some(Outbound::Text(text)) => write.send(Message::Text(text.into())).await?,
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(None);
                }
            },
        }
    }
}

fn dispatch(raw: &[u8], callbacks: &dyn SessionCallbacks) {
    match serde_json::from_slice::<LiveServerMessage>(raw) {
        Ok(message) => {
            if message.setup_complete.is_some() {
                debug!("setup complete");
            }
            callbacks.on_message(message);
        }
        Err(e) => warn!("ignoring unparseable server frame: {e}"),
    }
}
