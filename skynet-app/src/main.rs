//! Skynet terminal host.
//!
//! Opens one live voice session and drives it from stdin:
//! `start`, `stop`, `levels`, `devices`, `status`, `back`/`quit`.

mod live;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use skynet_core::{audio::device::list_devices, VoiceSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use live::WsConnector;
use settings::{default_settings_path, load_settings, save_settings};

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("skynet_core=info,skynet=info")),
        )
        .init();

    info!("Skynet starting");

    let settings_path = default_settings_path();
    let mut app_settings = load_settings(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &app_settings) {
            warn!(settings_path = ?settings_path, "could not write default settings: {e}");
        }
    }
    app_settings.apply_env_overrides();
    info!(
        settings_path = ?settings_path,
        model = %app_settings.model,
        voice = %app_settings.voice_name,
        has_api_key = app_settings.api_key.is_some(),
        "settings loaded"
    );

    // ── Session setup ─────────────────────────────────────────────────────
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("skynet-rt")
        .build()
        .context("build tokio runtime")?;

    let connector = WsConnector::new(
        runtime.handle().clone(),
        app_settings.endpoint.clone(),
        app_settings.api_key.clone(),
    );
    let session = Arc::new(
        VoiceSession::open_default(app_settings.session_config(), &connector)
            .context("open audio output")?,
    );

    let result = runtime.block_on(run_console(Arc::clone(&session)));

    if let Err(e) = session.teardown() {
        warn!("teardown: {e}");
    }
    // Let the socket task flush its close frame.
    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("Skynet stopped");
    result
}

async fn run_console(session: Arc<VoiceSession>) -> anyhow::Result<()> {
    let mut status_rx = session.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => println!("[{:?}] {}", event.phase, event.display_text()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", session.display_text());
    println!("commands: start | stop | levels | devices | status | back");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "start" => {
                        // Blocks until the microphone opens or is refused.
                        let s = Arc::clone(&session);
                        if let Err(e) = tokio::task::spawn_blocking(move || s.start_recording()).await? {
                            warn!("start recording: {e}");
                        }
                    }
                    "stop" => {
                        let s = Arc::clone(&session);
                        if let Err(e) = tokio::task::spawn_blocking(move || s.stop_recording()).await? {
                            warn!("stop recording: {e}");
                        }
                    }
                    "levels" => {
                        let input = session.input_level().level();
                        let output = session.output_level().level();
                        println!(
                            "mic rms {:.3} peak {:.3} | speaker rms {:.3} peak {:.3}",
                            input.rms, input.peak, output.rms, output.peak
                        );
                    }
                    "devices" => {
                        for device in list_devices() {
                            let marker = if device.is_default { "*" } else { " " };
                            println!("{marker} {:?} {}", device.kind, device.name);
                        }
                    }
                    "status" => {
                        println!("{}", serde_json::to_string_pretty(&session.status())?);
                        println!("{}", serde_json::to_string_pretty(&session.diagnostics_snapshot())?);
                    }
                    "back" | "quit" | "exit" => break,
                    other => println!("unknown command: {other}"),
                }
            }
        }
    }
    Ok(())
}
