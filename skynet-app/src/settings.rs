//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skynet_core::{LiveConfig, SessionConfig};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub preferred_input_device: Option<String>,
    pub endpoint: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        let live = LiveConfig::default();
        Self {
            api_key: None,
            model: live.model,
            voice_name: live.voice_name,
            system_instruction: live.system_instruction,
            preferred_input_device: None,
            endpoint: DEFAULT_ENDPOINT.into(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = LiveConfig::default();
        self.api_key = trimmed(self.api_key.as_deref());
        self.model = normalize_model(&self.model, &defaults.model);
        self.voice_name = non_empty_or(&self.voice_name, &defaults.voice_name);
        self.system_instruction =
            non_empty_or(&self.system_instruction, &defaults.system_instruction);
        self.preferred_input_device = trimmed(self.preferred_input_device.as_deref());
        self.endpoint = normalize_endpoint(&self.endpoint);
    }

    /// Environment variables win over the file: `GEMINI_API_KEY` (or
    /// `API_KEY`) and `SKYNET_MODEL`, `SKYNET_VOICE`, `SKYNET_INPUT_DEVICE`,
    /// `SKYNET_ENDPOINT`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("SKYNET_MODEL") {
            self.model = model;
        }
        if let Some(voice) = lookup("SKYNET_VOICE") {
            self.voice_name = voice;
        }
        if let Some(device) = lookup("SKYNET_INPUT_DEVICE") {
            self.preferred_input_device = Some(device);
        }
        if let Some(endpoint) = lookup("SKYNET_ENDPOINT") {
            self.endpoint = endpoint;
        }
        self.normalize();
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            preferred_input_device: self.preferred_input_device.clone(),
            live: LiveConfig {
                model: self.model.clone(),
                system_instruction: self.system_instruction.clone(),
                voice_name: self.voice_name.clone(),
            },
            ..SessionConfig::default()
        }
    }
}

fn trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn non_empty_or(raw: &str, fallback: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        fallback.into()
    } else {
        value.into()
    }
}

/// Accepts `models/<id>` as well as the bare id.
pub fn normalize_model(raw: &str, fallback: &str) -> String {
    let model = raw.trim();
    let model = model.strip_prefix("models/").unwrap_or(model);
    non_empty_or(model, fallback)
}

pub fn normalize_endpoint(raw: &str) -> String {
    let endpoint = raw.trim().trim_end_matches('/');
    if endpoint.starts_with("wss://") || endpoint.starts_with("ws://") {
        endpoint.into()
    } else {
        DEFAULT_ENDPOINT.into()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Skynet")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("skynet")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
