//! Inbound live-session message shape.
//!
//! Only the fields the audio core consumes are modelled; unknown fields are
//! ignored by serde.

use serde::{Deserialize, Serialize};

/// One message delivered by the session's `on_message` callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    /// The user spoke over the model; in-flight playback must stop.
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Inline media payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64 text.
    pub data: String,
}

impl LiveServerMessage {
    /// Base64 audio of the first part of the model turn, if present.
    ///
    /// Later parts are not read.
    pub fn audio_data(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|blob| blob.data.as_str())
            .filter(|data| !data.is_empty())
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    /// Model turn carrying a single audio part. Handy for transports and tests.
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    parts: vec![Part {
                        inline_data: Some(Blob {
                            mime_type: Some("audio/pcm;rate=24000".into()),
                            data: data.into(),
                        }),
                        text: None,
                    }],
                }),
                ..ServerContent::default()
            }),
            setup_complete: None,
        }
    }

    /// Bare interruption signal.
    pub fn interruption() -> Self {
        Self {
            server_content: Some(ServerContent {
                interrupted: true,
                ..ServerContent::default()
            }),
            setup_complete: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_turn_audio() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBB="}}
                    ]
                }
            }
        }"#;
        let msg: LiveServerMessage = serde_json::from_str(raw).expect("parse message");
        assert_eq!(msg.audio_data(), Some("AAA="));
        assert!(!msg.is_interrupted());
    }

    #[test]
    fn parses_interruption_without_audio() {
        let raw = r#"{"serverContent": {"interrupted": true}}"#;
        let msg: LiveServerMessage = serde_json::from_str(raw).expect("parse message");
        assert!(msg.is_interrupted());
        assert_eq!(msg.audio_data(), None);
    }

    #[test]
    fn text_only_and_setup_messages_carry_no_audio() {
        let text: LiveServerMessage = serde_json::from_str(
            r#"{"serverContent": {"modelTurn": {"parts": [{"text": "hi"}]}, "turnComplete": true}}"#,
        )
        .unwrap();
        assert_eq!(text.audio_data(), None);

        let setup: LiveServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert!(setup.setup_complete.is_some());
        assert_eq!(setup.audio_data(), None);
    }

    #[test]
    fn constructors_match_parsed_shape() {
        let json = serde_json::to_value(LiveServerMessage::audio("AAA=")).unwrap();
        assert_eq!(
            json["serverContent"]["modelTurn"]["parts"][0]["inlineData"]["data"],
            "AAA="
        );
        assert!(LiveServerMessage::interruption().is_interrupted());
    }
}
