use async_trait::async_trait;
use curio_core::persona::VoiceArchetype;
use serde_json::json;

use super::{ProviderError, SpeechClip, SpeechProvider, truncate_for_log};

/// ElevenLabs text-to-speech. Returns MP3 bytes.
pub struct ElevenLabsSpeech {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl ElevenLabsSpeech {
    pub fn new(api_base: &str, api_key: Option<String>, model: &str, http: reqwest::Client) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            http,
        }
    }

    fn voice_id_for(archetype: VoiceArchetype) -> &'static str {
        match archetype {
            VoiceArchetype::Playful => "jBpfuIE2acCO8z3wKNLl",
            VoiceArchetype::Wise => "onwK4e9ZLuTAKqWW03F9",
            VoiceArchetype::Adventurous => "TX3LPaxmHKxFdv7VOQHJ",
            VoiceArchetype::Inventor => "EXAVITQu4vr4xnSDxMaL",
        }
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsSpeech {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(
        &self,
        text: &str,
        archetype: VoiceArchetype,
    ) -> Result<SpeechClip, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Disabled("elevenlabs".to_string()))?;
        let url = format!(
            "{}/text-to-speech/{}",
            self.api_base,
            Self::voice_id_for(archetype)
        );
        let response = self
            .http
            .post(url)
            .header("xi-api-key", api_key)
            .header("accept", "audio/mpeg")
            .json(&json!({
                "text": text,
                "model_id": self.model,
                "voice_settings": { "stability": 0.5, "similarity_boost": 0.75 },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ProviderError::InvalidPayload(
                "elevenlabs returned empty audio".to_string(),
            ));
        }
        Ok(SpeechClip {
            bytes,
            content_type,
        })
    }
}
