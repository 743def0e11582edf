use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use curio_core::persona::VoiceArchetype;
use serde_json::{Value, json};

use super::{CompletionRequest, LanguageModel, ProviderError, SpeechClip, SpeechProvider, send_json};
use crate::voice::wav;

const DEFAULT_PCM_SAMPLE_RATE: u32 = 24_000;

/// Shared connection settings for Gemini `generateContent` calls.
#[derive(Clone)]
struct GeminiEndpoint {
    api_base: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GeminiEndpoint {
    fn url_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn generate(&self, model: &str, payload: &Value) -> Result<Value, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Disabled("gemini".to_string()))?;
        send_json(
            self.http
                .post(self.url_for_model(model))
                .query(&[("key", api_key)])
                .json(payload),
        )
        .await
    }
}

/// Gemini text/vision model.
pub struct GeminiModel {
    endpoint: GeminiEndpoint,
    model: String,
}

impl GeminiModel {
    pub fn new(api_base: &str, api_key: Option<String>, model: &str, http: reqwest::Client) -> Self {
        Self {
            endpoint: GeminiEndpoint {
                api_base: api_base.trim_end_matches('/').to_string(),
                api_key,
                http,
            },
            model: model.to_string(),
        }
    }
}

fn build_generate_payload(request: &CompletionRequest) -> Value {
    let mut parts = Vec::new();
    for media in &request.attachments {
        parts.push(json!({
            "inline_data": {
                "mime_type": media.mime_type,
                "data": BASE64.encode(&media.bytes),
            }
        }));
    }
    parts.push(json!({ "text": request.prompt }));

    let mut generation_config = json!({ "temperature": request.temperature });
    if request.json {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut payload = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    });
    if let Some(system) = request.system.as_deref() {
        payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    payload
}

/// Concatenate the text parts of the first candidate.
pub fn extract_candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// First inline-data part of the first candidate as `(mime_type, bytes)`.
pub fn extract_inline_audio(response: &Value) -> Result<(String, Vec<u8>), ProviderError> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidPayload("gemini response has no parts".to_string()))?;

    for part in parts {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("audio/L16")
            .to_string();
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidPayload("inline data missing".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|err| ProviderError::InvalidPayload(format!("audio base64: {err}")))?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidPayload("empty audio payload".to_string()));
        }
        return Ok((mime_type, bytes));
    }
    Err(ProviderError::InvalidPayload(
        "gemini response has no inline audio".to_string(),
    ))
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_enabled(&self) -> bool {
        self.endpoint.api_key.is_some()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let response = self
            .endpoint
            .generate(&self.model, &build_generate_payload(request))
            .await?;
        extract_candidate_text(&response)
            .ok_or_else(|| ProviderError::InvalidPayload("gemini returned no text".to_string()))
    }
}

/// Gemini speech generation. Returns raw PCM which is wrapped into WAV here.
pub struct GeminiSpeech {
    endpoint: GeminiEndpoint,
    model: String,
}

impl GeminiSpeech {
    pub fn new(api_base: &str, api_key: Option<String>, model: &str, http: reqwest::Client) -> Self {
        Self {
            endpoint: GeminiEndpoint {
                api_base: api_base.trim_end_matches('/').to_string(),
                api_key,
                http,
            },
            model: model.to_string(),
        }
    }

    fn voice_for(archetype: VoiceArchetype) -> &'static str {
        match archetype {
            VoiceArchetype::Playful => "Puck",
            VoiceArchetype::Wise => "Charon",
            VoiceArchetype::Adventurous => "Fenrir",
            VoiceArchetype::Inventor => "Kore",
        }
    }
}

/// Parse `rate=NNNN` out of a PCM mime type such as `audio/L16;codec=pcm;rate=24000`.
fn pcm_sample_rate(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .filter_map(|segment| segment.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_PCM_SAMPLE_RATE)
}

#[async_trait]
impl SpeechProvider for GeminiSpeech {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_enabled(&self) -> bool {
        self.endpoint.api_key.is_some()
    }

    async fn synthesize(
        &self,
        text: &str,
        archetype: VoiceArchetype,
    ) -> Result<SpeechClip, ProviderError> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": Self::voice_for(archetype) }
                    }
                }
            }
        });
        let response = self.endpoint.generate(&self.model, &payload).await?;
        let (mime_type, bytes) = extract_inline_audio(&response)?;

        let lowered = mime_type.to_ascii_lowercase();
        if lowered.contains("l16") || lowered.contains("pcm") {
            let rate = pcm_sample_rate(&lowered);
            return Ok(SpeechClip {
                bytes: wav::wrap_pcm(&bytes, rate, 1, 16),
                content_type: "audio/wav".to_string(),
            });
        }
        Ok(SpeechClip {
            bytes,
            content_type: mime_type,
        })
    }
}
