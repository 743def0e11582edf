use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use super::{CompletionRequest, LanguageModel, ProviderError, send_json};

/// OpenAI-compatible chat completions model (text + image input).
pub struct OpenAiModel {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(api_base: &str, api_key: Option<String>, model: &str, http: reqwest::Client) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            http,
        }
    }
}

fn build_chat_payload(model: &str, request: &CompletionRequest) -> Result<Value, ProviderError> {
    let mut content = vec![json!({ "type": "text", "text": request.prompt })];
    for media in &request.attachments {
        if media.is_audio() {
            return Err(ProviderError::Unsupported(
                "audio attachments are not accepted by chat completions".to_string(),
            ));
        }
        content.push(json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", media.mime_type, BASE64.encode(&media.bytes)),
            }
        }));
    }

    let mut messages = Vec::new();
    if let Some(system) = request.system.as_deref() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": content }));

    let mut payload = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
    });
    if request.json {
        payload["response_format"] = json!({ "type": "json_object" });
    }
    Ok(payload)
}

fn extract_message_text(response: &Value) -> Option<String> {
    let text = response
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Disabled("openai".to_string()))?;
        let payload = build_chat_payload(&self.model, request)?;
        let response = send_json(
            self.http
                .post(format!("{}/chat/completions", self.api_base))
                .bearer_auth(api_key)
                .json(&payload),
        )
        .await?;
        extract_message_text(&response)
            .ok_or_else(|| ProviderError::InvalidPayload("openai returned no content".to_string()))
    }
}
