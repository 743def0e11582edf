//! External model providers behind capability traits.
//!
//! Each capability (text/vision completion, speech synthesis) is an ordered
//! list of interchangeable providers. Callers iterate the list until one
//! succeeds and otherwise take their own deterministic fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curio_core::persona::VoiceArchetype;
use serde_json::Value;

pub mod elevenlabs;
pub mod gemini;
pub mod openai;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{0}' is disabled")]
    Disabled(String),
    #[error("no enabled provider produced a result")]
    Unavailable,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("unsupported request: {0}")]
    Unsupported(String),
}

/// Image or audio bytes sent alongside a prompt.
#[derive(Debug, Clone)]
pub struct InlineMedia {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InlineMedia {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the provider for a bare JSON object
    pub json: bool,
    pub attachments: Vec<InlineMedia>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn text(prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            json: false,
            attachments: Vec::new(),
            temperature: 0.7,
            timeout,
        }
    }

    pub fn json(prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            json: true,
            temperature: 0.2,
            ..Self::text(prompt, timeout)
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_attachment(mut self, media: InlineMedia) -> Self {
        self.attachments.push(media);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// A provider without credentials is disabled and never touches the network.
    fn is_enabled(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub provider: String,
}

/// Ordered list of language models tried until one answers.
#[derive(Clone, Default)]
pub struct ModelChain {
    models: Vec<Arc<dyn LanguageModel>>,
}

impl ModelChain {
    pub fn new(models: Vec<Arc<dyn LanguageModel>>) -> Self {
        Self { models }
    }

    pub fn is_enabled(&self) -> bool {
        self.models.iter().any(|model| model.is_enabled())
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        for model in self.models.iter().filter(|model| model.is_enabled()) {
            let outcome = match tokio::time::timeout(request.timeout, model.complete(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(request.timeout)),
            };
            match outcome {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(Completion {
                        text,
                        provider: model.name().to_string(),
                    });
                }
                Ok(_) => {
                    tracing::warn!(provider = model.name(), "model returned empty completion");
                }
                Err(err) => {
                    tracing::warn!(provider = model.name(), error = %err, "model call failed");
                }
            }
        }
        Err(ProviderError::Unavailable)
    }
}

/// Audio produced by a speech provider before it is stored.
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    async fn synthesize(
        &self,
        text: &str,
        archetype: VoiceArchetype,
    ) -> Result<SpeechClip, ProviderError>;
}

/// Send a prepared request and decode a JSON body, mapping non-2xx to `Status`.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|err| ProviderError::InvalidPayload(err.to_string()))
}

/// Pull the first JSON object out of model text, tolerating code fences and chatter.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

pub(crate) fn truncate_for_log(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted language model: pops replies in order, errors once exhausted.
    pub struct ScriptedModel {
        pub name: String,
        pub enabled: bool,
        replies: Mutex<Vec<Result<String, String>>>,
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                name: "scripted".to_string(),
                enabled: true,
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn disabled() -> Self {
            Self {
                enabled: false,
                ..Self::new(Vec::new())
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            match self.replies.lock().unwrap().pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(ProviderError::InvalidPayload(message)),
                None => Err(ProviderError::Unavailable),
            }
        }
    }

    pub fn chain_of(model: Arc<ScriptedModel>) -> ModelChain {
        ModelChain::new(vec![model as Arc<dyn LanguageModel>])
    }
}
