use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SOURCE_ALLOWLIST: &[&str] = &[
    "wikipedia.org",
    "britannica.com",
    "nationalgeographic.com",
    "nasa.gov",
    "si.edu",
    "smithsonianmag.com",
    "nps.gov",
    "unesco.org",
    "bbc.co.uk",
    "history.com",
];

/// Order in which speech providers are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsOrder {
    GeminiFirst,
    ElevenLabsFirst,
    Auto,
}

impl TtsOrder {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "elevenlabs" => Self::ElevenLabsFirst,
            "auto" => Self::Auto,
            _ => Self::GeminiFirst,
        }
    }
}

/// Timeouts applied to each external call.
#[derive(Clone, Debug)]
pub struct ProviderTimeouts {
    pub vision: Duration,
    pub research: Duration,
    pub chat: Duration,
    pub tts: Duration,
    pub transcribe: Duration,
}

#[derive(Clone, Debug)]
pub struct ProviderKeys {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_text_model: String,
    pub gemini_tts_model: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub openai_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_api_base: String,
    pub elevenlabs_model: String,
}

/// Content policy applied to research and moderation.
#[derive(Clone, Debug)]
pub struct ContentPolicy {
    pub source_allowlist: Vec<String>,
    pub min_fact_confidence: f64,
    pub strict_safety: bool,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub session_ttl: chrono::Duration,
    pub upload_ttl: chrono::Duration,
    pub fact_cache_ttl: chrono::Duration,
    /// How long moderation incidents are kept for review.
    pub incident_retention: chrono::Duration,
    pub max_upload_bytes: usize,
    pub max_audio_bytes: usize,
    pub max_image_dimension: u32,
    pub policy: ContentPolicy,
    pub tts_order: TtsOrder,
    pub timeouts: ProviderTimeouts,
    pub providers: ProviderKeys,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: PathBuf::from("./data"),
            session_ttl: chrono::Duration::minutes(120),
            upload_ttl: chrono::Duration::minutes(60),
            fact_cache_ttl: chrono::Duration::minutes(1440),
            incident_retention: chrono::Duration::days(7),
            max_upload_bytes: 8 * 1024 * 1024,
            max_audio_bytes: 4 * 1024 * 1024,
            max_image_dimension: 1600,
            policy: ContentPolicy {
                source_allowlist: DEFAULT_SOURCE_ALLOWLIST
                    .iter()
                    .map(|domain| domain.to_string())
                    .collect(),
                min_fact_confidence: 0.6,
                strict_safety: true,
            },
            tts_order: TtsOrder::GeminiFirst,
            timeouts: ProviderTimeouts {
                vision: Duration::from_millis(12_000),
                research: Duration::from_millis(15_000),
                chat: Duration::from_millis(12_000),
                tts: Duration::from_millis(15_000),
                transcribe: Duration::from_millis(12_000),
            },
            providers: ProviderKeys {
                gemini_api_key: None,
                gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                gemini_text_model: "gemini-2.5-flash".to_string(),
                gemini_tts_model: "gemini-2.5-flash-preview-tts".to_string(),
                openai_api_key: None,
                openai_api_base: "https://api.openai.com/v1".to_string(),
                openai_model: "gpt-4o-mini".to_string(),
                elevenlabs_api_key: None,
                elevenlabs_api_base: "https://api.elevenlabs.io/v1".to_string(),
                elevenlabs_model: "eleven_turbo_v2_5".to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let source_allowlist = non_empty_env("CURIO_SOURCE_ALLOWLIST")
            .map(|raw| parse_allowlist(&raw))
            .filter(|domains| !domains.is_empty())
            .unwrap_or(defaults.policy.source_allowlist);

        Self {
            port: parsed_env("PORT").unwrap_or(defaults.port),
            data_dir: non_empty_env("CURIO_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            session_ttl: minutes_env("CURIO_SESSION_TTL_MINUTES").unwrap_or(defaults.session_ttl),
            upload_ttl: minutes_env("CURIO_UPLOAD_TTL_MINUTES").unwrap_or(defaults.upload_ttl),
            fact_cache_ttl: minutes_env("CURIO_FACT_CACHE_TTL_MINUTES")
                .unwrap_or(defaults.fact_cache_ttl),
            incident_retention: minutes_env("CURIO_INCIDENT_RETENTION_MINUTES")
                .unwrap_or(defaults.incident_retention),
            max_upload_bytes: parsed_env("CURIO_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
            max_audio_bytes: parsed_env("CURIO_MAX_AUDIO_BYTES")
                .unwrap_or(defaults.max_audio_bytes),
            max_image_dimension: parsed_env("CURIO_MAX_IMAGE_DIMENSION")
                .unwrap_or(defaults.max_image_dimension),
            policy: ContentPolicy {
                source_allowlist,
                min_fact_confidence: parsed_env::<f64>("CURIO_MIN_FACT_CONFIDENCE")
                    .map(|value| value.clamp(0.0, 1.0))
                    .unwrap_or(defaults.policy.min_fact_confidence),
                strict_safety: non_empty_env("CURIO_STRICT_SAFETY")
                    .map(|value| !matches!(value.to_lowercase().as_str(), "false" | "0" | "off"))
                    .unwrap_or(defaults.policy.strict_safety),
            },
            tts_order: non_empty_env("CURIO_TTS_ORDER")
                .map(|value| TtsOrder::parse(&value))
                .unwrap_or(defaults.tts_order),
            timeouts: ProviderTimeouts {
                vision: millis_env("CURIO_VISION_TIMEOUT_MS").unwrap_or(defaults.timeouts.vision),
                research: millis_env("CURIO_RESEARCH_TIMEOUT_MS")
                    .unwrap_or(defaults.timeouts.research),
                chat: millis_env("CURIO_CHAT_TIMEOUT_MS").unwrap_or(defaults.timeouts.chat),
                tts: millis_env("CURIO_TTS_TIMEOUT_MS").unwrap_or(defaults.timeouts.tts),
                transcribe: millis_env("CURIO_TRANSCRIBE_TIMEOUT_MS")
                    .unwrap_or(defaults.timeouts.transcribe),
            },
            providers: ProviderKeys {
                gemini_api_key: non_empty_env("GEMINI_API_KEY")
                    .or_else(|| non_empty_env("GOOGLE_API_KEY")),
                gemini_api_base: non_empty_env("GEMINI_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.providers.gemini_api_base),
                gemini_text_model: non_empty_env("GEMINI_TEXT_MODEL")
                    .unwrap_or(defaults.providers.gemini_text_model),
                gemini_tts_model: non_empty_env("GEMINI_TTS_MODEL")
                    .unwrap_or(defaults.providers.gemini_tts_model),
                openai_api_key: non_empty_env("OPENAI_API_KEY"),
                openai_api_base: non_empty_env("OPENAI_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.providers.openai_api_base),
                openai_model: non_empty_env("OPENAI_MODEL")
                    .unwrap_or(defaults.providers.openai_model),
                elevenlabs_api_key: non_empty_env("ELEVENLABS_API_KEY"),
                elevenlabs_api_base: non_empty_env("ELEVENLABS_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.providers.elevenlabs_api_base),
                elevenlabs_model: non_empty_env("ELEVENLABS_MODEL")
                    .unwrap_or(defaults.providers.elevenlabs_model),
            },
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_env(key).and_then(|value| value.parse().ok())
}

fn minutes_env(key: &str) -> Option<chrono::Duration> {
    parsed_env::<i64>(key)
        .filter(|minutes| *minutes > 0)
        .map(chrono::Duration::minutes)
}

fn millis_env(key: &str) -> Option<Duration> {
    parsed_env::<u64>(key)
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

fn parse_allowlist(raw: &str) -> Vec<String> {
    let mut out = Vec::<String>::new();
    for entry in raw.split(',') {
        let domain = entry
            .trim()
            .trim_start_matches("*.")
            .trim_start_matches('.')
            .to_lowercase();
        if domain.is_empty() || out.contains(&domain) {
            continue;
        }
        out.push(domain);
    }
    out
}
