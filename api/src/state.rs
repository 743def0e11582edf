use std::sync::Arc;

use crate::config::AppConfig;
use crate::entity::EntityResolver;
use crate::ingest::{MalwareScanner, NoopScanner};
use crate::moderation::ModerationGate;
use crate::persona::{PersonaEngine, Randomness, ThreadRandomness};
use crate::pipeline::{AnalysisOrchestrator, Components, ConversationEngine};
use crate::providers::elevenlabs::ElevenLabsSpeech;
use crate::providers::gemini::{GeminiModel, GeminiSpeech};
use crate::providers::openai::OpenAiModel;
use crate::providers::{LanguageModel, ModelChain, SpeechProvider};
use crate::research::ResearchCache;
use crate::sessions::SessionStore;
use crate::store::Stores;
use crate::voice::{VoiceSynthesizer, order_providers};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub conversations: Arc<ConversationEngine>,
    pub voice: Arc<VoiceSynthesizer>,
}

impl AppState {
    /// Wire every component against real providers. Providers without an API
    /// key stay in the chain but report themselves disabled.
    pub fn build(config: AppConfig, http: reqwest::Client) -> Self {
        let keys = &config.providers;
        let models = ModelChain::new(vec![
            Arc::new(GeminiModel::new(
                &keys.gemini_api_base,
                keys.gemini_api_key.clone(),
                &keys.gemini_text_model,
                http.clone(),
            )) as Arc<dyn LanguageModel>,
            Arc::new(OpenAiModel::new(
                &keys.openai_api_base,
                keys.openai_api_key.clone(),
                &keys.openai_model,
                http.clone(),
            )),
        ]);
        let speech = order_providers(
            config.tts_order,
            Arc::new(GeminiSpeech::new(
                &keys.gemini_api_base,
                keys.gemini_api_key.clone(),
                &keys.gemini_tts_model,
                http.clone(),
            )) as Arc<dyn SpeechProvider>,
            Arc::new(ElevenLabsSpeech::new(
                &keys.elevenlabs_api_base,
                keys.elevenlabs_api_key.clone(),
                &keys.elevenlabs_model,
                http,
            )),
        );

        Self::assemble(
            config,
            Stores::in_memory(),
            models,
            speech,
            Arc::new(ThreadRandomness),
            Arc::new(NoopScanner),
        )
    }

    pub fn assemble(
        config: AppConfig,
        stores: Stores,
        models: ModelChain,
        speech: Vec<Arc<dyn SpeechProvider>>,
        rng: Arc<dyn Randomness>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> Self {
        let timeouts = config.timeouts.clone();
        let sessions = Arc::new(SessionStore::new(
            &config,
            stores.sessions.clone(),
            stores.uploads.clone(),
            stores.user_audio.clone(),
            scanner,
        ));
        let voice = Arc::new(VoiceSynthesizer::new(
            speech,
            timeouts.tts,
            config.audio_dir(),
            stores.audio_assets.clone(),
        ));
        let components = Arc::new(Components {
            moderation: Arc::new(ModerationGate::new(
                config.policy.strict_safety,
                stores.incidents.clone(),
            )),
            entities: Arc::new(EntityResolver::new(
                models.clone(),
                timeouts.vision,
                timeouts.chat,
            )),
            research: Arc::new(ResearchCache::new(
                models.clone(),
                stores.fact_cache.clone(),
                config.policy.clone(),
                config.fact_cache_ttl,
                timeouts.research,
            )),
            persona: Arc::new(PersonaEngine::new(rng)),
            voice: Arc::clone(&voice),
            sessions: Arc::clone(&sessions),
            models,
            chat_timeout: timeouts.chat,
            transcribe_timeout: timeouts.transcribe,
        });
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            Arc::clone(&components),
            stores.analyses.clone(),
            stores.conversations.clone(),
        ));
        let conversations = Arc::new(ConversationEngine::new(
            components,
            stores.conversations.clone(),
        ));

        Self {
            config: Arc::new(config),
            stores,
            sessions,
            orchestrator,
            conversations,
            voice,
        }
    }

    #[cfg(test)]
    pub fn for_tests(data_dir: &std::path::Path, models: ModelChain) -> Self {
        use crate::persona::FixedRandomness;

        let config = AppConfig {
            data_dir: data_dir.to_path_buf(),
            ..AppConfig::default()
        };
        Self::assemble(
            config,
            Stores::in_memory(),
            models,
            Vec::new(),
            Arc::new(FixedRandomness(0)),
            Arc::new(NoopScanner),
        )
    }
}
