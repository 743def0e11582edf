//! Discovery pipeline: the background analysis run and the follow-up
//! conversation turns built on top of it.

use std::sync::Arc;
use std::time::Duration;

use curio_core::entity::CanonicalEntity;

use crate::entity::EntityResolver;
use crate::moderation::ModerationGate;
use crate::persona::PersonaEngine;
use crate::providers::{CompletionRequest, ModelChain};
use crate::research::ResearchCache;
use crate::sessions::SessionStore;
use crate::voice::VoiceSynthesizer;

pub mod analysis;
pub mod conversation;

pub use analysis::{AnalysisOrchestrator, AnalysisTask};
pub use conversation::ConversationEngine;

/// Terminal analysis failures. Written into `AnalysisResult.error`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upload '{0}' was not found or has expired")]
    ImageNotFound(String),
    #[error("upload belongs to a different session")]
    SessionMismatch,
    #[error("image could not be read: {0}")]
    Unreadable(String),
    #[error("analysis task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("conversation '{0}' was not found")]
    ConversationNotFound(String),
    #[error("conversation belongs to a different session")]
    SessionMismatch,
    #[error("audio reference '{0}' was not found or has expired")]
    AudioNotFound(String),
    #[error("no text could be resolved from the turn input")]
    EmptyInput,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared collaborators of the analysis run and the turn engine.
pub struct Components {
    pub moderation: Arc<ModerationGate>,
    pub entities: Arc<EntityResolver>,
    pub research: Arc<ResearchCache>,
    pub persona: Arc<PersonaEngine>,
    pub voice: Arc<VoiceSynthesizer>,
    pub sessions: Arc<SessionStore>,
    /// Text generation and transcription
    pub models: ModelChain,
    pub chat_timeout: Duration,
    pub transcribe_timeout: Duration,
}

impl Components {
    /// One generated reply, or `None` so the caller takes its template path.
    pub(crate) async fn generate_reply(&self, system: String, prompt: String) -> Option<String> {
        if !self.models.is_enabled() {
            return None;
        }
        let request = CompletionRequest::text(prompt, self.chat_timeout).with_system(system);
        match self.models.complete(&request).await {
            Ok(completion) => {
                let text = completion.text.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Err(err) => {
                tracing::warn!(error = %err, "reply generation failed, using template");
                None
            }
        }
    }
}

/// Generated text for a character that still calls itself a bust or statue
/// is discarded in favor of the template.
pub(crate) fn mentions_own_depiction(text: &str, entity: &CanonicalEntity) -> bool {
    entity.is_character() && crate::persona::names_a_depiction(text)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use std::collections::BTreeSet;

    use chrono::Utc;
    use curio_core::conversation::ConversationState;
    use curio_core::entity::{CanonicalEntity, EntityCategory, RoleplayMode, slugify};
    use curio_core::facts::{FactItem, FactPack};
    use curio_core::persona::{PersonaProfile, VoiceArchetype};
    use uuid::Uuid;

    use super::*;
    use crate::config::AppConfig;
    use crate::ingest::NoopScanner;
    use crate::persona::FixedRandomness;
    use crate::store::Stores;

    pub fn fact(claim: &str) -> FactItem {
        FactItem {
            claim: claim.to_string(),
            confidence: 0.9,
            source_urls: vec!["https://en.wikipedia.org/wiki/Oak".to_string()],
            freshness_date: "2026-01-01".to_string(),
        }
    }

    /// Oak-tree conversation owned by `session_id` with fact 0 already used.
    pub fn seeded_conversation(stores: &Stores, session_id: &str) -> String {
        let entity = CanonicalEntity {
            entity_id: slugify("oak tree"),
            label: "oak tree".to_string(),
            detected_label: "oak tree".to_string(),
            category: EntityCategory::Nature,
            confidence: 0.9,
            research_subject: "oak tree".to_string(),
            roleplay_name: "oak tree".to_string(),
            roleplay_mode: RoleplayMode::AsObject,
        };
        let conversation_id = Uuid::now_v7();
        let now = Utc::now();
        stores.conversations.put(
            &conversation_id.to_string(),
            ConversationState {
                conversation_id,
                session_id: session_id.to_string(),
                fact_pack: FactPack {
                    entity: entity.clone(),
                    facts: vec![
                        fact("An oak tree can live for hundreds of years."),
                        fact("An oak tree can grow acorns."),
                        fact("Squirrels bury acorns and forget some."),
                    ],
                    summary: "Oaks are big, old trees.".to_string(),
                    generated_at: now,
                },
                entity,
                persona: PersonaProfile {
                    voice_archetype: VoiceArchetype::Adventurous,
                    speaking_style: "excited".to_string(),
                    hook_template_id: "object_adventurous".to_string(),
                },
                opening_text: "Hi!".to_string(),
                used_fact_indexes: BTreeSet::from([0]),
                turns: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );
        conversation_id.to_string()
    }

    /// Components wired to in-memory stores under `data_dir` with the given
    /// model chain and no speech providers.
    pub fn components(stores: &Stores, models: ModelChain, data_dir: &std::path::Path) -> Components {
        let config = AppConfig {
            data_dir: data_dir.to_path_buf(),
            ..AppConfig::default()
        };
        Components {
            moderation: Arc::new(ModerationGate::new(true, stores.incidents.clone())),
            entities: Arc::new(EntityResolver::new(
                models.clone(),
                Duration::from_secs(1),
                Duration::from_secs(1),
            )),
            research: Arc::new(ResearchCache::new(
                models.clone(),
                stores.fact_cache.clone(),
                config.policy.clone(),
                config.fact_cache_ttl,
                Duration::from_secs(1),
            )),
            persona: Arc::new(PersonaEngine::new(Arc::new(FixedRandomness(0)))),
            voice: Arc::new(VoiceSynthesizer::new(
                Vec::new(),
                Duration::from_secs(1),
                config.audio_dir(),
                stores.audio_assets.clone(),
            )),
            sessions: Arc::new(SessionStore::new(
                &config,
                stores.sessions.clone(),
                stores.uploads.clone(),
                stores.user_audio.clone(),
                Arc::new(NoopScanner),
            )),
            models,
            chat_timeout: Duration::from_secs(1),
            transcribe_timeout: Duration::from_secs(1),
        }
    }
}
