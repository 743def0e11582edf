use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use curio_core::analysis::{AnalysisResult, AnalysisStatus};
use curio_core::conversation::ConversationState;
use curio_core::entity::CanonicalEntity;
use curio_core::facts::FactPack;
use curio_core::moderation::SafetyVerdict;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{Components, PipelineError, mentions_own_depiction};
use crate::moderation::deliverable_text;
use crate::persona::pick_speakable_fact;
use crate::store::SharedStore;

/// Handle to one background analysis run. Dropping it detaches the run;
/// the outcome is always written into the stored `AnalysisResult`.
pub struct AnalysisTask {
    pub analysis_id: Uuid,
    handle: JoinHandle<AnalysisStatus>,
}

impl AnalysisTask {
    /// Wait for the run to reach a terminal status.
    pub async fn wait(self) -> AnalysisStatus {
        self.handle.await.unwrap_or(AnalysisStatus::Failed)
    }
}

/// Everything the run produced, applied to the result in one transition.
struct Opening {
    entity: CanonicalEntity,
    hook_text: Option<String>,
    reply_text: String,
    audio_stream_url: Option<String>,
    safety_status: SafetyVerdict,
    conversation_id: Option<Uuid>,
}

pub struct AnalysisOrchestrator {
    components: Arc<Components>,
    analyses: SharedStore<AnalysisResult>,
    conversations: SharedStore<ConversationState>,
}

impl AnalysisOrchestrator {
    pub fn new(
        components: Arc<Components>,
        analyses: SharedStore<AnalysisResult>,
        conversations: SharedStore<ConversationState>,
    ) -> Self {
        Self {
            components,
            analyses,
            conversations,
        }
    }

    /// Record a queued analysis and schedule its run. Returns immediately.
    pub fn start_analysis(self: &Arc<Self>, session_id: &str, upload_id: Uuid) -> AnalysisTask {
        let analysis_id = Uuid::now_v7();
        let now = Utc::now();
        self.analyses.put(
            &analysis_id.to_string(),
            AnalysisResult {
                analysis_id,
                session_id: session_id.to_string(),
                image_url: format!("/v1/uploads/{upload_id}"),
                status: AnalysisStatus::Queued,
                entity: None,
                hook_text: None,
                first_reply_text: None,
                first_reply_audio_stream_url: None,
                safety_status: None,
                conversation_id: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        tracing::info!(analysis_id = %analysis_id, upload_id = %upload_id, "analysis queued");

        let orchestrator = Arc::clone(self);
        let session_id = session_id.to_string();
        let handle = tokio::spawn(async move {
            orchestrator.drive(analysis_id, session_id, upload_id).await
        });
        AnalysisTask {
            analysis_id,
            handle,
        }
    }

    pub fn get(&self, analysis_id: &Uuid) -> Option<AnalysisResult> {
        self.analyses.get(&analysis_id.to_string())
    }

    async fn drive(
        self: Arc<Self>,
        analysis_id: Uuid,
        session_id: String,
        upload_id: Uuid,
    ) -> AnalysisStatus {
        if !self.transition(analysis_id, AnalysisStatus::Processing, &mut |_: &mut AnalysisResult| {}) {
            return self.status_of(analysis_id);
        }

        // The steps run in their own task so a panic surfaces as a JoinError
        // here instead of leaving the result stuck in `processing`.
        let worker = {
            let orchestrator = Arc::clone(&self);
            tokio::spawn(async move { orchestrator.run(analysis_id, &session_id, upload_id).await })
        };
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(err) => Err(PipelineError::Aborted(err.to_string())),
        };

        match outcome {
            Ok(opening) => self.mark_ready(analysis_id, opening),
            Err(err) => {
                tracing::warn!(analysis_id = %analysis_id, error = %err, "analysis failed");
                self.mark_failed(analysis_id, &err)
            }
        }
        self.status_of(analysis_id)
    }

    async fn run(
        &self,
        analysis_id: Uuid,
        session_id: &str,
        upload_id: Uuid,
    ) -> Result<Opening, PipelineError> {
        let c = &self.components;
        let image = c
            .sessions
            .resolve_image(&upload_id.to_string())
            .ok_or_else(|| PipelineError::ImageNotFound(upload_id.to_string()))?;
        if image.session_id != session_id {
            return Err(PipelineError::SessionMismatch);
        }
        let bytes = tokio::fs::read(&image.file_path)
            .await
            .map_err(|err| PipelineError::Unreadable(err.to_string()))?;

        let entity = c
            .entities
            .detect_entity(&bytes, &image.mime_type, image.original_name.as_deref())
            .await;
        tracing::info!(
            entity_id = %entity.entity_id,
            category = entity.category.as_str(),
            roleplay_mode = ?entity.roleplay_mode,
            "entity resolved"
        );

        let mut label_check = c.moderation.moderate_image_label(session_id, &entity.detected_label);
        if label_check.is_allowed() && entity.label != entity.detected_label {
            label_check = c.moderation.moderate_image_label(session_id, &entity.label);
        }
        if !label_check.is_allowed() {
            return Ok(Opening {
                reply_text: deliverable_text("", &label_check),
                entity,
                hook_text: None,
                audio_stream_url: None,
                safety_status: label_check.verdict,
                conversation_id: None,
            });
        }
        self.record_entity(analysis_id, &entity);

        let pack = c.research.get_fact_pack(&entity).await;
        let persona = c.persona.build_persona(&entity);
        let hook = c.persona.build_hook(&entity);
        let template = c.persona.build_first_reply(&pack, &hook);

        let generated = c
            .generate_reply(
                c.persona.system_instruction(&entity, &persona),
                opening_prompt(&pack, &hook),
            )
            .await
            .filter(|text| !mentions_own_depiction(text, &entity));
        let reply = generated.unwrap_or(template);

        let output_check = c.moderation.moderate_output(session_id, &reply);
        let reply_text = deliverable_text(&reply, &output_check);
        let audio = c
            .voice
            .synthesize_to_asset(&reply_text, persona.voice_archetype)
            .await;

        let conversation_id = Uuid::now_v7();
        let now = Utc::now();
        // Same fact the template opening used, plus any skipped on the way.
        let mut used_fact_indexes = BTreeSet::new();
        pick_speakable_fact(&pack, &mut used_fact_indexes);
        self.conversations.put(
            &conversation_id.to_string(),
            ConversationState {
                conversation_id,
                session_id: session_id.to_string(),
                entity: entity.clone(),
                fact_pack: pack,
                persona,
                opening_text: reply_text.clone(),
                used_fact_indexes,
                turns: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );

        Ok(Opening {
            entity,
            hook_text: Some(hook),
            reply_text,
            audio_stream_url: audio.map(|asset| asset.stream_url),
            safety_status: output_check.verdict,
            conversation_id: Some(conversation_id),
        })
    }

    /// Expose the resolved entity to pollers while the run continues.
    fn record_entity(&self, analysis_id: Uuid, entity: &CanonicalEntity) {
        self.analyses
            .update(&analysis_id.to_string(), &mut |result: &mut AnalysisResult| {
                if result.status == AnalysisStatus::Processing {
                    result.entity = Some(entity.clone());
                    result.updated_at = Utc::now();
                }
            });
    }

    fn mark_ready(&self, analysis_id: Uuid, opening: Opening) {
        let applied = self.transition(analysis_id, AnalysisStatus::Ready, &mut |result: &mut AnalysisResult| {
            result.entity = Some(opening.entity.clone());
            result.hook_text = opening.hook_text.clone();
            result.first_reply_text = Some(opening.reply_text.clone());
            result.first_reply_audio_stream_url = opening.audio_stream_url.clone();
            result.safety_status = Some(opening.safety_status);
            result.conversation_id = opening.conversation_id;
        });
        if applied {
            tracing::info!(
                analysis_id = %analysis_id,
                safety_status = opening.safety_status.as_str(),
                has_audio = opening.audio_stream_url.is_some(),
                "analysis ready"
            );
        }
    }

    fn mark_failed(&self, analysis_id: Uuid, err: &PipelineError) {
        let message = err.to_string();
        self.transition(analysis_id, AnalysisStatus::Failed, &mut |result: &mut AnalysisResult| {
            result.error = Some(message.clone());
        });
    }

    /// Apply `next` only when the state machine allows it. Returns whether
    /// the transition happened.
    pub(crate) fn transition(
        &self,
        analysis_id: Uuid,
        next: AnalysisStatus,
        apply: &mut dyn FnMut(&mut AnalysisResult),
    ) -> bool {
        let mut applied = false;
        self.analyses
            .update(&analysis_id.to_string(), &mut |result: &mut AnalysisResult| {
                if !result.status.can_transition_to(next) {
                    tracing::warn!(
                        analysis_id = %analysis_id,
                        from = result.status.as_str(),
                        to = next.as_str(),
                        "rejected analysis status transition"
                    );
                    return;
                }
                result.status = next;
                result.updated_at = Utc::now();
                apply(result);
                applied = true;
            });
        applied
    }

    fn status_of(&self, analysis_id: Uuid) -> AnalysisStatus {
        self.get(&analysis_id)
            .map(|result| result.status)
            .unwrap_or(AnalysisStatus::Failed)
    }
}

fn opening_prompt(pack: &FactPack, hook: &str) -> String {
    let fact = pack
        .facts
        .first()
        .map(|fact| fact.claim.as_str())
        .unwrap_or(pack.summary.as_str());
    format!(
        "A child just took a photo of you. Write your opening message. \
         Begin with exactly this hook: \"{hook}\". Then share this fact in first person: \"{fact}\". \
         Background: {summary}. Finish with one curious question for the child.",
        summary = pack.summary
    )
}
