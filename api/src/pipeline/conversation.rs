use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use curio_core::conversation::{
    ChatTurnRequest, ChatTurnResponse, ConversationState, ConversationTurn,
};
use curio_core::facts::FactItem;
use uuid::Uuid;

use super::{Components, TurnError, mentions_own_depiction};
use crate::moderation::deliverable_text;
use crate::persona::pick_speakable_fact;
use crate::providers::{CompletionRequest, InlineMedia};
use crate::store::SharedStore;

const CONTEXT_TURNS: usize = 4;
const EXTRA_CANDIDATE_FACTS: usize = 2;

pub struct ConversationEngine {
    components: Arc<Components>,
    conversations: SharedStore<ConversationState>,
}

impl ConversationEngine {
    pub fn new(components: Arc<Components>, conversations: SharedStore<ConversationState>) -> Self {
        Self {
            components,
            conversations,
        }
    }

    pub async fn chat_turn(
        &self,
        session_id: &str,
        conversation_id: &str,
        request: ChatTurnRequest,
    ) -> Result<ChatTurnResponse, TurnError> {
        let c = &self.components;
        let state = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| TurnError::ConversationNotFound(conversation_id.to_string()))?;
        if state.session_id != session_id {
            return Err(TurnError::SessionMismatch);
        }

        let user_text = self.resolve_user_text(session_id, &request).await?;
        let input_check = c.moderation.moderate_input(session_id, &user_text);

        let (reply_text, safety_verdict) = if input_check.is_allowed() {
            let reply = self.compose_reply(conversation_id, &state, &user_text).await;
            let output_check = c.moderation.moderate_output(session_id, &reply);
            (deliverable_text(&reply, &output_check), output_check.verdict)
        } else {
            tracing::info!(
                conversation_id = %conversation_id,
                verdict = input_check.verdict.as_str(),
                "turn input redirected"
            );
            (deliverable_text("", &input_check), input_check.verdict)
        };

        let turn = ConversationTurn {
            turn_id: Uuid::now_v7(),
            user_input: user_text,
            assistant_text: reply_text.clone(),
            safety_verdict,
            created_at: Utc::now(),
        };
        let appended = self
            .conversations
            .update(conversation_id, &mut |state: &mut ConversationState| {
                state.turns.push(turn.clone());
                state.updated_at = turn.created_at;
            });
        if appended.is_none() {
            return Err(TurnError::ConversationNotFound(conversation_id.to_string()));
        }

        let audio = c
            .voice
            .synthesize_to_asset(&reply_text, state.persona.voice_archetype)
            .await;

        Ok(ChatTurnResponse {
            turn_id: turn.turn_id,
            reply_text,
            reply_audio_stream_url: audio.map(|asset| asset.stream_url),
            followup_suggestions: c.persona.followup_suggestions(&state.entity),
            safety_verdict,
        })
    }

    async fn resolve_user_text(
        &self,
        session_id: &str,
        request: &ChatTurnRequest,
    ) -> Result<String, TurnError> {
        if let Some(text) = request.text.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            return Ok(text.to_string());
        }
        let Some(audio_ref) = request.audio_ref.as_deref() else {
            return Err(TurnError::EmptyInput);
        };

        let clip = self
            .components
            .sessions
            .resolve_user_audio(audio_ref)
            .ok_or_else(|| TurnError::AudioNotFound(audio_ref.to_string()))?;
        if clip.session_id != session_id {
            return Err(TurnError::SessionMismatch);
        }
        let bytes = tokio::fs::read(&clip.file_path).await?;
        let transcript = self.transcribe(clip.mime_type, bytes).await;
        transcript
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(TurnError::EmptyInput)
    }

    async fn transcribe(&self, mime_type: String, bytes: Vec<u8>) -> Option<String> {
        let models = &self.components.models;
        if !models.is_enabled() {
            return None;
        }
        let request = CompletionRequest::text(
            "Transcribe this short recording of a child speaking. Return only the transcript text.",
            self.components.transcribe_timeout,
        )
        .with_attachment(InlineMedia { mime_type, bytes });
        match models.complete(&request).await {
            Ok(completion) => Some(completion.text),
            Err(err) => {
                tracing::warn!(error = %err, "transcription failed");
                None
            }
        }
    }

    /// Reserve a fresh fact, then generate a reply around it or fall back to
    /// the persona template.
    async fn compose_reply(
        &self,
        conversation_id: &str,
        snapshot: &ConversationState,
        question: &str,
    ) -> String {
        let c = &self.components;

        // Reservation happens under the store lock so concurrent turns on the
        // same conversation never hand out the same fact twice.
        let mut used_before: Option<BTreeSet<usize>> = None;
        let mut primary: Option<usize> = None;
        let reserved = self
            .conversations
            .update(conversation_id, &mut |state: &mut ConversationState| {
                used_before = Some(state.used_fact_indexes.clone());
                let mut used = state.used_fact_indexes.clone();
                primary = pick_speakable_fact(&state.fact_pack, &mut used).map(|(index, _)| index);
                state.used_fact_indexes = used;
            });
        let state = reserved.unwrap_or_else(|| snapshot.clone());
        let mut fallback_used = used_before.unwrap_or_else(|| snapshot.used_fact_indexes.clone());

        let candidates = candidate_facts(&state, primary);
        let prompt = turn_prompt(&state, question, &candidates);
        let generated = c
            .generate_reply(
                c.persona.system_instruction(&state.entity, &state.persona),
                prompt,
            )
            .await
            .filter(|text| !mentions_own_depiction(text, &state.entity));

        match generated {
            Some(text) => text,
            None => c
                .persona
                .build_fallback_reply(&state.fact_pack, question, &mut fallback_used),
        }
    }
}

/// The reserved fact first, then up to two more unused facts (or any other
/// facts once everything has been used).
fn candidate_facts(state: &ConversationState, primary: Option<usize>) -> Vec<&FactItem> {
    let facts = &state.fact_pack.facts;
    let Some(primary) = primary else {
        return Vec::new();
    };
    let mut picked = vec![primary];
    let unused = (0..facts.len()).filter(|index| !state.used_fact_indexes.contains(index));
    let others = (0..facts.len()).filter(|index| *index != primary);
    for index in unused.chain(others) {
        if picked.len() > EXTRA_CANDIDATE_FACTS {
            break;
        }
        if !picked.contains(&index) {
            picked.push(index);
        }
    }
    picked.into_iter().filter_map(|index| facts.get(index)).collect()
}

fn turn_prompt(state: &ConversationState, question: &str, candidates: &[&FactItem]) -> String {
    let history = state
        .recent_turns(CONTEXT_TURNS)
        .iter()
        .map(|turn| format!("Child: {}\nYou: {}", turn.user_input, turn.assistant_text))
        .collect::<Vec<_>>()
        .join("\n");
    let facts = candidates
        .iter()
        .enumerate()
        .map(|(index, fact)| format!("{}. {}", index + 1, fact.claim))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summary of what you know: {summary}\n\
         Facts you may use (prefer the first):\n{facts}\n\
         Recent conversation:\n{history}\n\
         The child now says: \"{question}\"\n\
         Answer in character, in first person, using the facts above.",
        summary = state.fact_pack.summary,
        history = if history.is_empty() { "(none yet)".to_string() } else { history },
    )
}
