use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::CanonicalEntity;
use crate::facts::FactPack;
use crate::moderation::SafetyVerdict;
use crate::persona::PersonaProfile;

/// One user/assistant exchange. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub user_input: String,
    pub assistant_text: String,
    pub safety_verdict: SafetyVerdict,
    pub created_at: DateTime<Utc>,
}

/// Server-owned conversation state. Belongs to exactly one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: Uuid,
    pub session_id: String,
    pub entity: CanonicalEntity,
    pub fact_pack: FactPack,
    pub persona: PersonaProfile,
    /// Opening reply delivered with the analysis
    pub opening_text: String,
    pub used_fact_indexes: BTreeSet<usize>,
    /// Append-only
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Last `n` turns in chronological order.
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub text: Option<String>,
    /// Reference returned by `POST /v1/audio/uploads`
    #[serde(default)]
    pub audio_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChatTurnResponse {
    pub turn_id: Uuid,
    pub reply_text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply_audio_stream_url: Option<String>,
    pub followup_suggestions: Vec<String>,
    pub safety_verdict: SafetyVerdict,
}
