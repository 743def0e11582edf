use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fixed voice/persona styles. Drive tone and speech voice selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VoiceArchetype {
    Playful,
    Wise,
    Adventurous,
    Inventor,
}

impl VoiceArchetype {
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceArchetype::Playful => "playful",
            VoiceArchetype::Wise => "wise",
            VoiceArchetype::Adventurous => "adventurous",
            VoiceArchetype::Inventor => "inventor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PersonaProfile {
    pub voice_archetype: VoiceArchetype,
    pub speaking_style: String,
    pub hook_template_id: String,
}
