use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SafetyVerdict {
    Allow,
    Transform,
    Block,
}

impl SafetyVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyVerdict::Allow => "allow",
            SafetyVerdict::Transform => "transform",
            SafetyVerdict::Block => "block",
        }
    }
}

pub mod reasons {
    pub const PERSONAL_DATA: &str = "personal_data";
    pub const BLOCKED_TOPIC: &str = "blocked_topic";
}

/// Outcome of a single moderation call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ModerationResult {
    pub verdict: SafetyVerdict,
    pub reasons: Vec<String>,
    /// Replacement text for `transform`/`block` verdicts
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transformed_text: Option<String>,
}

impl ModerationResult {
    pub fn allow() -> Self {
        Self {
            verdict: SafetyVerdict::Allow,
            reasons: Vec::new(),
            transformed_text: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == SafetyVerdict::Allow
    }
}

/// Which moderation surface produced an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModerationSurface {
    Input,
    Output,
    ImageLabel,
}

/// Audit record written whenever moderation flags content.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncidentItem {
    pub incident_id: Uuid,
    pub session_id: String,
    pub surface: ModerationSurface,
    pub verdict: SafetyVerdict,
    pub reason: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
