use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::CanonicalEntity;
use crate::moderation::SafetyVerdict;

/// Forward-only lifecycle: queued -> processing -> ready | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Queued => "queued",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Ready => "ready",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Ready | AnalysisStatus::Failed)
    }

    /// Allowed transitions. Terminal states accept nothing.
    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        matches!(
            (self, next),
            (AnalysisStatus::Queued, AnalysisStatus::Processing)
                | (AnalysisStatus::Queued, AnalysisStatus::Failed)
                | (AnalysisStatus::Processing, AnalysisStatus::Ready)
                | (AnalysisStatus::Processing, AnalysisStatus::Failed)
        )
    }
}

/// Pollable projection of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    pub session_id: String,
    pub image_url: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entity: Option<CanonicalEntity>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hook_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_reply_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_reply_audio_stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub safety_status: Option<SafetyVerdict>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub conversation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateAnalysisRequest {
    pub upload_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateAnalysisResponse {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
}

#[cfg(test)]
mod tests {
    use super::AnalysisStatus::*;

    #[test]
    fn terminal_states_accept_no_transition() {
        for next in [Queued, Processing, Ready, Failed] {
            assert!(!Ready.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Ready));
    }
}
