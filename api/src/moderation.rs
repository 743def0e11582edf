//! Pattern-based safety and PII gate.
//!
//! Best-effort keyword filter, not a classifier: it catches obvious personal
//! data and blocked topics and routes them to fixed redirect copy. Every
//! non-allow verdict leaves an incident for audit.

use std::sync::LazyLock;

use chrono::Utc;
use curio_core::moderation::{
    IncidentItem, ModerationResult, ModerationSurface, SafetyVerdict, reasons,
};
use regex::Regex;
use uuid::Uuid;

use crate::store::SharedStore;

pub const PERSONAL_DATA_REDIRECT: &str = "Let's keep personal details like emails, phone numbers and addresses private! Ask me about what I am or where I come from instead.";
pub const BLOCKED_TOPIC_REDIRECT: &str = "That's not something I can talk about. Let's explore something fun about me instead!";

static PII_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "email",
            Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("valid email regex"),
        ),
        (
            "phone",
            Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
                .expect("valid phone regex"),
        ),
        (
            "street_address",
            Regex::new(
                r"(?i)\b\d{1,5}\s+(?:[a-z0-9'.]+\s+){0,3}(?:street|avenue|ave|road|rd|lane|drive|boulevard|blvd)\b",
            )
            .expect("valid street address regex"),
        ),
    ]
});

static BLOCKED_TOPIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "violence",
            Regex::new(r"(?i)\b(?:kill(?:ing|ed)?|murder\w*|stab\w*|torture\w*|behead\w*)\b")
                .expect("valid violence regex"),
        ),
        (
            "weapons",
            Regex::new(r"(?i)\b(?:guns?|rifles?|pistols?|bombs?|explosives?|grenades?|weapons?)\b")
                .expect("valid weapons regex"),
        ),
        (
            "self_harm",
            Regex::new(r"(?i)\b(?:suicide|self[- ]harm|hurt myself|cut myself|kill myself)\b")
                .expect("valid self-harm regex"),
        ),
        (
            "sexual",
            Regex::new(r"(?i)\b(?:sex|sexy|porn\w*|nude|naked)\b").expect("valid sexual regex"),
        ),
        (
            "drugs",
            Regex::new(r"(?i)\b(?:drugs?|cocaine|heroin|meth|weed|marijuana|vap(?:e|ing))\b")
                .expect("valid drugs regex"),
        ),
        (
            "contact_exfiltration",
            Regex::new(
                r"(?i)\b(?:phone number|home address|where do you live|your address|what school do you go|meet me|send me (?:a )?(?:photo|picture|pic))\b",
            )
            .expect("valid contact exfiltration regex"),
        ),
    ]
});

enum PatternHit {
    PersonalData(&'static str),
    BlockedTopic(&'static str),
}

fn first_hit(text: &str) -> Option<PatternHit> {
    if let Some((kind, _)) = PII_PATTERNS.iter().find(|(_, re)| re.is_match(text)) {
        return Some(PatternHit::PersonalData(kind));
    }
    BLOCKED_TOPIC_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| PatternHit::BlockedTopic(kind))
}

pub struct ModerationGate {
    strict_safety: bool,
    incidents: SharedStore<IncidentItem>,
}

impl ModerationGate {
    pub fn new(strict_safety: bool, incidents: SharedStore<IncidentItem>) -> Self {
        Self {
            strict_safety,
            incidents,
        }
    }

    pub fn moderate_input(&self, session_id: &str, text: &str) -> ModerationResult {
        self.moderate(session_id, text, ModerationSurface::Input)
    }

    pub fn moderate_output(&self, session_id: &str, text: &str) -> ModerationResult {
        self.moderate(session_id, text, ModerationSurface::Output)
    }

    pub fn moderate_image_label(&self, session_id: &str, label: &str) -> ModerationResult {
        self.moderate(session_id, label, ModerationSurface::ImageLabel)
    }

    fn moderate(&self, session_id: &str, text: &str, surface: ModerationSurface) -> ModerationResult {
        let result = match first_hit(text) {
            None => return ModerationResult::allow(),
            Some(PatternHit::PersonalData(kind)) => {
                tracing::info!(surface = ?surface, pattern = kind, "moderation flagged personal data");
                ModerationResult {
                    verdict: SafetyVerdict::Transform,
                    reasons: vec![reasons::PERSONAL_DATA.to_string()],
                    transformed_text: Some(PERSONAL_DATA_REDIRECT.to_string()),
                }
            }
            Some(PatternHit::BlockedTopic(kind)) => {
                tracing::info!(surface = ?surface, pattern = kind, "moderation flagged blocked topic");
                self.blocked_topic_result(surface)
            }
        };

        self.record_incident(session_id, surface, &result, text);
        result
    }

    fn blocked_topic_result(&self, surface: ModerationSurface) -> ModerationResult {
        let reasons = vec![reasons::BLOCKED_TOPIC.to_string()];
        match surface {
            ModerationSurface::Input | ModerationSurface::ImageLabel => ModerationResult {
                verdict: SafetyVerdict::Block,
                reasons,
                transformed_text: Some(BLOCKED_TOPIC_REDIRECT.to_string()),
            },
            ModerationSurface::Output if self.strict_safety => ModerationResult {
                verdict: SafetyVerdict::Transform,
                reasons,
                transformed_text: Some(BLOCKED_TOPIC_REDIRECT.to_string()),
            },
            // Relaxed mode ships the text unchanged; the incident is the only trace.
            ModerationSurface::Output => {
                tracing::warn!("relaxed safety: flagged output delivered unchanged");
                ModerationResult {
                    verdict: SafetyVerdict::Allow,
                    reasons,
                    transformed_text: None,
                }
            }
        }
    }

    fn record_incident(
        &self,
        session_id: &str,
        surface: ModerationSurface,
        result: &ModerationResult,
        payload: &str,
    ) {
        let incident = IncidentItem {
            incident_id: Uuid::now_v7(),
            session_id: session_id.to_string(),
            surface,
            verdict: result.verdict,
            reason: result.reasons.join(","),
            payload: payload.to_string(),
            created_at: Utc::now(),
        };
        self.incidents
            .put(&incident.incident_id.to_string(), incident);
    }
}

/// Text to deliver after moderation: the replacement when one exists, else the original.
pub fn deliverable_text(original: &str, result: &ModerationResult) -> String {
    result
        .transformed_text
        .clone()
        .unwrap_or_else(|| original.to_string())
}
