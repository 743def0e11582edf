//! Entity resolution: vision labeling with a heuristic fallback, then
//! identity resolution deciding whether the photo speaks as itself or as
//! the figure it depicts.

use std::sync::LazyLock;
use std::time::Duration;

use curio_core::entity::{CanonicalEntity, EntityCategory, RoleplayMode, slugify};
use regex::Regex;
use serde_json::Value;

use crate::providers::{CompletionRequest, InlineMedia, ModelChain, extract_json_object};

pub const MYSTERY_LABEL: &str = "mystery object";
pub const HEURISTIC_CONFIDENCE: f64 = 0.35;
const MAX_NAME_CHARS: usize = 140;

static DEPICTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bust|statue|sculpture|portrait|painting|figure|figurine)s?\b")
        .expect("valid depiction regex")
});
static DEPICTION_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:bust|statue|sculpture|portrait|painting|figure|figurine)s?\s+(?:of|depicting|showing)\s+(.+)$",
    )
    .expect("valid depiction-of regex")
});
static SUBJECT_DEPICTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:bust|statue|sculpture|portrait|painting|figure|figurine)s?$")
        .expect("valid subject-depiction regex")
});
static DESCRIPTOR_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:a|an|marble|bronze|stone|granite|wooden|ancient|roman|greek|old|famous|large|small|giant)\s+)+",
    )
    .expect("valid descriptor regex")
});
static TRAILING_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\s*[,(\[]|\s+-\s+|\s+(?:at|in|on display at|from) the\s+).*$")
        .expect("valid trailing context regex")
});
static LEADING_THE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^the\s+").expect("valid leading-the regex"));

const GENERIC_SUBJECTS: &[&str] = &[
    "man", "woman", "person", "people", "someone", "unknown", "child", "boy", "girl", "figure",
    "soldier", "lady", "gentleman", "human", "head",
];

const KEYWORD_CATEGORIES: &[(&str, EntityCategory)] = &[
    ("bridge", EntityCategory::Landmark),
    ("tower", EntityCategory::Landmark),
    ("castle", EntityCategory::Landmark),
    ("temple", EntityCategory::Landmark),
    ("cathedral", EntityCategory::Landmark),
    ("monument", EntityCategory::Landmark),
    ("lighthouse", EntityCategory::Landmark),
    ("tree", EntityCategory::Nature),
    ("flower", EntityCategory::Nature),
    ("mountain", EntityCategory::Nature),
    ("river", EntityCategory::Nature),
    ("leaf", EntityCategory::Nature),
    ("rock", EntityCategory::Nature),
    ("statue", EntityCategory::Statue),
    ("bust", EntityCategory::Statue),
    ("sculpture", EntityCategory::Statue),
    ("phone", EntityCategory::Electronics),
    ("laptop", EntityCategory::Electronics),
    ("computer", EntityCategory::Electronics),
    ("robot", EntityCategory::Electronics),
    ("radio", EntityCategory::Electronics),
    ("microscope", EntityCategory::Science),
    ("telescope", EntityCategory::Science),
    ("rocket", EntityCategory::Science),
    ("fossil", EntityCategory::Science),
    ("magnet", EntityCategory::Science),
    ("dog", EntityCategory::Animal),
    ("cat", EntityCategory::Animal),
    ("bird", EntityCategory::Animal),
    ("fish", EntityCategory::Animal),
    ("horse", EntityCategory::Animal),
    ("butterfly", EntityCategory::Animal),
];

/// Raw label before identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionLabel {
    pub label: String,
    pub category: EntityCategory,
    pub confidence: f64,
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn has_depiction_wording(value: &str) -> bool {
    DEPICTION_RE.is_match(value)
}

/// Normalize a candidate identity name. `None` when nothing usable remains.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    let trimmed = collapsed.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'));
    let without_the = LEADING_THE_RE.replace(trimmed, "");
    let name = without_the
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '”' | '’'))
        .trim()
        .to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name)
}

fn is_generic_subject(name: &str) -> bool {
    let lowered = name.to_lowercase();
    let stripped = lowered
        .strip_prefix("a ")
        .or_else(|| lowered.strip_prefix("an "))
        .unwrap_or(&lowered);
    GENERIC_SUBJECTS.contains(&stripped)
}

/// Pull the depicted subject out of "X of SUBJECT" or "SUBJECT X" shapes.
pub fn extract_depicted_subject(label: &str) -> Option<String> {
    let candidate = if let Some(captures) = DEPICTION_OF_RE.captures(label) {
        captures.get(1)?.as_str().to_string()
    } else if let Some(captures) = SUBJECT_DEPICTION_RE.captures(label) {
        let subject = captures.get(1)?.as_str();
        DESCRIPTOR_PREFIX_RE.replace(subject, "").to_string()
    } else {
        return None;
    };

    let without_context = TRAILING_CONTEXT_RE.replace(&candidate, "");
    let name = sanitize_name(&without_context)?;
    if has_depiction_wording(&name) || is_generic_subject(&name) {
        return None;
    }
    Some(name)
}

/// `name` becomes the speaking identity; `detected_label` keeps the raw label.
fn object_entity(
    name: &str,
    detected_label: &str,
    category: EntityCategory,
    confidence: f64,
) -> CanonicalEntity {
    let label = sanitize_name(name).unwrap_or_else(|| MYSTERY_LABEL.to_string());
    CanonicalEntity {
        entity_id: slugify(&label),
        research_subject: label.clone(),
        roleplay_name: label.clone(),
        label,
        detected_label: detected_label.to_string(),
        category,
        confidence,
        roleplay_mode: RoleplayMode::AsObject,
    }
}

fn character_entity(
    name: &str,
    detected_label: &str,
    category: EntityCategory,
    confidence: f64,
) -> CanonicalEntity {
    CanonicalEntity {
        entity_id: slugify(name),
        label: name.to_string(),
        detected_label: detected_label.to_string(),
        category,
        confidence,
        research_subject: name.to_string(),
        roleplay_name: name.to_string(),
        roleplay_mode: RoleplayMode::AsCharacter,
    }
}

/// Heuristic identity resolution over a raw label.
pub fn resolve_identity(raw: &VisionLabel) -> CanonicalEntity {
    let detected = collapse_whitespace(&raw.label);
    if raw.category == EntityCategory::Statue || has_depiction_wording(&detected) {
        if let Some(subject) = extract_depicted_subject(&detected) {
            return character_entity(&subject, &detected, raw.category, raw.confidence);
        }
    }
    object_entity(&detected, &detected, raw.category, raw.confidence)
}

/// Deterministic keyword fallback used when vision labeling is unavailable.
pub fn heuristic_label(hint: Option<&str>) -> VisionLabel {
    let words = hint
        .map(|value| {
            let stem = value.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(value);
            collapse_whitespace(&stem.replace(['_', '-'], " ")).to_lowercase()
        })
        .unwrap_or_default();

    let matched = KEYWORD_CATEGORIES.iter().find(|(keyword, _)| {
        words
            .split(' ')
            .any(|word| word == *keyword || word.strip_suffix('s') == Some(keyword))
    });

    match matched {
        Some((_, category)) => VisionLabel {
            label: words,
            category: *category,
            confidence: HEURISTIC_CONFIDENCE,
        },
        None => VisionLabel {
            label: MYSTERY_LABEL.to_string(),
            category: EntityCategory::Other,
            confidence: HEURISTIC_CONFIDENCE,
        },
    }
}

/// Parse a `{label, category, confidence}` payload from a vision model.
pub fn parse_vision_payload(text: &str) -> Option<VisionLabel> {
    let payload = extract_json_object(text)?;
    let label = payload
        .get("label")
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|label| !label.is_empty() && label.chars().count() <= MAX_NAME_CHARS)?;
    let category = payload
        .get("category")
        .and_then(Value::as_str)
        .map(EntityCategory::parse_lenient)
        .unwrap_or(EntityCategory::Other);
    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(0.0, 1.0))
        .unwrap_or(0.7);
    Some(VisionLabel {
        label,
        category,
        confidence,
    })
}

/// Parse a strict-JSON identity refinement. Only trusted when the name is clean.
pub fn parse_refinement_payload(text: &str) -> Option<(RoleplayMode, String)> {
    let payload = extract_json_object(text)?;
    let mode = match payload.get("mode").and_then(Value::as_str)? {
        "as_character" => RoleplayMode::AsCharacter,
        "as_object" => RoleplayMode::AsObject,
        _ => return None,
    };
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .and_then(sanitize_name)?;
    if has_depiction_wording(&name) {
        return None;
    }
    if mode == RoleplayMode::AsCharacter && is_generic_subject(&name) {
        return None;
    }
    Some((mode, name))
}

const VISION_PROMPT: &str = "Identify the main subject of this photo for a curious 8-12 year old. \
Respond with JSON only: {\"label\": string, \"category\": one of [\"landmark\", \"nature\", \"statue\", \
\"electronics\", \"science\", \"animal\", \"other\"], \"confidence\": number between 0 and 1}. \
Use the most specific well-known name you are sure of (e.g. \"Golden Gate Bridge\", \"Bust of Nefertiti\").";

pub struct EntityResolver {
    models: ModelChain,
    vision_timeout: Duration,
    refine_timeout: Duration,
}

impl EntityResolver {
    pub fn new(models: ModelChain, vision_timeout: Duration, refine_timeout: Duration) -> Self {
        Self {
            models,
            vision_timeout,
            refine_timeout,
        }
    }

    /// Never fails: the terminal fallback is "mystery object" / `other`.
    pub async fn detect_entity(
        &self,
        image: &[u8],
        mime_type: &str,
        hint: Option<&str>,
    ) -> CanonicalEntity {
        let raw = match self.label_image(image, mime_type).await {
            Some(label) => label,
            None => {
                let fallback = heuristic_label(hint);
                tracing::info!(
                    label = %fallback.label,
                    category = fallback.category.as_str(),
                    "vision unavailable, using heuristic label"
                );
                fallback
            }
        };

        let heuristic = resolve_identity(&raw);
        let ambiguous =
            raw.category == EntityCategory::Statue || has_depiction_wording(&raw.label);
        if ambiguous && self.models.is_enabled() {
            if let Some(refined) = self.refine_identity(&raw).await {
                return refined;
            }
        }
        heuristic
    }

    async fn label_image(&self, image: &[u8], mime_type: &str) -> Option<VisionLabel> {
        if !self.models.is_enabled() || image.is_empty() {
            return None;
        }
        let request = CompletionRequest::json(VISION_PROMPT, self.vision_timeout).with_attachment(
            InlineMedia {
                mime_type: mime_type.to_string(),
                bytes: image.to_vec(),
            },
        );
        match self.models.complete(&request).await {
            Ok(completion) => {
                let parsed = parse_vision_payload(&completion.text);
                if parsed.is_none() {
                    tracing::warn!(provider = %completion.provider, "unparsable vision payload");
                }
                parsed
            }
            Err(err) => {
                tracing::warn!(error = %err, "vision labeling failed");
                None
            }
        }
    }

    async fn refine_identity(&self, raw: &VisionLabel) -> Option<CanonicalEntity> {
        let prompt = format!(
            "A photo was labeled \"{}\" (category: {}). Decide whether it depicts a specific \
             historical or fictional figure the object should speak as (\"as_character\"), or \
             whether it should speak as the object itself (\"as_object\"). Respond with JSON only: \
             {{\"mode\": \"as_character\" | \"as_object\", \"name\": string}}. The name must be the \
             person's or object's proper name with no words like bust, statue or portrait.",
            raw.label,
            raw.category.as_str()
        );
        let completion = self
            .models
            .complete(&CompletionRequest::json(prompt, self.refine_timeout))
            .await
            .map_err(|err| tracing::warn!(error = %err, "identity refinement failed"))
            .ok()?;

        let Some((mode, name)) = parse_refinement_payload(&completion.text) else {
            tracing::warn!("identity refinement rejected, keeping heuristic result");
            return None;
        };
        let detected = collapse_whitespace(&raw.label);
        Some(match mode {
            RoleplayMode::AsCharacter => {
                character_entity(&name, &detected, raw.category, raw.confidence)
            }
            RoleplayMode::AsObject => {
                object_entity(&name, &detected, raw.category, raw.confidence)
            }
        })
    }
}
