use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fixed category enumeration for detected subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Landmark,
    Nature,
    Statue,
    Electronics,
    Science,
    Animal,
    Other,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 7] = [
        EntityCategory::Landmark,
        EntityCategory::Nature,
        EntityCategory::Statue,
        EntityCategory::Electronics,
        EntityCategory::Science,
        EntityCategory::Animal,
        EntityCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityCategory::Landmark => "landmark",
            EntityCategory::Nature => "nature",
            EntityCategory::Statue => "statue",
            EntityCategory::Electronics => "electronics",
            EntityCategory::Science => "science",
            EntityCategory::Animal => "animal",
            EntityCategory::Other => "other",
        }
    }

    /// Lenient parse used for model output; unknown values land in `Other`.
    pub fn parse_lenient(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .unwrap_or(EntityCategory::Other)
    }
}

/// Whether the voice speaks as the photographed thing or as the figure it depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoleplayMode {
    AsObject,
    AsCharacter,
}

/// The detected subject of an uploaded photo. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CanonicalEntity {
    /// Slug derived from the resolved label
    pub entity_id: String,
    /// Display identity
    pub label: String,
    /// Raw label as produced by vision labeling (or the heuristic)
    pub detected_label: String,
    pub category: EntityCategory,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// What research should fact-check
    pub research_subject: String,
    /// First-person identity used by the persona
    pub roleplay_name: String,
    pub roleplay_mode: RoleplayMode,
}

impl CanonicalEntity {
    pub fn is_character(&self) -> bool {
        self.roleplay_mode == RoleplayMode::AsCharacter
    }
}

/// Lowercase, hyphen-separated slug of a label. Empty labels map to "unknown".
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_dash = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Alexander the Great"), "alexander-the-great");
        assert_eq!(slugify("  Golden Gate -- Bridge! "), "golden-gate-bridge");
        assert_eq!(slugify("???"), "unknown");
    }

    #[test]
    fn category_parse_falls_back_to_other() {
        assert_eq!(EntityCategory::parse_lenient(" Statue "), EntityCategory::Statue);
        assert_eq!(EntityCategory::parse_lenient("vehicle"), EntityCategory::Other);
    }
}
