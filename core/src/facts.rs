use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::CanonicalEntity;

/// A single cited claim about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FactItem {
    pub claim: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Absolute URLs backing the claim
    pub source_urls: Vec<String>,
    /// Date string (YYYY-MM-DD) the claim was last known to hold
    pub freshness_date: String,
}

/// Cached research bundle used to ground replies.
/// Fact order is preference order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FactPack {
    pub entity: CanonicalEntity,
    pub facts: Vec<FactItem>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}
