//! Fact-pack acquisition with allow-list filtering and a TTL cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use curio_core::entity::{CanonicalEntity, EntityCategory};
use curio_core::facts::{FactItem, FactPack};
use serde_json::Value;
use url::Url;

use crate::config::ContentPolicy;
use crate::providers::{CompletionRequest, ModelChain, extract_json_object};
use crate::store::SharedStore;

/// Audience and prompt version folded into every cache key.
const AUDIENCE_TAG: &str = "kids:v1";
const MAX_FACTS: usize = 6;

#[derive(Debug, Clone)]
pub struct FactCacheEntry {
    pub pack: FactPack,
    pub expires_at: DateTime<Utc>,
}

pub fn cache_key(entity: &CanonicalEntity) -> String {
    format!("{}:{AUDIENCE_TAG}", entity.entity_id)
}

pub struct ResearchCache {
    models: ModelChain,
    cache: SharedStore<FactCacheEntry>,
    policy: ContentPolicy,
    ttl: chrono::Duration,
    timeout: Duration,
}

impl ResearchCache {
    pub fn new(
        models: ModelChain,
        cache: SharedStore<FactCacheEntry>,
        policy: ContentPolicy,
        ttl: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            models,
            cache,
            policy,
            ttl,
            timeout,
        }
    }

    /// Cached fact pack for `entity`, fetching on miss or expiry. Never fails.
    pub async fn get_fact_pack(&self, entity: &CanonicalEntity) -> FactPack {
        let key = cache_key(entity);
        let now = Utc::now();
        if let Some(entry) = self.cache.get(&key) {
            if entry.expires_at > now {
                tracing::debug!(cache_key = %key, "fact cache hit");
                return entry.pack;
            }
        }

        let (summary, facts) = match self.fetch_from_provider(entity).await {
            Some(researched) => researched,
            None => fallback_facts(entity),
        };
        let facts = filter_facts(facts, &self.policy);

        let generated_at = Utc::now();
        let pack = FactPack {
            entity: entity.clone(),
            facts,
            summary,
            generated_at,
        };
        self.cache.put(
            &key,
            FactCacheEntry {
                pack: pack.clone(),
                expires_at: generated_at + self.ttl,
            },
        );
        tracing::info!(cache_key = %key, facts = pack.facts.len(), "fact pack stored");
        pack
    }

    /// Mark the cached entry as expired so the next lookup refetches.
    pub fn force_expire(&self, entity: &CanonicalEntity) {
        let expired_at = Utc::now() - chrono::Duration::seconds(1);
        self.cache.update(&cache_key(entity), &mut |entry: &mut FactCacheEntry| {
            entry.expires_at = expired_at;
        });
    }

    async fn fetch_from_provider(&self, entity: &CanonicalEntity) -> Option<(String, Vec<FactItem>)> {
        if !self.models.is_enabled() {
            return None;
        }
        let prompt = research_prompt(entity, &self.policy.source_allowlist);
        match self
            .models
            .complete(&CompletionRequest::json(prompt, self.timeout))
            .await
        {
            Ok(completion) => {
                let parsed = parse_research_payload(&completion.text);
                if parsed.is_none() {
                    tracing::warn!(provider = %completion.provider, "research payload invalid, using fallback facts");
                }
                parsed
            }
            Err(err) => {
                tracing::warn!(error = %err, entity_id = %entity.entity_id, "research failed, using fallback facts");
                None
            }
        }
    }
}

fn research_prompt(entity: &CanonicalEntity, allowlist: &[String]) -> String {
    format!(
        "You are a careful researcher writing for curious children aged 8-12. \
         Subject: \"{subject}\" (category: {category}). \
         Return JSON only: {{\"summary\": string, \"facts\": [{{\"claim\": string, \
         \"confidence\": number 0-1, \"source_urls\": [absolute URL], \"freshness_date\": \"YYYY-MM-DD\"}}]}}. \
         Give up to {MAX_FACTS} short, surprising, verifiable facts. Cite only these domains: {domains}. \
         Avoid violence, weapons and scary details.",
        subject = entity.research_subject,
        category = entity.category.as_str(),
        domains = allowlist.join(", "),
    )
}

/// Parse `{summary, facts[]}`. Facts without an absolute http(s) source are
/// dropped. `None` when the payload has no usable facts.
pub fn parse_research_payload(text: &str) -> Option<(String, Vec<FactItem>)> {
    let payload = extract_json_object(text)?;
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let facts: Vec<FactItem> = payload
        .get("facts")?
        .as_array()?
        .iter()
        .filter_map(|raw| {
            let claim = raw.get("claim")?.as_str()?.trim();
            if claim.is_empty() {
                return None;
            }
            let source_urls: Vec<String> = raw
                .get("source_urls")
                .and_then(Value::as_array)
                .map(|urls| {
                    urls.iter()
                        .filter_map(Value::as_str)
                        .filter(|url| is_absolute_http_url(url))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if source_urls.is_empty() {
                return None;
            }
            Some(FactItem {
                claim: claim.to_string(),
                confidence: raw
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .filter(|value| value.is_finite())
                    .map(|value| value.clamp(0.0, 1.0))
                    .unwrap_or(0.5),
                source_urls,
                freshness_date: raw
                    .get("freshness_date")
                    .and_then(Value::as_str)
                    .filter(|value| !value.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| today.clone()),
            })
        })
        .take(MAX_FACTS)
        .collect();
    if facts.is_empty() {
        return None;
    }
    let summary = payload
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    Some((summary, facts))
}

fn is_absolute_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

/// True when the URL's host equals an allow-listed domain or is a subdomain of one.
pub fn host_is_allowed(url: &str, allowlist: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    allowlist.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    })
}

/// Drop off-list sources, then facts below the confidence floor or left
/// without sources. An empty result falls back to the unfiltered list,
/// minus facts that carry no source at all.
pub fn filter_facts(facts: Vec<FactItem>, policy: &ContentPolicy) -> Vec<FactItem> {
    let filtered: Vec<FactItem> = facts
        .iter()
        .filter(|fact| fact.confidence >= policy.min_fact_confidence)
        .filter_map(|fact| {
            let source_urls: Vec<String> = fact
                .source_urls
                .iter()
                .filter(|url| host_is_allowed(url, &policy.source_allowlist))
                .cloned()
                .collect();
            (!source_urls.is_empty()).then(|| FactItem {
                source_urls,
                ..fact.clone()
            })
        })
        .collect();

    if filtered.is_empty() {
        tracing::warn!(
            original = facts.len(),
            "fact filtering removed every fact, keeping unfiltered list"
        );
        return facts
            .into_iter()
            .filter(|fact| !fact.source_urls.is_empty())
            .collect();
    }
    filtered
}

fn wikipedia_url(subject: &str) -> String {
    format!(
        "https://en.wikipedia.org/wiki/{}",
        subject.split_whitespace().collect::<Vec<_>>().join("_")
    )
}

fn canned(claim: String, url: &str) -> FactItem {
    FactItem {
        claim,
        confidence: 0.8,
        source_urls: vec![url.to_string()],
        freshness_date: Utc::now().format("%Y-%m-%d").to_string(),
    }
}

/// Category-specific facts used when research is unavailable.
pub fn fallback_facts(entity: &CanonicalEntity) -> (String, Vec<FactItem>) {
    let name = entity.research_subject.as_str();
    let subject_url = wikipedia_url(name);

    let (summary, claims, topic_url): (String, Vec<String>, &str) = match entity.category {
        EntityCategory::Statue if entity.is_character() => (
            format!("{name} is a famous figure from history whose likeness people still visit."),
            vec![
                format!("{name} lived a long time ago, yet people still tell stories about {name} today."),
                "Artists often made portraits of important people so others would remember them.".to_string(),
                "Museums keep old artworks safe so visitors from all over the world can learn from them.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Museum",
        ),
        EntityCategory::Statue => (
            format!("{name} is a sculpture made to last for a very long time."),
            vec![
                "Many statues are carved from stone like marble or cast in bronze.".to_string(),
                "Bronze statues can turn green over time because the metal reacts with air and rain.".to_string(),
                "Sculptors sometimes spend years finishing a single large statue.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Sculpture",
        ),
        EntityCategory::Landmark => (
            format!("{name} is a landmark that people travel to see."),
            vec![
                "Famous landmarks can take many years and thousands of workers to build.".to_string(),
                "Engineers check big structures regularly to keep them safe.".to_string(),
                "Some landmarks are protected so future generations can enjoy them.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Landmark",
        ),
        EntityCategory::Nature => (
            format!("{name} is part of the natural world."),
            vec![
                "Plants make their own food from sunlight in a process called photosynthesis.".to_string(),
                "Many living things depend on each other to survive in an ecosystem.".to_string(),
                "Rocks and mountains can take millions of years to form.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Nature",
        ),
        EntityCategory::Electronics => (
            format!("{name} is a piece of technology powered by electricity."),
            vec![
                "Electronic devices use tiny parts called transistors to process information.".to_string(),
                "A modern chip can hold billions of transistors.".to_string(),
                "Recycling old electronics helps recover valuable metals.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Electronics",
        ),
        EntityCategory::Science => (
            format!("{name} helps people explore how the world works."),
            vec![
                "Scientists test their ideas with careful experiments.".to_string(),
                "Many great discoveries started with someone asking a simple question.".to_string(),
                "Scientific tools let us see things that are too small or too far away for our eyes.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Science",
        ),
        EntityCategory::Animal => (
            format!("{name} is a living creature with its own clever ways of surviving."),
            vec![
                "Animals use their senses to find food and stay safe.".to_string(),
                "Many animals communicate with sounds, movements or smells.".to_string(),
                "Some animals travel thousands of kilometres every year when they migrate.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Animal",
        ),
        EntityCategory::Other => (
            format!("{name} has a story worth discovering."),
            vec![
                "Everyday objects often have surprising histories.".to_string(),
                "People invented many common things to solve small everyday problems.".to_string(),
                "Looking closely at ordinary things is how many inventors got their ideas.".to_string(),
            ],
            "https://en.wikipedia.org/wiki/Invention",
        ),
    };

    let facts = claims
        .into_iter()
        .enumerate()
        .map(|(index, claim)| {
            let url = if index == 0 { subject_url.as_str() } else { topic_url };
            canned(claim, url)
        })
        .collect();
    (summary, facts)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use curio_core::entity::{RoleplayMode, slugify};

    use super::*;
    use crate::config::AppConfig;
    use crate::providers::testing::{ScriptedModel, chain_of};
    use crate::store::MemoryStore;

    fn entity(label: &str, category: EntityCategory, mode: RoleplayMode) -> CanonicalEntity {
        CanonicalEntity {
            entity_id: slugify(label),
            label: label.to_string(),
            detected_label: label.to_string(),
            category,
            confidence: 0.9,
            research_subject: label.to_string(),
            roleplay_name: label.to_string(),
            roleplay_mode: mode,
        }
    }

    fn fact(claim: &str, confidence: f64, urls: &[&str]) -> FactItem {
        FactItem {
            claim: claim.to_string(),
            confidence,
            source_urls: urls.iter().map(|url| url.to_string()).collect(),
            freshness_date: "2026-01-01".to_string(),
        }
    }

    fn policy() -> ContentPolicy {
        AppConfig::default().policy
    }

    fn cache_with(model: Option<Arc<ScriptedModel>>) -> ResearchCache {
        ResearchCache::new(
            model.map(chain_of).unwrap_or_default(),
            Arc::new(MemoryStore::new()),
            policy(),
            chrono::Duration::minutes(1440),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn subdomains_of_allowed_hosts_pass() {
        let allow = vec!["wikipedia.org".to_string()];
        assert!(host_is_allowed("https://en.wikipedia.org/wiki/Oak", &allow));
        assert!(host_is_allowed("https://wikipedia.org/", &allow));
        assert!(!host_is_allowed("https://notwikipedia.org/", &allow));
        assert!(!host_is_allowed("not a url", &allow));
    }

    #[test]
    fn off_list_fact_is_dropped_when_others_survive() {
        let facts = vec![
            fact("kept", 0.9, &["https://en.wikipedia.org/wiki/Oak"]),
            fact("dropped", 0.9, &["https://random-blog.example/oak"]),
        ];
        let filtered = filter_facts(facts, &policy());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].claim, "kept");
    }

    #[test]
    fn off_list_sources_are_stripped_from_mixed_facts() {
        let facts = vec![fact(
            "mixed",
            0.9,
            &["https://random-blog.example/a", "https://www.nasa.gov/b"],
        )];
        let filtered = filter_facts(facts, &policy());
        assert_eq!(filtered[0].source_urls, vec!["https://www.nasa.gov/b".to_string()]);
    }

    #[test]
    fn low_confidence_facts_are_dropped() {
        let facts = vec![
            fact("sure", 0.9, &["https://www.britannica.com/a"]),
            fact("unsure", 0.2, &["https://www.britannica.com/b"]),
        ];
        let filtered = filter_facts(facts, &policy());
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].claim, "sure");
    }

    #[test]
    fn filtering_everything_keeps_the_original_list() {
        let facts = vec![fact("only", 0.9, &["https://random-blog.example/oak"])];
        let filtered = filter_facts(facts.clone(), &policy());
        assert_eq!(filtered, facts);
    }

    #[test]
    fn research_payload_requires_facts() {
        let parsed = parse_research_payload(
            r#"{"summary":"An oak.","facts":[{"claim":"Oaks grow acorns.","confidence":0.9,"source_urls":["https://en.wikipedia.org/wiki/Oak","relative/path"]}]}"#,
        )
        .expect("payload should parse");
        assert_eq!(parsed.0, "An oak.");
        assert_eq!(parsed.1[0].source_urls.len(), 1);
        assert!(!parsed.1[0].freshness_date.is_empty());
        assert!(parse_research_payload(r#"{"summary":"x","facts":[]}"#).is_none());
        assert!(parse_research_payload("nope").is_none());
    }

    #[test]
    fn facts_without_absolute_sources_are_not_kept() {
        assert!(
            parse_research_payload(
                r#"{"summary":"Oaks.","facts":[{"claim":"Oaks are old.","confidence":0.9,"source_urls":["not a url","/wiki/Oak"]}]}"#,
            )
            .is_none()
        );
        let facts = vec![
            fact("unsourced", 0.9, &[]),
            fact("off list", 0.9, &["https://random-blog.example/oak"]),
        ];
        let kept = filter_facts(facts, &policy());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].claim, "off list");
    }

    #[test]
    fn character_statue_fallback_differs_from_generic_statue() {
        let character = entity("Alexander the Great", EntityCategory::Statue, RoleplayMode::AsCharacter);
        let generic = entity("marble statue", EntityCategory::Statue, RoleplayMode::AsObject);
        let (_, character_facts) = fallback_facts(&character);
        let (_, generic_facts) = fallback_facts(&generic);
        assert_ne!(character_facts[0].claim, generic_facts[0].claim);
        assert!(character_facts[0].claim.contains("Alexander the Great"));
        for fact in character_facts {
            assert!(!fact.claim.to_lowercase().contains("statue of"));
            assert!(host_is_allowed(&fact.source_urls[0], &policy().source_allowlist));
        }
    }

    #[tokio::test]
    async fn cached_pack_is_reused_until_forced_expiry() {
        let cache = cache_with(None);
        let oak = entity("Oak tree", EntityCategory::Nature, RoleplayMode::AsObject);

        let first = cache.get_fact_pack(&oak).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = cache.get_fact_pack(&oak).await;
        assert_eq!(first.generated_at, second.generated_at);

        cache.force_expire(&oak);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let third = cache.get_fact_pack(&oak).await;
        assert_ne!(first.generated_at, third.generated_at);
    }

    #[tokio::test]
    async fn provider_facts_are_used_and_cached_once() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            r#"{"summary":"A bridge.","facts":[{"claim":"It opened in 1937.","confidence":0.95,"source_urls":["https://www.nps.gov/goga"],"freshness_date":"2026-01-01"}]}"#,
        )]));
        let cache = cache_with(Some(model.clone()));
        let bridge = entity("Golden Gate Bridge", EntityCategory::Landmark, RoleplayMode::AsObject);

        let pack = cache.get_fact_pack(&bridge).await;
        assert_eq!(pack.summary, "A bridge.");
        assert_eq!(pack.facts[0].claim, "It opened in 1937.");
        cache.get_fact_pack(&bridge).await;
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn relative_only_sources_fall_back_to_canned_facts() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            r#"{"summary":"Oaks.","facts":[{"claim":"Oaks are old.","confidence":0.9,"source_urls":["not a url"]}]}"#,
        )]));
        let cache = cache_with(Some(model));
        let oak = entity("Oak tree", EntityCategory::Nature, RoleplayMode::AsObject);
        let pack = cache.get_fact_pack(&oak).await;
        assert!(pack.facts.iter().all(|fact| fact.claim != "Oaks are old."));
        for fact in &pack.facts {
            assert!(!fact.source_urls.is_empty(), "{fact:?} has no source");
        }
    }

    #[tokio::test]
    async fn invalid_provider_output_uses_fallback() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("{\"oops\": true}")]));
        let cache = cache_with(Some(model));
        let cat = entity("cat", EntityCategory::Animal, RoleplayMode::AsObject);
        let pack = cache.get_fact_pack(&cat).await;
        assert_eq!(pack.facts.len(), 3);
        assert!(pack.summary.contains("cat"));
    }
}
