//! Persona construction: archetype selection, hooks, first-person fact
//! rewriting and curiosity questions.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use curio_core::entity::{CanonicalEntity, EntityCategory, RoleplayMode};
use curio_core::facts::{FactItem, FactPack};
use curio_core::persona::{PersonaProfile, VoiceArchetype};
use rand::Rng;
use regex::Regex;

/// Source of template choices. Swapped for a fixed source in tests.
pub trait Randomness: Send + Sync {
    /// Index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

pub struct ThreadRandomness;

impl Randomness for ThreadRandomness {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always picks the same slot (modulo the pool size).
pub struct FixedRandomness(pub usize);

impl Randomness for FixedRandomness {
    fn pick(&self, len: usize) -> usize {
        self.0 % len
    }
}

const OBJECT_HOOKS: &[&str] = &[
    "Hey there, explorer! I'm {name}, and I've been waiting for someone curious like you!",
    "Psst! Yes, you! It's me, {name}. Want to hear a secret?",
    "Well hello! I'm {name}, and I have stories you won't believe.",
];

const CHARACTER_HOOKS: &[&str] = &[
    "Greetings, young explorer! I am {name}.",
    "Ah, a visitor! I am {name}, and I have lived quite a life.",
    "Well met, my friend! They call me {name}. Shall I tell you my story?",
];

const GENERIC_FOLLOWUP: &str = "Tell me another fun fact!";

static CONTAINER_OF_ME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:the\s+|a\s+|an\s+|this\s+)?(?:bust|statue|sculpture|portrait|painting|figure|figurine)s?\s+of\s+(?-i:I|me)\b",
    )
    .expect("valid container regex")
});
static POSSESSIVE_I_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bI['’]s\b").expect("valid possessive regex"));
static ARTICLE_I_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?i:the|a|an)\s+I\b").expect("valid article regex"));
static SUBJECT_ME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[.!?]\s+)me\b").expect("valid subject pronoun regex"));
static AGREEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bI\s+(is|has|does|stands|sits|lives|hangs|holds|remains|looks|weighs)\b").expect("valid agreement regex"));
static DEPICTION_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bust|statue|sculpture|portrait|painting)s?\s+of\b")
        .expect("valid depiction phrase regex")
});
static OBJECT_I_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?i:of|about|after|to|with|for|like|from|by|visit|visited|see|saw|built|made|named|called))\s+I\b")
        .expect("valid object pronoun regex")
});

fn curiosity_pool(entity: &CanonicalEntity) -> &'static [&'static str] {
    match entity.category {
        EntityCategory::Statue if entity.is_character() => &[
            "If you could ask me one question about my life, what would it be?",
            "What do you think people remember most about me?",
            "Would you like to know what the world looked like when I was alive?",
        ],
        EntityCategory::Statue => &[
            "How long do you think it took to make me?",
            "What material do you think I'm made of?",
            "If you were a sculptor, what would you make?",
        ],
        EntityCategory::Landmark => &[
            "How many people do you think visit me every year?",
            "How do you think people built me without modern machines?",
            "What would you build if you could design a landmark?",
        ],
        EntityCategory::Nature => &[
            "What do you think I need to grow and stay healthy?",
            "Which animals do you think depend on me?",
            "How old do you think I am?",
        ],
        EntityCategory::Electronics => &[
            "Do you want to know what's happening inside me right now?",
            "What do you think people used before I was invented?",
            "What would you invent to make me even better?",
        ],
        EntityCategory::Science => &[
            "What experiment would you like to try with me?",
            "What do you think scientists discovered using tools like me?",
            "What's a question about the world you'd love to answer?",
        ],
        EntityCategory::Animal => &[
            "What do you think I like to eat?",
            "Can you guess how I keep myself safe?",
            "Where in the world do you think my family lives?",
        ],
        EntityCategory::Other => &[
            "What do you think I'm used for?",
            "Who do you think invented something like me?",
            "What would you like to know about me?",
        ],
    }
}

pub fn archetype_for(entity: &CanonicalEntity) -> VoiceArchetype {
    match entity.category {
        EntityCategory::Statue if entity.is_character() => VoiceArchetype::Wise,
        EntityCategory::Animal | EntityCategory::Statue | EntityCategory::Other => {
            VoiceArchetype::Playful
        }
        EntityCategory::Nature => VoiceArchetype::Adventurous,
        EntityCategory::Landmark => VoiceArchetype::Wise,
        EntityCategory::Electronics | EntityCategory::Science => VoiceArchetype::Inventor,
    }
}

fn speaking_style(archetype: VoiceArchetype) -> &'static str {
    match archetype {
        VoiceArchetype::Playful => "bouncy, silly and warm, with short sentences and playful sounds",
        VoiceArchetype::Wise => "calm and storytelling, like a kind grandparent sharing memories",
        VoiceArchetype::Adventurous => "excited and outdoorsy, full of exploration and discovery",
        VoiceArchetype::Inventor => "curious and tinkering, loves explaining how things work",
    }
}

/// How the entity refers to itself in a sentence.
pub fn display_name(entity: &CanonicalEntity) -> String {
    let name = entity.roleplay_name.trim();
    if entity.roleplay_mode == RoleplayMode::AsCharacter {
        return name.to_string();
    }
    match name.chars().next() {
        Some(first) if first.is_lowercase() => {
            let article = if matches!(first, 'a' | 'e' | 'i' | 'o' | 'u') {
                "an"
            } else {
                "a"
            };
            format!("{article} {name}")
        }
        _ => name.to_string(),
    }
}

/// Rewrite a third-person claim about the entity into first person.
pub fn first_person(claim: &str, entity: &CanonicalEntity) -> String {
    let mut names: Vec<&str> = [
        entity.roleplay_name.as_str(),
        entity.research_subject.as_str(),
        entity.label.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|name| !name.is_empty())
    .collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    let mut text = match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
        Ok(name_re) => name_re.replace_all(claim, "I").into_owned(),
        Err(_) => claim.to_string(),
    };

    text = CONTAINER_OF_ME_RE.replace_all(&text, "me").into_owned();
    text = SUBJECT_ME_RE.replace_all(&text, "${1}I").into_owned();
    text = POSSESSIVE_I_RE.replace_all(&text, "my").into_owned();
    text = ARTICLE_I_RE.replace_all(&text, "I").into_owned();
    text = OBJECT_I_RE.replace_all(&text, "$1 me").into_owned();
    AGREEMENT_RE
        .replace_all(&text, |caps: &regex::Captures| {
            let verb = match &caps[1] {
                "is" => "am",
                "has" => "have",
                "does" => "do",
                other => other.strip_suffix('s').unwrap_or(other),
            };
            format!("I {verb}")
        })
        .into_owned()
}

/// True when the text talks about a bust, statue or portrait of someone.
pub fn names_a_depiction(text: &str) -> bool {
    DEPICTION_PHRASE_RE.is_match(text)
}

/// First-person line for a claim, or `None` when a character would end up
/// describing a likeness of itself.
pub fn speakable_line(claim: &str, entity: &CanonicalEntity) -> Option<String> {
    let line = first_person(claim, entity);
    if entity.is_character() && names_a_depiction(&line) {
        return None;
    }
    Some(line)
}

pub struct PersonaEngine {
    rng: Arc<dyn Randomness>,
}

impl PersonaEngine {
    pub fn new(rng: Arc<dyn Randomness>) -> Self {
        Self { rng }
    }

    fn choose<'a>(&self, pool: &'a [&'a str]) -> &'a str {
        pool[self.rng.pick(pool.len())]
    }

    pub fn build_persona(&self, entity: &CanonicalEntity) -> PersonaProfile {
        let archetype = archetype_for(entity);
        let mode = match entity.roleplay_mode {
            RoleplayMode::AsObject => "object",
            RoleplayMode::AsCharacter => "character",
        };
        PersonaProfile {
            voice_archetype: archetype,
            speaking_style: speaking_style(archetype).to_string(),
            hook_template_id: format!("{mode}_{}", archetype.as_str()),
        }
    }

    pub fn build_hook(&self, entity: &CanonicalEntity) -> String {
        let pool = match entity.roleplay_mode {
            RoleplayMode::AsObject => OBJECT_HOOKS,
            RoleplayMode::AsCharacter => CHARACTER_HOOKS,
        };
        self.choose(pool).replace("{name}", &display_name(entity))
    }

    pub fn curiosity_question(&self, entity: &CanonicalEntity) -> String {
        let question = self.choose(curiosity_pool(entity)).to_string();
        if question.ends_with('?') {
            question
        } else {
            format!("{question}?")
        }
    }

    /// Hook, the first fact in first person, then a curiosity question.
    pub fn build_first_reply(&self, pack: &FactPack, hook: &str) -> String {
        let fact_line = pack
            .facts
            .iter()
            .find_map(|fact| speakable_line(&fact.claim, &pack.entity))
            .or_else(|| {
                (!pack.summary.trim().is_empty())
                    .then(|| speakable_line(&pack.summary, &pack.entity))
                    .flatten()
            });
        let question = self.curiosity_question(&pack.entity);
        match fact_line {
            Some(line) => format!("{hook} {line} {question}"),
            None => format!("{hook} {question}"),
        }
    }

    /// Templated reply used when no model answers. Consumes one fresh fact.
    pub fn build_fallback_reply(
        &self,
        pack: &FactPack,
        question: &str,
        used_fact_indexes: &mut BTreeSet<usize>,
    ) -> String {
        let opener = if question.trim_end().ends_with('?') {
            "Great question!"
        } else {
            "Ooh, I love chatting with you!"
        };
        let curiosity = self.curiosity_question(&pack.entity);
        match pick_speakable_fact(pack, used_fact_indexes) {
            Some((_, line)) => format!("{opener} Here's something I know: {line} {curiosity}"),
            None => format!("{opener} I'm still learning about myself. {curiosity}"),
        }
    }

    /// Three suggestions: a curiosity question, a generic prompt, a named prompt.
    pub fn followup_suggestions(&self, entity: &CanonicalEntity) -> Vec<String> {
        let named = match entity.roleplay_mode {
            RoleplayMode::AsCharacter => {
                format!("What was your life like, {}?", entity.roleplay_name)
            }
            RoleplayMode::AsObject => {
                format!("What's the most amazing thing about {}?", display_name(entity))
            }
        };
        vec![
            self.curiosity_question(entity),
            GENERIC_FOLLOWUP.to_string(),
            named,
        ]
    }

    /// System instruction for reply generation.
    pub fn system_instruction(&self, entity: &CanonicalEntity, persona: &PersonaProfile) -> String {
        let identity = match entity.roleplay_mode {
            RoleplayMode::AsCharacter => format!(
                "You are {}, speaking in first person about your own life. Never describe yourself as a bust, statue or portrait.",
                entity.roleplay_name
            ),
            RoleplayMode::AsObject => format!(
                "You are {}, speaking in first person as the object itself.",
                display_name(entity)
            ),
        };
        format!(
            "{identity} Your voice is {}. You are talking with a curious child aged 8-12. \
             Keep replies to 2-4 short sentences, use only the facts provided, never ask for \
             personal information, avoid scary or violent details, and end with a question.",
            persona.speaking_style
        )
    }
}

/// First unused fact, marking it used. Once every fact is used the set
/// resets to `{0}` and fact 0 is returned again.
pub fn pick_fresh_fact<'a>(
    pack: &'a FactPack,
    used_fact_indexes: &mut BTreeSet<usize>,
) -> Option<(usize, &'a FactItem)> {
    if pack.facts.is_empty() {
        return None;
    }
    if let Some((index, fact)) = pack
        .facts
        .iter()
        .enumerate()
        .find(|(index, _)| !used_fact_indexes.contains(index))
    {
        used_fact_indexes.insert(index);
        return Some((index, fact));
    }
    used_fact_indexes.clear();
    used_fact_indexes.insert(0);
    Some((0, &pack.facts[0]))
}

/// Like [`pick_fresh_fact`], but passes over facts a character cannot say
/// about itself. Each skipped fact still counts as used. `None` when no fact
/// in the pack is speakable.
pub fn pick_speakable_fact(
    pack: &FactPack,
    used_fact_indexes: &mut BTreeSet<usize>,
) -> Option<(usize, String)> {
    for _ in 0..pack.facts.len() {
        let (index, fact) = pick_fresh_fact(pack, used_fact_indexes)?;
        if let Some(line) = speakable_line(&fact.claim, &pack.entity) {
            return Some((index, line));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use curio_core::entity::slugify;

    use super::*;

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

    fn alexander() -> CanonicalEntity {
        CanonicalEntity {
            detected_label: "Bust of Alexander the Great".to_string(),
            ..entity("Alexander the Great", EntityCategory::Statue, RoleplayMode::AsCharacter)
        }
    }

    fn pack(entity: CanonicalEntity, claims: &[&str]) -> FactPack {
        FactPack {
            entity,
            facts: claims
                .iter()
                .map(|claim| FactItem {
                    claim: claim.to_string(),
                    confidence: 0.9,
                    source_urls: vec!["https://en.wikipedia.org/wiki/X".to_string()],
                    freshness_date: "2026-01-01".to_string(),
                })
                .collect(),
            summary: "summary".to_string(),
            generated_at: Utc::now(),
        }
    }

    fn engine(slot: usize) -> PersonaEngine {
        PersonaEngine::new(Arc::new(FixedRandomness(slot)))
    }

    #[test]
    fn archetypes_follow_category_with_character_override() {
        let engine = engine(0);
        let statue = entity("marble statue", EntityCategory::Statue, RoleplayMode::AsObject);
        assert_eq!(engine.build_persona(&statue).voice_archetype, VoiceArchetype::Playful);
        assert_eq!(engine.build_persona(&alexander()).voice_archetype, VoiceArchetype::Wise);
        let robot = entity("robot", EntityCategory::Electronics, RoleplayMode::AsObject);
        assert_eq!(engine.build_persona(&robot).voice_archetype, VoiceArchetype::Inventor);
        let oak = entity("oak tree", EntityCategory::Nature, RoleplayMode::AsObject);
        assert_eq!(engine.build_persona(&oak).voice_archetype, VoiceArchetype::Adventurous);
    }

    #[test]
    fn hook_templates_are_pinned_by_randomness() {
        let hook = engine(1).build_hook(&alexander());
        assert_eq!(hook, "Ah, a visitor! I am Alexander the Great, and I have lived quite a life.");
        let cat = entity("cat", EntityCategory::Animal, RoleplayMode::AsObject);
        assert_eq!(
            engine(0).build_hook(&cat),
            "Hey there, explorer! I'm a cat, and I've been waiting for someone curious like you!"
        );
    }

    #[test]
    fn first_person_rewrites_names_and_collapses_containers() {
        let alex = alexander();
        assert_eq!(
            first_person("Alexander the Great was tutored by Aristotle.", &alex),
            "I was tutored by Aristotle."
        );
        assert_eq!(
            first_person("The bust of Alexander the Great is in London.", &alex),
            "I am in London."
        );
        assert_eq!(
            first_person("Alexander the Great has a horse. The statue of Alexander the Great is tall.", &alex),
            "I have a horse. I am tall."
        );
        assert_eq!(
            first_person("A portrait of Alexander the Great hangs in a museum.", &alex),
            "I hang in a museum."
        );
        assert_eq!(
            first_person("Many cities were named after alexander the great.", &alex),
            "Many cities were named after me."
        );
        assert_eq!(
            first_person("Alexander the Great's horse was Bucephalus.", &alex),
            "my horse was Bucephalus."
        );
    }

    #[test]
    fn character_texts_never_describe_themselves_as_depictions() {
        let alex = alexander();
        let pack = pack(
            alex.clone(),
            &[
                "The statue of Alexander the Great stands tall.",
                "A portrait of Alexander the Great hangs in a museum.",
                "A bust of Alexander the Great was found in Egypt.",
            ],
        );
        for slot in 0..3 {
            let engine = engine(slot);
            let hook = engine.build_hook(&alex);
            let mut used = BTreeSet::new();
            let mut texts = vec![hook.clone(), engine.build_first_reply(&pack, &hook)];
            for _ in 0..3 {
                texts.push(engine.build_fallback_reply(&pack, "tell me more?", &mut used));
            }
            for text in texts {
                let lowered = text.to_lowercase();
                for phrase in ["bust of", "statue of", "portrait of"] {
                    assert!(!lowered.contains(phrase), "{text:?} contains {phrase:?}");
                }
            }
        }
    }

    #[test]
    fn template_replies_skip_partial_name_depiction_facts() {
        let alex = alexander();
        let mixed = pack(
            alex.clone(),
            &[
                "A marble bust of Alexander is displayed in the British Museum.",
                "Alexander the Great was tutored by Aristotle.",
            ],
        );
        let engine = engine(0);
        let first = engine.build_first_reply(&mixed, "Greetings!");
        assert!(first.contains("I was tutored by Aristotle."), "{first:?}");
        assert!(!first.contains("bust of"), "{first:?}");

        let mut used = BTreeSet::new();
        let fallback = engine.build_fallback_reply(&mixed, "who taught you?", &mut used);
        assert!(fallback.contains("I was tutored by Aristotle."), "{fallback:?}");
        assert!(!fallback.contains("bust of"), "{fallback:?}");
        assert_eq!(used, BTreeSet::from([0, 1]));

        let depictions_only = pack(
            alex,
            &["A marble bust of Alexander is displayed in the British Museum."],
        );
        let mut used = BTreeSet::new();
        let reply = engine.build_fallback_reply(&depictions_only, "hi?", &mut used);
        assert!(reply.contains("I'm still learning about myself."), "{reply:?}");
    }

    #[test]
    fn objects_may_mention_depictions() {
        let statue = entity("marble statue", EntityCategory::Statue, RoleplayMode::AsObject);
        assert_eq!(
            speakable_line("Many statues of horses stand in parks.", &statue).as_deref(),
            Some("Many statues of horses stand in parks.")
        );
    }

    #[test]
    fn pick_fresh_fact_visits_each_index_then_wraps() {
        let oak = entity("oak tree", EntityCategory::Nature, RoleplayMode::AsObject);
        let pack = pack(oak, &["a", "b", "c"]);
        let mut used = BTreeSet::new();
        let picked: Vec<usize> = (0..3)
            .filter_map(|_| pick_fresh_fact(&pack, &mut used).map(|(index, _)| index))
            .collect();
        assert_eq!(picked, vec![0, 1, 2]);
        assert_eq!(pick_fresh_fact(&pack, &mut used).map(|(index, _)| index), Some(0));
        assert_eq!(used, BTreeSet::from([0]));
        assert_eq!(pick_fresh_fact(&pack, &mut used).map(|(index, _)| index), Some(1));
    }

    #[test]
    fn pick_fresh_fact_on_empty_pack_is_none() {
        let oak = entity("oak tree", EntityCategory::Nature, RoleplayMode::AsObject);
        let mut used = BTreeSet::new();
        assert!(pick_fresh_fact(&pack(oak, &[]), &mut used).is_none());
    }

    #[test]
    fn curiosity_questions_end_with_question_mark() {
        for category in EntityCategory::ALL {
            let subject = entity("thing", category, RoleplayMode::AsObject);
            for slot in 0..3 {
                assert!(engine(slot).curiosity_question(&subject).ends_with('?'));
            }
        }
    }

    #[test]
    fn first_reply_combines_hook_fact_and_question() {
        let bridge = entity("Golden Gate Bridge", EntityCategory::Landmark, RoleplayMode::AsObject);
        let pack = pack(bridge, &["The Golden Gate Bridge opened in 1937."]);
        let reply = engine(0).build_first_reply(&pack, "Hello!");
        assert!(reply.starts_with("Hello! I opened in 1937."));
        assert!(reply.ends_with('?'));
    }

    #[test]
    fn followups_are_three_with_named_prompt() {
        let suggestions = engine(2).followup_suggestions(&alexander());
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[1], GENERIC_FOLLOWUP);
        assert!(suggestions[2].contains("Alexander the Great"));
    }
}
