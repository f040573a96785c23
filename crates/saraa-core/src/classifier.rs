//! Intent classification
//!
//! Scores every intent in the lexicon by how many of its trigger phrases
//! appear in the query, adds a bonus when the intent's required slots are
//! filled, and keeps the intents that clear a threshold. Pure and
//! deterministic: the same text and entities always give the same result.

use std::cmp::Ordering;

use tracing::debug;

use crate::context::ConversationContext;
use crate::error::ConfigError;
use crate::lexicon::{IntentTable, Lexicon, Token, find_phrase, phrase_words, tokenize};
use crate::types::{Classification, Entity, Intent, IntentKind, SlotKind};

/// Configuration for the intent classifier
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Minimum confidence for an intent to be emitted
    pub threshold: f64,
    /// Number of distinct trigger hits that count as full confidence
    pub trigger_saturation: f64,
    /// Added when the intent's required and bonus slots are satisfied
    pub entity_bonus: f64,
}

impl ClassifierConfig {
    /// Reject settings that would make scores meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidSetting(msg));
        if !(0.0..=1.0).contains(&self.threshold) {
            return invalid(format!("classifier.threshold must be within [0, 1], got {}", self.threshold));
        }
        if !(self.trigger_saturation.is_finite() && self.trigger_saturation > 0.0) {
            return invalid(format!(
                "classifier.trigger_saturation must be positive, got {}",
                self.trigger_saturation
            ));
        }
        if !(0.0..=1.0).contains(&self.entity_bonus) {
            return invalid(format!(
                "classifier.entity_bonus must be within [0, 1], got {}",
                self.entity_bonus
            ));
        }
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            trigger_saturation: 3.0,
            entity_bonus: 0.2,
        }
    }
}

pub struct IntentClassifier {
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a query from its text and extracted entities.
    pub fn classify(&self, lexicon: &Lexicon, text: &str, entities: &[Entity]) -> Classification {
        let tokens = tokenize(text);

        let mut intents: Vec<Intent> = lexicon
            .intents
            .iter()
            .filter_map(|table| {
                let confidence = self.score(table, &tokens, entities);
                (confidence >= self.config.threshold).then(|| Intent {
                    kind: table.intent,
                    confidence,
                    entities: relevant_entities(table, entities),
                })
            })
            .collect();

        // stable sort keeps lexicon declaration order among equal scores
        intents.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let tag = match intents.len() {
            0 => IntentKind::Unrecognized,
            1 => intents[0].kind,
            _ => IntentKind::MultiIntent,
        };

        if intents.is_empty() {
            intents.push(Intent {
                kind: IntentKind::Unrecognized,
                confidence: 0.0,
                entities: entities.to_vec(),
            });
        }

        debug!(
            "Classified {:?} as {} ({:?})",
            text,
            tag,
            intents.iter().map(|i| (i.kind, i.confidence)).collect::<Vec<_>>()
        );

        Classification {
            tag,
            intents,
            text: text.to_string(),
        }
    }

    /// Classify, then fill missing required slots from earlier turns.
    ///
    /// The context is an explicit input, so this stays a pure function:
    /// only entities of slots the intent requires are carried, most recent
    /// turn first, and carried entities have no span.
    pub fn classify_with_context(
        &self,
        lexicon: &Lexicon,
        text: &str,
        entities: &[Entity],
        context: &ConversationContext,
    ) -> Classification {
        let mut classification = self.classify(lexicon, text, entities);

        for intent in &mut classification.intents {
            let Some(table) = lexicon.intent_table(intent.kind) else {
                continue;
            };
            for slot in &table.required_slots {
                if intent.has_slot(*slot) {
                    continue;
                }
                if let Some(previous) = context.latest_entity(*slot) {
                    debug!(
                        "Carrying {}={} forward into {}",
                        slot, previous.value, intent.kind
                    );
                    intent
                        .entities
                        .push(Entity::new(*slot, previous.value.clone(), None));
                }
            }
        }

        classification
    }

    /// Confidence of one intent, clipped to [0, 1]
    fn score(&self, table: &IntentTable, tokens: &[Token], entities: &[Entity]) -> f64 {
        let hits = table
            .triggers
            .iter()
            .filter(|trigger| !find_phrase(tokens, &phrase_words(trigger)).is_empty())
            .count();
        if hits == 0 {
            return 0.0;
        }

        let mut confidence = hits as f64 / self.config.trigger_saturation;
        let present = |slot: &SlotKind| entities.iter().any(|e| e.slot == *slot);
        let slots_filled = !(table.required_slots.is_empty() && table.bonus_slots.is_empty())
            && table.required_slots.iter().all(present)
            && (table.bonus_slots.is_empty() || table.bonus_slots.iter().any(present));
        if slots_filled {
            confidence += self.config.entity_bonus;
        }
        confidence.clamp(0.0, 1.0)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

fn relevant_entities(table: &IntentTable, entities: &[Entity]) -> Vec<Entity> {
    entities
        .iter()
        .filter(|e| table.relevant_slots.contains(&e.slot))
        .cloned()
        .collect()
}
