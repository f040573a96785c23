//! Lexicon: slot and intent trigger phrases
//!
//! The lexicon is plain data. It maps each slot kind to canonical values and
//! the phrases that express them, and each intent to its trigger phrases.
//! It can be built in (`Lexicon::builtin`) or loaded from a YAML or TOML file:
//!
//! ```yaml
//! negation_markers: [not, no, "don't"]
//! slots:
//!   - slot: time-constraint
//!     negatable: true
//!     values:
//!       - value: morning
//!         phrases: [morning]
//! intents:
//!   - intent: find_course
//!     triggers: [course, class]
//!     relevant_slots: [subject, time-constraint]
//!     required_slots: [subject]
//!   - intent: search_library
//!     triggers: [book, library]
//!     relevant_slots: [title, author, subject]
//!     bonus_slots: [title, author, subject]
//! ```

mod builtin;
mod watch;

pub use watch::{LexiconHandle, spawn_watcher};

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{IntentKind, SlotKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    #[serde(default = "default_negation_markers")]
    pub negation_markers: Vec<String>,
    pub slots: Vec<SlotTable>,
    pub intents: Vec<IntentTable>,
}

/// Canonical values for one slot kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTable {
    pub slot: SlotKind,
    /// Whether an adjacent negation marker flips values of this slot
    #[serde(default)]
    pub negatable: bool,
    pub values: Vec<SlotValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotValue {
    pub value: String,
    pub phrases: Vec<String>,
}

/// Trigger phrases and slot usage for one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentTable {
    pub intent: IntentKind,
    pub triggers: Vec<String>,
    /// Slots whose entities are attached to the detected intent
    #[serde(default)]
    pub relevant_slots: Vec<SlotKind>,
    /// Slots that must all be present for the entity bonus; carried
    /// forward from earlier turns when missing
    #[serde(default)]
    pub required_slots: Vec<SlotKind>,
    /// Any one of these also earns the bonus. Never carried forward.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bonus_slots: Vec<SlotKind>,
}

fn default_negation_markers() -> Vec<String> {
    ["not", "no", "don't", "dont", "without", "avoid"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Lexicon {
    /// Parse a lexicon from YAML and validate it
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let lexicon: Lexicon =
            serde_yml::from_str(content).context("Failed to parse lexicon YAML")?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    /// Parse a lexicon from TOML and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let lexicon: Lexicon = toml::from_str(content).context("Failed to parse lexicon TOML")?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    /// Load a lexicon file, choosing the format by extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon at {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let lexicon = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "toml" => Self::from_toml_str(&content),
            other => Err(anyhow!(
                "Unsupported lexicon format '{}' (expected .yaml, .yml or .toml)",
                other
            )),
        };
        lexicon.with_context(|| format!("Invalid lexicon at {}", path.display()))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yml::to_string(self).context("Failed to serialize lexicon")
    }

    pub fn slot_table(&self, slot: SlotKind) -> Option<&SlotTable> {
        self.slots.iter().find(|t| t.slot == slot)
    }

    pub fn intent_table(&self, intent: IntentKind) -> Option<&IntentTable> {
        self.intents.iter().find(|t| t.intent == intent)
    }

    pub fn has_slot(&self, slot: SlotKind) -> bool {
        self.slot_table(slot).is_some()
    }

    pub fn is_negation_marker(&self, token: &str) -> bool {
        self.negation_markers.iter().any(|m| m.to_lowercase() == token)
    }

    /// Check structural rules; a failing lexicon must not reach a turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let malformed = |msg: String| Err(ConfigError::MalformedLexicon(msg));

        for marker in &self.negation_markers {
            if tokenize(marker).len() != 1 {
                return malformed(format!("negation marker '{}' must be a single word", marker));
            }
        }

        if self.slots.is_empty() {
            return malformed("lexicon declares no slots".to_string());
        }
        let mut seen_slots = HashSet::new();
        for table in &self.slots {
            if !seen_slots.insert(table.slot) {
                return malformed(format!("slot '{}' is declared twice", table.slot));
            }
            if table.values.is_empty() {
                return malformed(format!("slot '{}' has no values", table.slot));
            }
            for value in &table.values {
                if value.value.trim().is_empty() {
                    return malformed(format!("slot '{}' has an empty value", table.slot));
                }
                check_phrases(&value.phrases, &format!("{} value '{}'", table.slot, value.value))?;
            }
        }

        let mut seen_intents = HashSet::new();
        for table in &self.intents {
            if !IntentKind::DETECTABLE.contains(&table.intent) {
                return malformed(format!("intent '{}' cannot declare triggers", table.intent));
            }
            if !seen_intents.insert(table.intent) {
                return malformed(format!("intent '{}' is declared twice", table.intent));
            }
            check_phrases(&table.triggers, &format!("intent '{}'", table.intent))?;
        }

        Ok(())
    }
}

fn check_phrases(phrases: &[String], owner: &str) -> Result<(), ConfigError> {
    if phrases.is_empty() {
        return Err(ConfigError::MalformedLexicon(format!("{} has no phrases", owner)));
    }
    if let Some(bad) = phrases.iter().find(|p| tokenize(p).is_empty()) {
        return Err(ConfigError::MalformedLexicon(format!(
            "{} has a phrase with no words: {:?}",
            owner, bad
        )));
    }
    Ok(())
}

/// A lowercased word with its byte range in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split text into lowercased word tokens.
///
/// A word is a run of alphanumerics, optionally joined by an apostrophe
/// (`don't`, `don’t`). Everything else separates words.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let inner_apostrophe = (ch == '\'' || ch == '\u{2019}')
            && start.is_some()
            && chars.peek().is_some_and(|(_, next)| next.is_alphanumeric());

        if ch.is_alphanumeric() || inner_apostrophe {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            tokens.push(make_token(&text[s..idx], s, idx));
        }
    }
    if let Some(s) = start {
        tokens.push(make_token(&text[s..], s, text.len()));
    }
    tokens
}

fn make_token(word: &str, start: usize, end: usize) -> Token {
    Token {
        text: word.to_lowercase().replace('\u{2019}', "'"),
        start,
        end,
    }
}

/// Tokenize a lexicon phrase into its lowercased words
pub fn phrase_words(phrase: &str) -> Vec<String> {
    tokenize(phrase).into_iter().map(|t| t.text).collect()
}

/// Whether a text word matches a phrase word, allowing a plural `s`/`es`
fn word_matches(text_word: &str, phrase_word: &str) -> bool {
    if text_word == phrase_word {
        return true;
    }
    if phrase_word.chars().count() < 3 {
        return false;
    }
    text_word
        .strip_prefix(phrase_word)
        .is_some_and(|rest| rest == "s" || rest == "es")
}

/// Token indices at which `words` matches a run of consecutive tokens
pub fn find_phrase(tokens: &[Token], words: &[String]) -> Vec<usize> {
    if words.is_empty() || words.len() > tokens.len() {
        return Vec::new();
    }
    (0..=tokens.len() - words.len())
        .filter(|&i| {
            words
                .iter()
                .enumerate()
                .all(|(offset, word)| word_matches(&tokens[i + offset].text, word))
        })
        .collect()
}
